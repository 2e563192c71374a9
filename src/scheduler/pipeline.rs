//! Fetch, extract and persist one product page.
//!
//! Persistence for one check is a single transaction: the product upsert,
//! variant reconciliation, new variants and history all commit together or
//! not at all, so a retried attempt can neither duplicate history nor lose
//! events.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use diesel_async::AsyncConnection;
use tracing::{debug, info, warn};
use url::Url;

use super::error::CheckError;
use super::retry::RetryPolicy;
use crate::detector::ChangeDetector;
use crate::extractor::{ExtractionError, Extractor, ProductShell, VariantCandidate};
use crate::fetcher::{Fetch, FetchError, FetchResult};
use crate::models::{normalize_attributes, Attributes, ChangeEvent, CheckRun, Product, Variant};
use crate::reconciler::VariantReconciler;
use crate::repository::{
    DbContext, DbError, DbPool, ProductRepository, SqliteConn, VariantRepository,
};

/// Result of ingesting a single URL.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub product: Product,
    pub shell: ProductShell,
    pub events: Vec<ChangeEvent>,
}

/// Normalize a product URL into the key products are stored under.
///
/// The fragment is dropped, scheme and host are lowercased, and a trailing
/// slash is removed from non-root paths. The query is kept since stores use
/// it to select variants.
pub fn normalize_product_url(raw: &str) -> Result<String, FetchError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    url.set_fragment(None);
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url.to_string())
}

/// The per-product work shared by URL ingestion and scheduled checks.
#[derive(Clone)]
pub struct Pipeline {
    db: DbContext,
    fetcher: Arc<dyn Fetch>,
    extractor: Extractor,
    detector: ChangeDetector,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(db: DbContext, fetcher: Arc<dyn Fetch>, extractor: Extractor) -> Self {
        Self {
            db,
            fetcher,
            extractor,
            detector: ChangeDetector::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn db(&self) -> &DbContext {
        &self.db
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetch> {
        &self.fetcher
    }

    /// Fetch and extract a page, noting the fetch mode and content hash on
    /// `run` whenever content was obtained.
    pub async fn observe(&self, url: &str, run: &mut CheckRun) -> Result<ProductShell, CheckError> {
        let fetch = self.fetcher.fetch(url).await;
        if !fetch.success {
            let error = fetch
                .error
                .unwrap_or_else(|| FetchError::Exhausted("no content".to_string()));
            return Err(error.into());
        }
        run.fetch_mode = fetch.mode_used.map(|m| m.as_str().to_string());
        run.content_hash = Some(fetch.content_hash());

        let (fetch, shell) = self.extract(fetch).await?;
        if let Err(e) = &shell {
            warn!(
                "Extraction failed for {} ({} content, {} bytes): {}",
                url,
                fetch.content_kind.as_str(),
                fetch.content.len(),
                e
            );
        }
        shell.map_err(CheckError::from)
    }

    /// Run extraction off the async workers; DOM parsing is CPU-bound.
    async fn extract(
        &self,
        fetch: FetchResult,
    ) -> Result<(FetchResult, Result<ProductShell, ExtractionError>), CheckError> {
        let extractor = self.extractor.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let shell = extractor.extract(&fetch);
            (fetch, shell)
        })
        .await?;
        Ok(joined)
    }

    /// Persist an extracted page for the product stored under `product_url`.
    pub async fn persist(
        &self,
        product_url: &str,
        shell: &ProductShell,
    ) -> Result<(Product, Vec<ChangeEvent>), DbError> {
        persist_shell(self.db.pool(), product_url, shell, self.detector, &self.retry).await
    }

    /// Observe and persist one product.
    pub async fn check(
        &self,
        product_url: &str,
        run: &mut CheckRun,
    ) -> Result<(Product, Vec<ChangeEvent>), CheckError> {
        let shell = self.observe(product_url, run).await?;
        Ok(self.persist(product_url, &shell).await?)
    }

    /// Fetch a URL for the first time, creating or refreshing its product
    /// and recording first observations. A successful ingest counts as a
    /// check of the product.
    pub async fn ingest_url(&self, url: &str) -> Result<IngestOutcome, CheckError> {
        let product_url = normalize_product_url(url)?;
        let mut run = CheckRun::begin("", "ingest");
        let shell = self.observe(&product_url, &mut run).await?;
        let (product, events) = self.persist(&product_url, &shell).await?;

        run.product_id = product.id.clone();
        let run = run.succeed();
        if let Err(e) = self.db.check_runs().insert(&run).await {
            warn!("Failed to record ingest of {}: {}", product_url, e);
        }

        info!(
            "Ingested {} ({} variant(s), {} change(s))",
            product.label(),
            shell.variants.len(),
            events.len()
        );
        Ok(IngestOutcome {
            product,
            shell,
            events,
        })
    }
}

/// Persist a shell with bounded retries. Each attempt runs on a fresh
/// connection inside its own transaction.
pub(crate) async fn persist_shell(
    pool: &DbPool,
    product_url: &str,
    shell: &ProductShell,
    detector: ChangeDetector,
    retry: &RetryPolicy,
) -> Result<(Product, Vec<ChangeEvent>), DbError> {
    retry
        .run("persisting check", move || async move {
            let mut conn = pool.get().await?;
            conn.transaction(move |conn| {
                Box::pin(async move { persist_on(conn, product_url, shell, detector).await })
            })
            .await
        })
        .await
}

/// Candidates repeated within one page collapse onto the first occurrence.
fn distinct_candidates(variants: &[VariantCandidate]) -> Vec<&VariantCandidate> {
    let mut seen: HashSet<(Attributes, Option<String>)> = HashSet::new();
    variants
        .iter()
        .filter(|v| {
            let sku = v
                .sku
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            seen.insert((normalize_attributes(&v.attributes), sku))
        })
        .collect()
}

async fn persist_on(
    conn: &mut SqliteConn,
    product_url: &str,
    shell: &ProductShell,
    detector: ChangeDetector,
) -> Result<(Product, Vec<ChangeEvent>), DbError> {
    let product = ProductRepository::upsert_on(
        conn,
        product_url,
        shell.name.as_deref(),
        shell.image_url.as_deref(),
    )
    .await?;

    let candidates = distinct_candidates(&shell.variants);
    let mut reconciler = VariantReconciler::load(conn, &product.id).await?;
    let keys: Vec<(&Attributes, Option<&str>)> = candidates
        .iter()
        .map(|c| (&c.attributes, c.sku.as_deref()))
        .collect();
    let matches = reconciler.resolve_all(&keys);

    let observed_at = Utc::now();
    let mut events = Vec::new();
    for (candidate, matched) in candidates.into_iter().zip(matches) {
        let variant_id = match matched {
            Some(m) => {
                if let Some(sku) = &m.learned_sku {
                    VariantRepository::set_sku_on(conn, &m.variant_id, sku).await?;
                }
                m.variant_id
            }
            None => {
                let variant = Variant::new(
                    &product.id,
                    candidate.attributes.clone(),
                    candidate.sku.clone(),
                );
                VariantRepository::insert_on(conn, &variant).await?;
                reconciler.register(&variant);
                debug!("New variant {} ({})", variant.id, variant.label());
                variant.id
            }
        };

        let changes = detector
            .record(
                conn,
                &product.id,
                &variant_id,
                candidate.price.as_ref(),
                candidate.stock,
                observed_at,
            )
            .await?;
        events.extend(changes);
    }

    Ok((product, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Price, StockStatus};

    fn candidate(pairs: &[(&str, &str)], sku: Option<&str>, amount: i64) -> VariantCandidate {
        VariantCandidate {
            attributes: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            sku: sku.map(str::to_string),
            price: Some(Price::new(amount, Some("USD"))),
            stock: StockStatus::InStock,
        }
    }

    fn shell(variants: Vec<VariantCandidate>) -> ProductShell {
        ProductShell {
            canonical_url: "https://shop.test/p/tee".to_string(),
            name: Some("Tee".to_string()),
            image_url: None,
            variants,
        }
    }

    async fn setup() -> (tempfile::TempDir, DbContext) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (dir, ctx)
    }

    #[test]
    fn test_normalize_product_url() {
        assert_eq!(
            normalize_product_url("HTTPS://Shop.Test/products/tee/#reviews").unwrap(),
            "https://shop.test/products/tee"
        );
        assert_eq!(
            normalize_product_url("https://shop.test/p?variant=1").unwrap(),
            "https://shop.test/p?variant=1"
        );
        assert_eq!(
            normalize_product_url("https://shop.test/").unwrap(),
            "https://shop.test/"
        );
        assert!(normalize_product_url("ftp://shop.test/p").is_err());
        assert!(normalize_product_url("not a url").is_err());
    }

    #[test]
    fn test_duplicate_candidates_collapse() {
        let variants = vec![
            candidate(&[("Size", "M")], None, 100),
            candidate(&[("size", " m ")], None, 200),
            candidate(&[("size", "L")], None, 300),
        ];
        let distinct = distinct_candidates(&variants);
        assert_eq!(distinct.len(), 2);
        assert_eq!(distinct[0].price, Some(Price::new(100, Some("USD"))));
    }

    #[tokio::test]
    async fn test_persist_is_stable_across_checks() {
        let (_dir, ctx) = setup().await;
        let retry = RetryPolicy::none();
        let url = "https://shop.test/p/tee";

        let first = shell(vec![
            candidate(&[("size", "M")], None, 2000),
            candidate(&[("size", "L")], None, 2000),
        ]);
        let (product, events) =
            persist_shell(ctx.pool(), url, &first, ChangeDetector::new(), &retry)
                .await
                .unwrap();
        assert!(events.is_empty());
        assert_eq!(product.display_name.as_deref(), Some("Tee"));

        // The store adds a color option and a SKU, and drops L's price.
        let second = shell(vec![
            candidate(&[("size", "M"), ("color", "Blue")], Some("TEE-M"), 1800),
            candidate(&[("size", "L")], None, 2000),
        ]);
        let (again, events) =
            persist_shell(ctx.pool(), url, &second, ChangeDetector::new(), &retry)
                .await
                .unwrap();
        assert_eq!(again.id, product.id);
        assert_eq!(events.len(), 1);

        let variants = ctx.variants().list_for_product(&product.id).await.unwrap();
        assert_eq!(variants.len(), 2);
        let medium = variants
            .iter()
            .find(|v| v.attributes.get("size").map(String::as_str) == Some("M"))
            .unwrap();
        assert_eq!(medium.sku.as_deref(), Some("TEE-M"));
        assert_eq!(medium.current_price, Some(Price::new(1800, Some("USD"))));
        assert_eq!(events[0].variant_id, medium.id);
    }
}
