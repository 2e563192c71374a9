//! Storefront JSON endpoint probe.

use async_trait::async_trait;
use url::Url;

use super::http_client::{BodyKind, HttpClient};
use super::{ContentKind, FetchContext, FetchMode, FetchedPage, Strategy, StrategyOutcome};
use crate::extractor::StorefrontPayload;

/// Whether the path looks like `/products/<handle>`.
fn is_product_path(url: &Url) -> bool {
    let mut segments = url.path_segments().into_iter().flatten();
    while let Some(segment) = segments.next() {
        if segment == "products" {
            return segments.next().is_some_and(|handle| !handle.is_empty());
        }
    }
    false
}

/// Candidate JSON endpoints for a product page, in probe order.
pub fn probe_urls(url: &Url) -> Vec<String> {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    let path = base.path().trim_end_matches('/').to_string();
    if path.is_empty() {
        return Vec::new();
    }
    base.set_path(&path);
    let base = base.to_string();
    vec![
        format!("{}.json", base),
        format!("{}?view=json", base),
        format!("{}/product.json", base),
    ]
}

pub(super) struct StorefrontStrategy {
    client: HttpClient,
    enabled: bool,
}

impl StorefrontStrategy {
    pub(super) fn new(client: HttpClient, enabled: bool) -> Self {
        Self { client, enabled }
    }
}

#[async_trait]
impl Strategy for StorefrontStrategy {
    fn mode(&self) -> FetchMode {
        FetchMode::StorefrontJson
    }

    async fn attempt(&self, ctx: &mut FetchContext) -> StrategyOutcome {
        if !self.enabled {
            return StrategyOutcome::Miss("storefront probe disabled".to_string());
        }
        if ctx.platform.is_none() && !is_product_path(&ctx.url) {
            return StrategyOutcome::Miss("no storefront platform detected".to_string());
        }

        let mut reasons = Vec::new();
        for probe in probe_urls(&ctx.url) {
            let response = match self.client.get(&probe, BodyKind::Json).await {
                Ok(response) => response,
                Err(e) => {
                    reasons.push(format!("{}: {}", probe, e));
                    continue;
                }
            };
            if !response.is_success() {
                reasons.push(format!("{}: HTTP {}", probe, response.status));
                continue;
            }
            if !response.looks_like_json() {
                reasons.push(format!("{}: not JSON", probe));
                continue;
            }
            match StorefrontPayload::parse(&response.body) {
                Ok(payload) => {
                    tracing::debug!("{} matched {} payload", probe, payload.kind());
                    return StrategyOutcome::Hit(FetchedPage::from_response(
                        &response,
                        ContentKind::StorefrontJson,
                    ));
                }
                Err(e) => reasons.push(format!("{}: {}", probe, e)),
            }
        }

        if reasons.is_empty() {
            StrategyOutcome::Miss("no probe URLs for this path".to_string())
        } else {
            StrategyOutcome::Miss(reasons.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_urls_strip_query_and_slash() {
        let url = Url::parse("https://shop.test/products/cap/?variant=1#top").unwrap();
        assert_eq!(
            probe_urls(&url),
            vec![
                "https://shop.test/products/cap.json",
                "https://shop.test/products/cap?view=json",
                "https://shop.test/products/cap/product.json",
            ]
        );
        assert!(probe_urls(&Url::parse("https://shop.test/").unwrap()).is_empty());
    }

    #[test]
    fn test_product_path() {
        assert!(is_product_path(&Url::parse("https://a.test/products/mug").unwrap()));
        assert!(is_product_path(&Url::parse("https://a.test/collections/x/products/mug").unwrap()));
        assert!(!is_product_path(&Url::parse("https://a.test/products/").unwrap()));
        assert!(!is_product_path(&Url::parse("https://a.test/about").unwrap()));
    }
}
