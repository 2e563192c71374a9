//! Page fetching through an ordered chain of strategies.
//!
//! Cheap strategies run first and the first hit wins: a direct request, a
//! storefront JSON probe, the structured data already in the direct
//! response, and finally a headless browser render. The whole chain runs
//! under one deadline.

pub mod browser;
pub mod config;
pub mod http_client;
pub mod memory;
mod probe;
mod signals;
mod structured;

pub use browser::BrowserFetcher;
pub use config::{
    BrowserEngineConfig, FetchConfig, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_CONTENT_BYTES,
};
pub use http_client::{BodyKind, HttpClient, HttpResponse};
pub use memory::{MemoryGuard, MemorySample};
pub use probe::probe_urls;
pub use signals::{currency_hint, detect_platform, has_product_signals, Platform};

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use browser::BrowserStrategy;
use probe::StorefrontStrategy;
use structured::StructuredStrategy;

/// Which strategy produced the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    Http,
    StorefrontJson,
    StructuredData,
    Browser,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::Http => "http",
            FetchMode::StorefrontJson => "storefront_json",
            FetchMode::StructuredData => "structured_data",
            FetchMode::Browser => "browser",
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the fetched content must be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    Html,
    /// A storefront product JSON document.
    StorefrontJson,
    /// A JSON array of schema.org Product nodes.
    StructuredData,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::StorefrontJson => "storefront_json",
            ContentKind::StructuredData => "structured_data",
        }
    }
}

/// Fetch failures. Strategy errors are folded into misses; these are what
/// a caller sees.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("fetch timed out after {0}s")]
    Timeout(u64),

    #[error("response exceeds {limit} bytes")]
    Oversized { limit: usize },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("all fetch strategies failed: {0}")]
    Exhausted(String),
}

/// One strategy attempt as recorded in the fetch metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub mode: FetchMode,
    /// "hit" or the miss reason.
    pub outcome: String,
    pub elapsed_ms: u64,
}

/// Details about how content was obtained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchMetadata {
    pub platform: Option<String>,
    pub content_type: Option<String>,
    pub truncated: bool,
    pub bytes: usize,
    pub attempts: Vec<StrategyAttempt>,
    pub currency_hint: Option<String>,
}

/// Outcome of fetching one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub success: bool,
    pub mode_used: Option<FetchMode>,
    pub status_code: Option<u16>,
    pub content: String,
    pub content_kind: ContentKind,
    pub final_url: String,
    pub metadata: FetchMetadata,
    pub error: Option<FetchError>,
}

impl FetchResult {
    pub fn failure(url: &str, error: FetchError, metadata: FetchMetadata) -> Self {
        Self {
            success: false,
            mode_used: None,
            status_code: None,
            content: String::new(),
            content_kind: ContentKind::Html,
            final_url: url.to_string(),
            metadata,
            error: Some(error),
        }
    }

    /// SHA-256 of the content, hex encoded.
    pub fn content_hash(&self) -> String {
        hex::encode(Sha256::digest(self.content.as_bytes()))
    }
}

/// Content produced by a successful strategy.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status_code: Option<u16>,
    pub content: String,
    pub content_kind: ContentKind,
    pub final_url: String,
    pub content_type: Option<String>,
    pub truncated: bool,
}

impl FetchedPage {
    fn from_response(response: &HttpResponse, content_kind: ContentKind) -> Self {
        Self {
            status_code: Some(response.status),
            content: response.body.clone(),
            content_kind,
            final_url: response.final_url.clone(),
            content_type: response.content_type().map(str::to_string),
            truncated: response.truncated,
        }
    }
}

pub enum StrategyOutcome {
    Hit(FetchedPage),
    Miss(String),
}

/// State shared along one run of the chain.
pub struct FetchContext {
    pub url: Url,
    /// The direct GET response, once made.
    pub direct: Option<HttpResponse>,
    pub platform: Option<Platform>,
    pub currency_hint: Option<String>,
    in_flight: Option<(FetchMode, Instant)>,
}

impl FetchContext {
    fn new(url: Url) -> Self {
        Self {
            url,
            direct: None,
            platform: None,
            currency_hint: None,
            in_flight: None,
        }
    }
}

/// One way of getting a product page.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn mode(&self) -> FetchMode;

    async fn attempt(&self, ctx: &mut FetchContext) -> StrategyOutcome;

    /// Release long-lived resources such as a browser process.
    async fn shutdown(&self) {}
}

/// Anything that can fetch a product page.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult;

    async fn shutdown(&self) {}
}

/// Direct GET with browser-like headers.
struct HttpStrategy {
    client: HttpClient,
}

#[async_trait]
impl Strategy for HttpStrategy {
    fn mode(&self) -> FetchMode {
        FetchMode::Http
    }

    async fn attempt(&self, ctx: &mut FetchContext) -> StrategyOutcome {
        let response = match self.client.get(ctx.url.as_str(), BodyKind::Html).await {
            Ok(response) => response,
            Err(e) => return StrategyOutcome::Miss(e.to_string()),
        };

        ctx.platform = detect_platform(&response);
        ctx.currency_hint = currency_hint(&response.body);
        let status = response.status;
        let signals = has_product_signals(&response.body);
        let page = FetchedPage::from_response(&response, ContentKind::Html);
        ctx.direct = Some(response);

        if !(200..300).contains(&status) {
            return StrategyOutcome::Miss(format!("HTTP {}", status));
        }
        if let Some(platform) = ctx.platform {
            return StrategyOutcome::Miss(format!("{} storefront detected", platform));
        }
        if !signals {
            return StrategyOutcome::Miss("no product signals in markup".to_string());
        }
        StrategyOutcome::Hit(page)
    }
}

/// The production fetcher: runs the strategy chain under a deadline.
pub struct PageFetcher {
    strategies: Vec<Box<dyn Strategy>>,
    timeout: Duration,
}

impl PageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = HttpClient::new(config)?;
        let browser = Arc::new(Mutex::new(BrowserFetcher::new(
            config.browser.clone(),
            config.timeout_secs,
            client.user_agent().to_string(),
        )));

        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(HttpStrategy {
                client: client.clone(),
            }),
            Box::new(StorefrontStrategy::new(client, config.storefront_probe)),
            Box::new(StructuredStrategy),
            Box::new(BrowserStrategy::new(
                browser,
                MemoryGuard::new(config.memory_threshold_mb, config.min_available_mb),
                config.browser.enabled,
                config.max_content_bytes,
            )),
        ];

        Ok(Self::with_strategies(
            strategies,
            Duration::from_secs(config.timeout_secs.max(1)),
        ))
    }

    /// Build a fetcher from an explicit strategy list.
    pub fn with_strategies(strategies: Vec<Box<dyn Strategy>>, timeout: Duration) -> Self {
        Self {
            strategies,
            timeout,
        }
    }

    async fn run_chain(
        &self,
        ctx: &mut FetchContext,
        attempts: &mut Vec<StrategyAttempt>,
    ) -> Option<(FetchMode, FetchedPage)> {
        for strategy in &self.strategies {
            let mode = strategy.mode();
            let start = Instant::now();
            ctx.in_flight = Some((mode, start));
            let outcome = strategy.attempt(ctx).await;
            ctx.in_flight = None;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match outcome {
                StrategyOutcome::Hit(page) => {
                    debug!("{}: {} hit ({}ms)", ctx.url, mode, elapsed_ms);
                    attempts.push(StrategyAttempt {
                        mode,
                        outcome: "hit".to_string(),
                        elapsed_ms,
                    });
                    return Some((mode, page));
                }
                StrategyOutcome::Miss(reason) => {
                    debug!("{}: {} missed: {} ({}ms)", ctx.url, mode, reason, elapsed_ms);
                    attempts.push(StrategyAttempt {
                        mode,
                        outcome: reason,
                        elapsed_ms,
                    });
                }
            }
        }
        None
    }
}

#[async_trait]
impl Fetch for PageFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        let parsed = match Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            Ok(u) => {
                return FetchResult::failure(
                    url,
                    FetchError::InvalidUrl(format!("unsupported scheme '{}'", u.scheme())),
                    FetchMetadata::default(),
                )
            }
            Err(e) => {
                return FetchResult::failure(
                    url,
                    FetchError::InvalidUrl(e.to_string()),
                    FetchMetadata::default(),
                )
            }
        };

        let mut ctx = FetchContext::new(parsed);
        let mut attempts = Vec::new();
        let outcome =
            tokio::time::timeout(self.timeout, self.run_chain(&mut ctx, &mut attempts)).await;

        let mut metadata = FetchMetadata {
            platform: ctx.platform.map(|p| p.as_str().to_string()),
            currency_hint: ctx.currency_hint.clone(),
            ..Default::default()
        };

        match outcome {
            Ok(Some((mode, page))) => {
                metadata.attempts = attempts;
                metadata.content_type = page.content_type;
                metadata.truncated = page.truncated;
                metadata.bytes = page.content.len();
                info!("Fetched {} via {} ({} bytes)", url, mode, metadata.bytes);
                FetchResult {
                    success: true,
                    mode_used: Some(mode),
                    status_code: page.status_code,
                    content: page.content,
                    content_kind: page.content_kind,
                    final_url: page.final_url,
                    metadata,
                    error: None,
                }
            }
            Ok(None) => {
                let summary = attempts
                    .iter()
                    .map(|a| format!("{}: {}", a.mode, a.outcome))
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!("All strategies failed for {}: {}", url, summary);
                metadata.attempts = attempts;
                FetchResult::failure(url, FetchError::Exhausted(summary), metadata)
            }
            Err(_) => {
                if let Some((mode, start)) = ctx.in_flight.take() {
                    attempts.push(StrategyAttempt {
                        mode,
                        outcome: "timed out".to_string(),
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                }
                warn!("Fetch of {} timed out after {:?}", url, self.timeout);
                metadata.attempts = attempts;
                FetchResult::failure(url, FetchError::Timeout(self.timeout.as_secs()), metadata)
            }
        }
    }

    async fn shutdown(&self) {
        for strategy in &self.strategies {
            strategy.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        mode: FetchMode,
        hit: bool,
        delay: Duration,
    }

    #[async_trait]
    impl Strategy for Fixed {
        fn mode(&self) -> FetchMode {
            self.mode
        }

        async fn attempt(&self, _ctx: &mut FetchContext) -> StrategyOutcome {
            tokio::time::sleep(self.delay).await;
            if self.hit {
                StrategyOutcome::Hit(FetchedPage {
                    status_code: Some(200),
                    content: "<h1>x</h1>".to_string(),
                    content_kind: ContentKind::Html,
                    final_url: "https://shop.test/x".to_string(),
                    content_type: Some("text/html".to_string()),
                    truncated: false,
                })
            } else {
                StrategyOutcome::Miss("nothing".to_string())
            }
        }
    }

    fn fixed(mode: FetchMode, hit: bool) -> Box<dyn Strategy> {
        Box::new(Fixed {
            mode,
            hit,
            delay: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn test_first_hit_short_circuits() {
        let fetcher = PageFetcher::with_strategies(
            vec![
                fixed(FetchMode::Http, false),
                fixed(FetchMode::StorefrontJson, true),
                fixed(FetchMode::Browser, true),
            ],
            Duration::from_secs(5),
        );
        let result = fetcher.fetch("https://shop.test/x").await;
        assert!(result.success);
        assert_eq!(result.mode_used, Some(FetchMode::StorefrontJson));
        assert_eq!(result.metadata.attempts.len(), 2);
        assert_eq!(result.metadata.attempts[0].outcome, "nothing");
        assert_eq!(result.metadata.attempts[1].outcome, "hit");
        assert_eq!(result.content_hash().len(), 64);
    }

    #[tokio::test]
    async fn test_exhaustion_lists_attempts() {
        let fetcher = PageFetcher::with_strategies(
            vec![fixed(FetchMode::Http, false), fixed(FetchMode::Browser, false)],
            Duration::from_secs(5),
        );
        let result = fetcher.fetch("https://shop.test/x").await;
        assert!(!result.success);
        match result.error {
            Some(FetchError::Exhausted(summary)) => {
                assert!(summary.contains("http: nothing"));
                assert!(summary.contains("browser: nothing"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_covers_whole_chain() {
        let fetcher = PageFetcher::with_strategies(
            vec![Box::new(Fixed {
                mode: FetchMode::Browser,
                hit: true,
                delay: Duration::from_secs(30),
            })],
            Duration::from_millis(100),
        );
        let start = Instant::now();
        let result = fetcher.fetch("https://shop.test/x").await;
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(matches!(result.error, Some(FetchError::Timeout(_))));
        assert_eq!(result.metadata.attempts[0].outcome, "timed out");
    }

    #[tokio::test]
    async fn test_rejects_non_http_urls() {
        let fetcher = PageFetcher::with_strategies(Vec::new(), Duration::from_secs(1));
        let result = fetcher.fetch("ftp://shop.test/x").await;
        assert!(matches!(result.error, Some(FetchError::InvalidUrl(_))));
        let result = fetcher.fetch("not a url").await;
        assert!(matches!(result.error, Some(FetchError::InvalidUrl(_))));
    }
}
