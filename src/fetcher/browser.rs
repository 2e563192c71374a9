//! Headless browser rendering for pages that need JavaScript.
//!
//! Uses chromiumoxide (CDP). The browser is launched lazily, reused across
//! renders and torn down after a failed render or under memory pressure.
//! Every page is closed, also when the render future is dropped mid-way.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

#[cfg(feature = "browser")]
use std::time::Duration;

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tracing::{debug, warn};

use super::config::BrowserEngineConfig;
use super::memory::MemoryGuard;
use super::{ContentKind, FetchContext, FetchError, FetchMode, FetchedPage, Strategy, StrategyOutcome};
use crate::extractor::sanitize::truncate_utf8;

/// Resolves once the DOM has been parsed; does not wait for network idle.
#[cfg(feature = "browser")]
const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

#[cfg(feature = "browser")]
const STEALTH_SCRIPTS: &[&str] = &[
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });
    "#,
];

/// Markup read from a rendered page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: String,
    pub content: String,
}

/// Closes the page when dropped without an explicit close.
#[cfg(feature = "browser")]
struct PageGuard {
    page: Option<Page>,
}

#[cfg(feature = "browser")]
impl PageGuard {
    async fn close(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close page: {}", e);
            }
        }
    }
}

#[cfg(feature = "browser")]
impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = page.close().await;
                });
            }
        }
    }
}

/// A lazily launched, reusable headless browser.
pub struct BrowserFetcher {
    config: BrowserEngineConfig,
    #[cfg_attr(not(feature = "browser"), allow(dead_code))]
    timeout_secs: u64,
    #[cfg_attr(not(feature = "browser"), allow(dead_code))]
    user_agent: String,
    #[cfg(feature = "browser")]
    browser: Option<Browser>,
    #[cfg(feature = "browser")]
    handler: Option<tokio::task::JoinHandle<()>>,
}

impl BrowserFetcher {
    pub fn new(config: BrowserEngineConfig, timeout_secs: u64, user_agent: String) -> Self {
        Self {
            config,
            timeout_secs,
            user_agent,
            #[cfg(feature = "browser")]
            browser: None,
            #[cfg(feature = "browser")]
            handler: None,
        }
    }

    pub fn config(&self) -> &BrowserEngineConfig {
        &self.config
    }
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    /// Whether a browser process is currently held.
    pub fn is_running(&self) -> bool {
        self.browser.is_some()
    }

    async fn ensure_browser(&mut self) -> Result<&Browser, FetchError> {
        if self.browser.is_none() {
            info!("Launching browser (headless={})", self.config.headless);

            let mut builder = BrowserConfig::builder();
            if let Some(ref path) = self.config.chrome_path {
                builder = builder.chrome_executable(path);
            }
            if !self.config.headless {
                builder = builder.with_head();
            }
            if let Some(ref proxy) = self.config.proxy {
                builder = builder.arg(format!("--proxy-server={}", proxy));
            }
            builder = builder
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--disable-background-networking")
                .arg("--no-sandbox")
                .arg("--disable-gpu");
            for arg in &self.config.chrome_args {
                builder = builder.arg(arg);
            }

            let config = builder
                .build()
                .map_err(|e| FetchError::Browser(format!("failed to build browser config: {}", e)))?;
            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| FetchError::Browser(format!("failed to launch browser: {}", e)))?;

            self.handler = Some(tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            }));
            self.browser = Some(browser);
        }

        self.browser
            .as_ref()
            .ok_or_else(|| FetchError::Browser("browser not initialized".to_string()))
    }

    /// Render a URL in a fresh page and return its markup.
    pub async fn render(&mut self, url: &str) -> Result<RenderedPage, FetchError> {
        let page = {
            let browser = self.ensure_browser().await?;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| FetchError::Browser(format!("failed to open page: {}", e)))?
        };
        let guard = PageGuard {
            page: Some(page.clone()),
        };
        let result = self.render_inner(&page, url).await;
        guard.close().await;
        result
    }

    async fn render_inner(&self, page: &Page, url: &str) -> Result<RenderedPage, FetchError> {
        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(|e| FetchError::Browser(format!("failed to set user agent: {}", e)))?;

        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        page.execute(nav_params)
            .await
            .map_err(|e| FetchError::Browser(format!("navigation failed for {}: {}", url, e)))?;

        let ready_timeout = Duration::from_secs(self.timeout_secs.max(1));
        match tokio::time::timeout(ready_timeout, page.evaluate(WAIT_FOR_READY_SCRIPT.to_string())).await {
            Ok(Ok(result)) => {
                let state: String = result.into_value().unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => debug!("Could not check ready state: {}", e),
            Err(_) => warn!("Timeout waiting for page ready state"),
        }

        for script in STEALTH_SCRIPTS {
            if let Err(e) = page.evaluate(script.to_string()).await {
                debug!("Stealth script injection skipped: {}", e);
            }
        }

        let final_url = page
            .url()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?
            .unwrap_or_else(|| url.to_string());
        let content = page
            .content()
            .await
            .map_err(|e| FetchError::Browser(format!("failed to read content: {}", e)))?;

        Ok(RenderedPage { final_url, content })
    }

    /// Close the browser and its child process.
    pub async fn shutdown(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            info!("Shutting down browser");
            if let Err(e) = browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            let _ = browser.wait().await;
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub fn is_running(&self) -> bool {
        false
    }

    pub async fn render(&mut self, _url: &str) -> Result<RenderedPage, FetchError> {
        Err(FetchError::Browser(
            "browser support not compiled in (enable the 'browser' feature)".to_string(),
        ))
    }

    pub async fn shutdown(&mut self) {}
}

/// Last-resort strategy: render the page in the headless browser.
pub(super) struct BrowserStrategy {
    browser: Arc<Mutex<BrowserFetcher>>,
    guard: MemoryGuard,
    enabled: bool,
    max_bytes: usize,
}

impl BrowserStrategy {
    pub(super) fn new(
        browser: Arc<Mutex<BrowserFetcher>>,
        guard: MemoryGuard,
        enabled: bool,
        max_bytes: usize,
    ) -> Self {
        Self {
            browser,
            guard,
            enabled,
            max_bytes,
        }
    }
}

#[async_trait]
impl Strategy for BrowserStrategy {
    fn mode(&self) -> FetchMode {
        FetchMode::Browser
    }

    async fn attempt(&self, ctx: &mut FetchContext) -> StrategyOutcome {
        if !self.enabled {
            return StrategyOutcome::Miss("browser disabled".to_string());
        }

        if self.guard.under_pressure() {
            {
                let mut browser = self.browser.lock().await;
                if browser.is_running() {
                    info!("Releasing browser to reclaim memory");
                    browser.shutdown().await;
                }
            }
            if self.guard.under_pressure() {
                return StrategyOutcome::Miss("memory pressure".to_string());
            }
        }

        let mut browser = self.browser.lock().await;
        match browser.render(ctx.url.as_str()).await {
            Ok(rendered) => {
                let truncated = rendered.content.len() > self.max_bytes;
                let content = truncate_utf8(&rendered.content, self.max_bytes).to_string();
                StrategyOutcome::Hit(FetchedPage {
                    status_code: None,
                    content,
                    content_kind: ContentKind::Html,
                    final_url: rendered.final_url,
                    content_type: Some("text/html".to_string()),
                    truncated,
                })
            }
            Err(e) => {
                browser.shutdown().await;
                StrategyOutcome::Miss(e.to_string())
            }
        }
    }

    async fn shutdown(&self) {
        self.browser.lock().await.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn test_disabled_browser_misses_without_launching() {
        let fetcher = BrowserFetcher::new(BrowserEngineConfig::default(), 5, "ua".to_string());
        let strategy = BrowserStrategy::new(
            Arc::new(Mutex::new(fetcher)),
            MemoryGuard::new(0, 0),
            false,
            1024,
        );
        let mut ctx = FetchContext::new(Url::parse("https://shop.test/p").unwrap());
        match strategy.attempt(&mut ctx).await {
            StrategyOutcome::Miss(reason) => assert_eq!(reason, "browser disabled"),
            StrategyOutcome::Hit(_) => panic!("disabled browser must not render"),
        }
        assert!(!strategy.browser.lock().await.is_running());
    }
}
