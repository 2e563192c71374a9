//! Fetcher configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default deadline for a whole fetch, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

/// Default ceiling on fetched content size (10 MiB).
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 10 * 1024 * 1024;

/// Page fetcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Deadline for the whole strategy chain, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum bytes kept from any response body.
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,

    /// User agent: unset or "impersonate" for a real browser string,
    /// anything else is sent verbatim.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Accept-Language header sent with direct requests.
    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Try storefront JSON endpoints when a known platform is detected.
    #[serde(default = "default_true")]
    pub storefront_probe: bool,

    /// Skip browser renders when this process uses more than this many MB
    /// (0 disables).
    #[serde(default = "default_memory_threshold_mb")]
    pub memory_threshold_mb: u64,

    /// Skip browser renders when the host has less than this many MB
    /// available (0 disables).
    #[serde(default = "default_min_available_mb")]
    pub min_available_mb: u64,

    /// Headless browser settings.
    #[serde(default)]
    pub browser: BrowserEngineConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            user_agent: None,
            accept_language: default_accept_language(),
            storefront_probe: true,
            memory_threshold_mb: default_memory_threshold_mb(),
            min_available_mb: default_min_available_mb(),
            browser: BrowserEngineConfig::default(),
        }
    }
}

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Use the browser as the last fetch strategy.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Run in headless mode (default: true).
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Chrome/Chromium binary; searched in common locations when unset.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            chrome_path: None,
            proxy: None,
            chrome_args: Vec::new(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_max_content_bytes() -> usize {
    DEFAULT_MAX_CONTENT_BYTES
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}

fn default_memory_threshold_mb() -> u64 {
    1536
}

fn default_min_available_mb() -> u64 {
    256
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: FetchConfig = toml::from_str(
            r#"
            timeout_secs = 5
            [browser]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.max_content_bytes, DEFAULT_MAX_CONTENT_BYTES);
        assert!(config.storefront_probe);
        assert!(!config.browser.enabled);
        assert!(config.browser.headless);
    }
}
