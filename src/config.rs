//! Configuration management for pricewatch using the prefer crate.
//!
//! Settings are resolved in layers: built-in defaults, then a config file
//! (an explicit `--config` path, or one discovered by `prefer`), then
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetcher::FetchConfig;
use crate::repository::pool::DEFAULT_BUSY_TIMEOUT_MS;
use crate::repository::{DbContext, DbPool};
use crate::scheduler::{RetryPolicy, SchedulerConfig};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "pricewatch.db";

/// Smallest content ceiling that can still hold a product page head.
const MIN_CONTENT_BYTES: usize = 16 * 1024;

/// Configuration failures. These are the only errors that stop the process
/// before any work is scheduled.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u64,
    pub fetch: FetchConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pricewatch");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            fetch: FetchConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Full path to the default database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }

    /// Create a database context for these settings.
    pub fn create_db_context(&self) -> DbContext {
        DbContext::with_pool(
            DbPool::new(&self.database_url()).with_busy_timeout(self.busy_timeout_ms),
        )
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        let fetch = &self.fetch;

        if let Some(url) = &self.database_url {
            if url.contains("://") && !url.starts_with("sqlite://") {
                return Err(ConfigError::Invalid(format!(
                    "unsupported database URL '{}': only SQLite is supported",
                    url
                )));
            }
        }
        if scheduler.workers == 0 {
            return Err(ConfigError::Invalid("scheduler.workers must be at least 1".into()));
        }
        if scheduler.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.batch_size must be at least 1".into(),
            ));
        }
        if scheduler.min_check_interval_secs == 0 || scheduler.cycle_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler intervals must be greater than zero".into(),
            ));
        }
        if fetch.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch.timeout_secs must be greater than zero".into(),
            ));
        }
        if fetch.max_content_bytes < MIN_CONTENT_BYTES {
            return Err(ConfigError::Invalid(format!(
                "fetch.max_content_bytes must be at least {}",
                MIN_CONTENT_BYTES
            )));
        }
        // The lease is not renewed, so it must outlive the slowest check.
        let hold = self.max_check_duration();
        let hold_secs = hold.as_secs() + u64::from(hold.subsec_nanos() > 0);
        if scheduler.lock_ttl_secs <= hold_secs {
            return Err(ConfigError::Invalid(format!(
                "scheduler.lock_ttl_secs ({}) must exceed the longest a check can take ({}s: \
                 fetch timeout, {} persist attempts waiting up to {}ms each, and backoff)",
                scheduler.lock_ttl_secs,
                hold_secs,
                scheduler.persistence_retries.saturating_add(1),
                self.busy_timeout_ms
            )));
        }
        Ok(())
    }

    /// Longest a single check can hold its lease: the fetch deadline, every
    /// persist attempt plus the check run insert blocking for the full busy
    /// timeout, and all backoff sleeps in between.
    pub fn max_check_duration(&self) -> Duration {
        let scheduler = &self.scheduler;
        let retry = RetryPolicy::new(
            scheduler.persistence_retries,
            Duration::from_millis(scheduler.retry_base_ms),
        );
        let blocking_writes = scheduler.persistence_retries.saturating_add(2);
        Duration::from_secs(self.fetch.timeout_secs)
            .saturating_add(
                Duration::from_millis(self.busy_timeout_ms).saturating_mul(blocking_writes),
            )
            .saturating_add(retry.total_backoff())
    }
}

/// Configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory; relative paths resolve against the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Full database URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Where this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery. Falls back to
    /// defaults when no config file exists.
    pub async fn load() -> Result<Self, ConfigError> {
        match prefer::load("pricewatch").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => {
                    tracing::debug!("Discovered config file: {}", path.display());
                    Self::load_from_path(path).await
                }
                None => Ok(Self::default()),
            },
            Err(_) => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file path. TOML is parsed for
    /// `.toml` files, JSON otherwise.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_error(e.to_string())),
            _ => serde_json::from_str(contents).map_err(|e| parse_error(e.to_string())),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref url) = self.database_url {
            settings.database_url = Some(url.clone());
        }
        if let Some(timeout) = self.busy_timeout_ms {
            settings.busy_timeout_ms = timeout;
        }
        settings.fetch = self.fetch.clone();
        settings.scheduler = self.scheduler.clone();
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has invalid value '{}'", name, value)))
}

fn parse_env_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(format!(
            "{} has invalid value '{}'",
            name, value
        ))),
    }
}

/// Apply environment overrides. `lookup` returns a variable's value.
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("DATABASE_URL") {
        settings.database_url = Some(url);
    }
    if let Some(dir) = get("PRICEWATCH_DATA_DIR") {
        settings.data_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
    }
    if let Some(v) = get("PRICEWATCH_WORKERS") {
        settings.scheduler.workers = parse_env("PRICEWATCH_WORKERS", &v)?;
    }
    if let Some(v) = get("PRICEWATCH_BATCH_SIZE") {
        settings.scheduler.batch_size = parse_env("PRICEWATCH_BATCH_SIZE", &v)?;
    }
    if let Some(v) = get("PRICEWATCH_MIN_CHECK_INTERVAL_SECS") {
        settings.scheduler.min_check_interval_secs =
            parse_env("PRICEWATCH_MIN_CHECK_INTERVAL_SECS", &v)?;
    }
    if let Some(v) = get("PRICEWATCH_CYCLE_INTERVAL_SECS") {
        settings.scheduler.cycle_interval_secs = parse_env("PRICEWATCH_CYCLE_INTERVAL_SECS", &v)?;
    }
    if let Some(v) = get("PRICEWATCH_FETCH_TIMEOUT_SECS") {
        settings.fetch.timeout_secs = parse_env("PRICEWATCH_FETCH_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = get("PRICEWATCH_USER_AGENT") {
        settings.fetch.user_agent = Some(v);
    }
    if let Some(v) = get("PRICEWATCH_BROWSER") {
        settings.fetch.browser.enabled = parse_env_bool("PRICEWATCH_BROWSER", &v)?;
    }
    Ok(())
}

/// Load settings: defaults, then the config file, then the environment.
/// The result is validated.
pub async fn load_settings(config_path: Option<&Path>) -> Result<(Settings, Config), ConfigError> {
    let config = match config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await?,
    };

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok())?;
    settings.validate()?;

    Ok((settings, config))
}
