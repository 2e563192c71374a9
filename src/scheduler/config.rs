//! Scheduler configuration types.

use serde::{Deserialize, Serialize};

/// Check scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minimum time between successful checks of one product, in seconds.
    #[serde(default = "default_min_check_interval_secs")]
    pub min_check_interval_secs: u64,

    /// Maximum products selected per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent checks within one cycle.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Lifetime of a check lock lease, in seconds.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Retries of a product's persistence unit after a transient failure.
    #[serde(default = "default_persistence_retries")]
    pub persistence_retries: u32,

    /// First retry delay in milliseconds; doubles per retry.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Time between cycles when running continuously, in seconds.
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_check_interval_secs: default_min_check_interval_secs(),
            batch_size: default_batch_size(),
            workers: default_workers(),
            lock_ttl_secs: default_lock_ttl_secs(),
            persistence_retries: default_persistence_retries(),
            retry_base_ms: default_retry_base_ms(),
            cycle_interval_secs: default_cycle_interval_secs(),
        }
    }
}

fn default_min_check_interval_secs() -> u64 {
    3600
}

fn default_batch_size() -> usize {
    50
}

fn default_workers() -> usize {
    4
}

fn default_lock_ttl_secs() -> u64 {
    300
}

fn default_persistence_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    100
}

fn default_cycle_interval_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SchedulerConfig = toml::from_str("workers = 8\nbatch_size = 10").unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.min_check_interval_secs, 3600);
        assert_eq!(config.lock_ttl_secs, 300);
    }
}
