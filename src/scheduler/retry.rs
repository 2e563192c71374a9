//! Bounded retry of persistence work with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::repository::util::is_transient;
use crate::repository::DbError;

/// Upper bound on a single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(5);

/// How often and how patiently to retry transient store failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: MAX_DELAY,
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Sum of every backoff sleep when all retries are used.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_retries).fold(Duration::ZERO, |total, retry| {
            total.saturating_add(self.delay_for(retry))
        })
    }

    /// Run `op` until it succeeds, fails permanently, or the retries run out.
    ///
    /// Each call of `op` must redo the whole unit of work; partial effects of
    /// a failed attempt are expected to have been rolled back.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, DbError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retry < self.max_retries && is_transient(&e) => {
                    let wait = self.delay_for(retry);
                    warn!(
                        "{} failed (attempt {}), retrying in {:?}: {}",
                        label,
                        retry + 1,
                        wait,
                        e
                    );
                    tokio::time::sleep(wait).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::util::to_diesel_error;
    use diesel::result::{DatabaseErrorKind, Error};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_total_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.total_backoff(), Duration::from_millis(700));
        assert_eq!(RetryPolicy::none().total_backoff(), Duration::ZERO);

        let capped = RetryPolicy::new(5, Duration::from_secs(2));
        assert_eq!(capped.total_backoff(), Duration::from_secs(2 + 4 + 5 + 5 + 5));
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(30), MAX_DELAY);
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = policy
            .run("write", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(to_diesel_error("database is locked"))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = policy
            .run("write", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(to_diesel_error("database is locked"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = policy
            .run("write", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::DatabaseError(
                    DatabaseErrorKind::UniqueViolation,
                    Box::new("duplicate".to_string()),
                ))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
