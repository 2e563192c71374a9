//! Product-scoped advisory locks.
//!
//! The scheduler only sees [`CheckLock`] and [`LockGuard`]; the SQLite
//! implementation keeps a lease row per product so a crashed worker's lock
//! expires instead of starving the product.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::repository::{DbError, LockRepository};

/// Non-blocking per-product lock.
#[async_trait]
pub trait CheckLock: Send + Sync {
    /// Take the lock for a product, or `None` when someone else holds it.
    async fn try_lock(&self, product_id: &str) -> Result<Option<LockGuard>, DbError>;
}

/// A held lock. Call [`LockGuard::release`]; dropping it unreleased spawns
/// the release on the current runtime.
pub struct LockGuard {
    locks: LockRepository,
    key: String,
    holder: String,
    released: bool,
}

impl LockGuard {
    pub fn new(locks: LockRepository, key: &str, holder: &str) -> Self {
        Self {
            locks,
            key: key.to_string(),
            holder: holder.to_string(),
            released: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Give the lock back.
    pub async fn release(mut self) {
        self.released = true;
        match self.locks.release(&self.key, &self.holder).await {
            Ok(true) => debug!("Released check lock on {}", self.key),
            Ok(false) => warn!("Check lock on {} expired before release", self.key),
            Err(e) => warn!("Failed to release check lock on {}: {}", self.key, e),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let locks = self.locks.clone();
        let key = std::mem::take(&mut self.key);
        let holder = std::mem::take(&mut self.holder);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = locks.release(&key, &holder).await {
                        warn!("Failed to release abandoned check lock on {}: {}", key, e);
                    }
                });
            }
            Err(_) => warn!("Check lock on {} left to expire", key),
        }
    }
}

/// Lease-row lock shared by every process using the same database.
#[derive(Clone)]
pub struct SqliteCheckLock {
    locks: LockRepository,
    holder: String,
    ttl: chrono::Duration,
}

impl SqliteCheckLock {
    pub fn new(locks: LockRepository, holder: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            locks,
            holder: holder.into(),
            ttl: chrono::Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }
}

#[async_trait]
impl CheckLock for SqliteCheckLock {
    async fn try_lock(&self, product_id: &str) -> Result<Option<LockGuard>, DbError> {
        if self.locks.try_acquire(product_id, &self.holder, self.ttl).await? {
            Ok(Some(LockGuard::new(
                self.locks.clone(),
                product_id,
                &self.holder,
            )))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;
    use std::time::Duration;

    async fn setup() -> (tempfile::TempDir, DbContext) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (dir, ctx)
    }

    #[tokio::test]
    async fn test_second_holder_is_refused_until_release() {
        let (_dir, ctx) = setup().await;
        let a = SqliteCheckLock::new(ctx.locks(), "worker-a", 60);
        let b = SqliteCheckLock::new(ctx.locks(), "worker-b", 60);

        let guard = a.try_lock("p1").await.unwrap().unwrap();
        assert!(b.try_lock("p1").await.unwrap().is_none());
        assert!(b.try_lock("p2").await.unwrap().is_some());

        guard.release().await;
        assert!(b.try_lock("p1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_in_background() {
        let (_dir, ctx) = setup().await;
        let a = SqliteCheckLock::new(ctx.locks(), "worker-a", 60);

        drop(a.try_lock("p1").await.unwrap().unwrap());

        let mut released = false;
        for _ in 0..50 {
            if ctx.locks().current("p1").await.unwrap().is_none() {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(released);
    }
}
