//! Lease rows backing the per-product check lock.
//!
//! A lease is taken with a single upsert that only overwrites an expired
//! row, so two connections can never both believe they hold it.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::RunQueryDsl;

use super::models::CheckLockRecord;
use super::pool::{DbError, DbPool};
use super::util::{format_timestamp, parse_datetime};
use crate::schema::check_locks;
use crate::with_conn;

/// Repository for check lock leases.
#[derive(Clone)]
pub struct LockRepository {
    pool: DbPool,
}

impl LockRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Try to take the lease on `key` for `ttl`. Returns true on success.
    pub async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, DbError> {
        let now = Utc::now();
        let acquired_at = format_timestamp(now);
        let expires_at = format_timestamp(now + ttl);
        with_conn!(self.pool, conn, {
            let affected = diesel::sql_query(
                "INSERT INTO check_locks (product_id, holder, acquired_at, expires_at) \
                 VALUES (?, ?, ?, ?) \
                 ON CONFLICT(product_id) DO UPDATE SET \
                     holder = excluded.holder, \
                     acquired_at = excluded.acquired_at, \
                     expires_at = excluded.expires_at \
                 WHERE check_locks.expires_at < excluded.acquired_at",
            )
            .bind::<Text, _>(key)
            .bind::<Text, _>(holder)
            .bind::<Text, _>(acquired_at)
            .bind::<Text, _>(expires_at)
            .execute(&mut conn)
            .await?;
            Ok(affected == 1)
        })
    }

    /// Drop the lease if `holder` still owns it. Returns false when the lease
    /// had already expired and been taken by someone else.
    pub async fn release(&self, key: &str, holder: &str) -> Result<bool, DbError> {
        with_conn!(self.pool, conn, {
            let deleted = diesel::delete(
                check_locks::table
                    .filter(check_locks::product_id.eq(key))
                    .filter(check_locks::holder.eq(holder)),
            )
            .execute(&mut conn)
            .await?;
            Ok(deleted > 0)
        })
    }

    /// Current lease holder and expiry, expired or not.
    pub async fn current(&self, key: &str) -> Result<Option<(String, DateTime<Utc>)>, DbError> {
        with_conn!(self.pool, conn, {
            check_locks::table
                .find(key)
                .select(CheckLockRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
                .map(|r| r.map(|r| (r.holder, parse_datetime(&r.expires_at))))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;

    async fn setup() -> (tempfile::TempDir, LockRepository) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (dir, ctx.locks())
    }

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let (_dir, locks) = setup().await;
        let ttl = Duration::seconds(60);

        assert!(locks.try_acquire("p1", "a", ttl).await.unwrap());
        assert!(!locks.try_acquire("p1", "b", ttl).await.unwrap());
        assert!(!locks.try_acquire("p1", "a", ttl).await.unwrap());
        assert!(locks.try_acquire("p2", "b", ttl).await.unwrap());

        // Only the holder can release.
        assert!(!locks.release("p1", "b").await.unwrap());
        assert!(locks.release("p1", "a").await.unwrap());
        assert!(locks.try_acquire("p1", "b", ttl).await.unwrap());
        assert_eq!(locks.current("p1").await.unwrap().unwrap().0, "b");
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let (_dir, locks) = setup().await;

        assert!(locks
            .try_acquire("p1", "crashed", Duration::milliseconds(-1))
            .await
            .unwrap());
        assert!(locks
            .try_acquire("p1", "live", Duration::seconds(60))
            .await
            .unwrap());
        assert!(!locks.release("p1", "crashed").await.unwrap());
        assert!(locks.release("p1", "live").await.unwrap());
        assert!(locks.current("p1").await.unwrap().is_none());
    }
}
