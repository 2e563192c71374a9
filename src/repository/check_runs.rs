//! Check run records and operational reporting over them.

use chrono::{DateTime, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{CheckRunRecord, NewCheckRun};
use super::pool::{DbError, DbPool};
use super::util::{format_timestamp, parse_datetime_opt};
use crate::models::{CheckRun, CheckStatus};
use crate::schema::check_runs;
use crate::with_conn;

/// Counts of check outcomes over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FailureStats {
    pub total: i64,
    pub failed: i64,
}

impl FailureStats {
    /// Fraction of runs that failed, 0.0 when there were none.
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

/// Repository for check runs. Runs are inserted once and never updated.
#[derive(Clone)]
pub struct CheckRunRepository {
    pool: DbPool,
}

impl CheckRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Persist a finished run.
    pub async fn insert(&self, run: &CheckRun) -> Result<(), DbError> {
        with_conn!(self.pool, conn, {
            diesel::insert_into(check_runs::table)
                .values(&NewCheckRun::from(run))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Most recent runs across all products.
    pub async fn recent(&self, limit: usize) -> Result<Vec<CheckRun>, DbError> {
        with_conn!(self.pool, conn, {
            check_runs::table
                .order(check_runs::started_at.desc())
                .limit(limit as i64)
                .select(CheckRunRecord::as_select())
                .load(&mut conn)
                .await
                .map(|records| records.into_iter().map(CheckRun::from).collect())
        })
    }

    /// Most recent failed runs.
    pub async fn recent_failures(&self, limit: usize) -> Result<Vec<CheckRun>, DbError> {
        with_conn!(self.pool, conn, {
            check_runs::table
                .filter(check_runs::status.eq(CheckStatus::Failed.as_str()))
                .order(check_runs::started_at.desc())
                .limit(limit as i64)
                .select(CheckRunRecord::as_select())
                .load(&mut conn)
                .await
                .map(|records| records.into_iter().map(CheckRun::from).collect())
        })
    }

    /// Runs of one product, newest first.
    pub async fn for_product(&self, product_id: &str, limit: usize) -> Result<Vec<CheckRun>, DbError> {
        with_conn!(self.pool, conn, {
            check_runs::table
                .filter(check_runs::product_id.eq(product_id))
                .order(check_runs::started_at.desc())
                .limit(limit as i64)
                .select(CheckRunRecord::as_select())
                .load(&mut conn)
                .await
                .map(|records| records.into_iter().map(CheckRun::from).collect())
        })
    }

    /// Runs that took at least `threshold_ms`, slowest first.
    pub async fn slow_runs(&self, threshold_ms: i64, limit: usize) -> Result<Vec<CheckRun>, DbError> {
        with_conn!(self.pool, conn, {
            check_runs::table
                .filter(check_runs::duration_ms.ge(threshold_ms))
                .order(check_runs::duration_ms.desc())
                .limit(limit as i64)
                .select(CheckRunRecord::as_select())
                .load(&mut conn)
                .await
                .map(|records| records.into_iter().map(CheckRun::from).collect())
        })
    }

    /// Outcome counts for runs started at or after `since`.
    pub async fn failure_stats(&self, since: DateTime<Utc>) -> Result<FailureStats, DbError> {
        let since = format_timestamp(since);
        with_conn!(self.pool, conn, {
            let total: i64 = check_runs::table
                .filter(check_runs::started_at.ge(&since))
                .count()
                .get_result(&mut conn)
                .await?;
            let failed: i64 = check_runs::table
                .filter(check_runs::started_at.ge(&since))
                .filter(check_runs::status.eq(CheckStatus::Failed.as_str()))
                .count()
                .get_result(&mut conn)
                .await?;
            Ok(FailureStats { total, failed })
        })
    }

    /// When the product last finished a successful check.
    pub async fn last_success_at(&self, product_id: &str) -> Result<Option<DateTime<Utc>>, DbError> {
        with_conn!(self.pool, conn, {
            let latest: Option<String> = check_runs::table
                .filter(check_runs::product_id.eq(product_id))
                .filter(check_runs::status.eq(CheckStatus::Success.as_str()))
                .select(max(check_runs::finished_at))
                .first(&mut conn)
                .await?;
            Ok(parse_datetime_opt(latest))
        })
    }
}
