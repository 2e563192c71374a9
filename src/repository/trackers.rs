//! Read access to the tracking registry.
//!
//! Trackers belong to the user-facing CRUD layer. The pipeline only asks
//! whether a product is tracked and what the trackers want to hear about;
//! `insert` and `deactivate` exist for hosts that manage trackers themselves.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{NewTracker, TrackerRecord};
use super::pool::{DbError, DbPool};
use crate::models::Tracker;
use crate::schema::trackers;
use crate::with_conn;

/// Repository for trackers.
#[derive(Clone)]
pub struct TrackerRepository {
    pool: DbPool,
}

impl TrackerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, tracker: &Tracker) -> Result<(), DbError> {
        with_conn!(self.pool, conn, {
            diesel::insert_into(trackers::table)
                .values(&NewTracker::from(tracker))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Deactivate a tracker. Returns false when it does not exist.
    pub async fn deactivate(&self, tracker_id: &str) -> Result<bool, DbError> {
        with_conn!(self.pool, conn, {
            let updated = diesel::update(trackers::table.find(tracker_id))
                .set(trackers::active.eq(0))
                .execute(&mut conn)
                .await?;
            Ok(updated > 0)
        })
    }

    /// Number of active trackers on a product.
    pub async fn count_active(&self, product_id: &str) -> Result<i64, DbError> {
        with_conn!(self.pool, conn, {
            trackers::table
                .filter(trackers::product_id.eq(product_id))
                .filter(trackers::active.eq(1))
                .count()
                .get_result(&mut conn)
                .await
        })
    }

    /// Active trackers on a product with their notification preferences.
    pub async fn active_for_product(&self, product_id: &str) -> Result<Vec<Tracker>, DbError> {
        with_conn!(self.pool, conn, {
            trackers::table
                .filter(trackers::product_id.eq(product_id))
                .filter(trackers::active.eq(1))
                .order(trackers::created_at.asc())
                .select(TrackerRecord::as_select())
                .load(&mut conn)
                .await
                .map(|records| records.into_iter().map(Tracker::from).collect())
        })
    }
}
