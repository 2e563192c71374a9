//! Append-only price and stock history.
//!
//! Entries are only ever inserted. The autoincrement id is the append order,
//! so "most recent" means highest id.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{NewPriceHistory, NewStockHistory, PriceHistoryRecord, StockHistoryRecord};
use super::pool::{DbError, DbPool, SqliteConn};
use super::util::format_timestamp;
use crate::models::{Price, PriceHistoryEntry, StockHistoryEntry, StockStatus};
use crate::schema::{price_history, stock_history};
use crate::with_conn;

/// Repository for variant history.
#[derive(Clone)]
pub struct HistoryRepository {
    pool: DbPool,
}

impl HistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Price history of a variant, oldest first.
    pub async fn prices(&self, variant_id: &str) -> Result<Vec<PriceHistoryEntry>, DbError> {
        with_conn!(self.pool, conn, {
            price_history::table
                .filter(price_history::variant_id.eq(variant_id))
                .order(price_history::id.asc())
                .select(PriceHistoryRecord::as_select())
                .load(&mut conn)
                .await
                .map(|records| records.into_iter().map(PriceHistoryEntry::from).collect())
        })
    }

    /// Stock history of a variant, oldest first.
    pub async fn stock(&self, variant_id: &str) -> Result<Vec<StockHistoryEntry>, DbError> {
        with_conn!(self.pool, conn, {
            stock_history::table
                .filter(stock_history::variant_id.eq(variant_id))
                .order(stock_history::id.asc())
                .select(StockHistoryRecord::as_select())
                .load(&mut conn)
                .await
                .map(|records| records.into_iter().map(StockHistoryEntry::from).collect())
        })
    }

    pub(crate) async fn latest_price_on(
        conn: &mut SqliteConn,
        variant_id: &str,
    ) -> Result<Option<PriceHistoryEntry>, DbError> {
        price_history::table
            .filter(price_history::variant_id.eq(variant_id))
            .order(price_history::id.desc())
            .select(PriceHistoryRecord::as_select())
            .first(conn)
            .await
            .optional()
            .map(|r| r.map(PriceHistoryEntry::from))
    }

    pub(crate) async fn latest_stock_on(
        conn: &mut SqliteConn,
        variant_id: &str,
    ) -> Result<Option<StockHistoryEntry>, DbError> {
        stock_history::table
            .filter(stock_history::variant_id.eq(variant_id))
            .order(stock_history::id.desc())
            .select(StockHistoryRecord::as_select())
            .first(conn)
            .await
            .optional()
            .map(|r| r.map(StockHistoryEntry::from))
    }

    pub(crate) async fn append_price_on(
        conn: &mut SqliteConn,
        variant_id: &str,
        price: &Price,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let recorded_at = format_timestamp(recorded_at);
        diesel::insert_into(price_history::table)
            .values(&NewPriceHistory {
                variant_id,
                price_minor: price.amount_minor,
                currency: price.currency.as_deref(),
                recorded_at: &recorded_at,
            })
            .execute(conn)
            .await?;
        Ok(())
    }

    pub(crate) async fn append_stock_on(
        conn: &mut SqliteConn,
        variant_id: &str,
        status: StockStatus,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let recorded_at = format_timestamp(recorded_at);
        diesel::insert_into(stock_history::table)
            .values(&NewStockHistory {
                variant_id,
                status: status.as_str(),
                recorded_at: &recorded_at,
            })
            .execute(conn)
            .await?;
        Ok(())
    }
}
