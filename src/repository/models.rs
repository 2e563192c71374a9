//! Diesel ORM records for database tables.
//!
//! Records mirror table rows; conversion into domain models lives here too so
//! repositories only deal with one direction each.

use diesel::prelude::*;

use super::util::{format_timestamp, parse_datetime};
use crate::models::{
    Attributes, CheckRun, CheckStatus, Price, PriceHistoryEntry, Product, StockHistoryEntry,
    StockStatus, Tracker, Variant,
};
use crate::schema;

/// Product record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::products)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProductRecord {
    pub id: String,
    pub canonical_url: String,
    pub display_name: Option<String>,
    pub primary_image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New product for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::products)]
pub struct NewProduct<'a> {
    pub id: &'a str,
    pub canonical_url: &'a str,
    pub display_name: Option<&'a str>,
    pub primary_image_url: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Product fields refreshed by a check; `None` leaves the column alone.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = schema::products)]
pub struct ProductChanges<'a> {
    pub display_name: Option<&'a str>,
    pub primary_image_url: Option<&'a str>,
    pub updated_at: &'a str,
}

impl From<ProductRecord> for Product {
    fn from(record: ProductRecord) -> Self {
        Self {
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
            id: record.id,
            canonical_url: record.canonical_url,
            display_name: record.display_name,
            primary_image_url: record.primary_image_url,
        }
    }
}

/// Variant record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::variants)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct VariantRecord {
    pub id: String,
    pub product_id: String,
    pub attributes: String,
    pub sku: Option<String>,
    pub current_price_minor: Option<i64>,
    pub currency: Option<String>,
    pub current_stock_status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// New variant for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::variants)]
pub struct NewVariant<'a> {
    pub id: &'a str,
    pub product_id: &'a str,
    pub attributes: &'a str,
    pub sku: Option<&'a str>,
    pub current_price_minor: Option<i64>,
    pub currency: Option<&'a str>,
    pub current_stock_status: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

impl From<VariantRecord> for Variant {
    fn from(record: VariantRecord) -> Self {
        let attributes: Attributes = serde_json::from_str(&record.attributes).unwrap_or_else(|e| {
            tracing::warn!("Variant {} has unreadable attributes: {}", record.id, e);
            Attributes::new()
        });
        let current_price = record
            .current_price_minor
            .map(|amount| Price::new(amount, record.currency.as_deref()));
        Self {
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
            current_stock_status: StockStatus::from_str(&record.current_stock_status)
                .unwrap_or_default(),
            id: record.id,
            product_id: record.product_id,
            attributes,
            sku: record.sku,
            current_price,
        }
    }
}

/// Price history record from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::price_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PriceHistoryRecord {
    pub id: i64,
    pub variant_id: String,
    pub price_minor: i64,
    pub currency: Option<String>,
    pub recorded_at: String,
}

/// New price history entry for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::price_history)]
pub struct NewPriceHistory<'a> {
    pub variant_id: &'a str,
    pub price_minor: i64,
    pub currency: Option<&'a str>,
    pub recorded_at: &'a str,
}

impl From<PriceHistoryRecord> for PriceHistoryEntry {
    fn from(record: PriceHistoryRecord) -> Self {
        Self {
            id: record.id,
            price: Price::new(record.price_minor, record.currency.as_deref()),
            recorded_at: parse_datetime(&record.recorded_at),
            variant_id: record.variant_id,
        }
    }
}

/// Stock history record from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::stock_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StockHistoryRecord {
    pub id: i64,
    pub variant_id: String,
    pub status: String,
    pub recorded_at: String,
}

/// New stock history entry for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::stock_history)]
pub struct NewStockHistory<'a> {
    pub variant_id: &'a str,
    pub status: &'a str,
    pub recorded_at: &'a str,
}

impl From<StockHistoryRecord> for StockHistoryEntry {
    fn from(record: StockHistoryRecord) -> Self {
        Self {
            id: record.id,
            status: StockStatus::from_str(&record.status).unwrap_or_default(),
            recorded_at: parse_datetime(&record.recorded_at),
            variant_id: record.variant_id,
        }
    }
}

/// Check run record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::check_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CheckRunRecord {
    pub id: String,
    pub product_id: String,
    pub worker_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub status: String,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub fetch_mode: Option<String>,
    pub content_hash: Option<String>,
}

/// New check run for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::check_runs)]
pub struct NewCheckRun<'a> {
    pub id: &'a str,
    pub product_id: &'a str,
    pub worker_id: &'a str,
    pub started_at: String,
    pub finished_at: String,
    pub status: &'a str,
    pub error_message: Option<&'a str>,
    pub duration_ms: i64,
    pub fetch_mode: Option<&'a str>,
    pub content_hash: Option<&'a str>,
}

impl<'a> From<&'a CheckRun> for NewCheckRun<'a> {
    fn from(run: &'a CheckRun) -> Self {
        Self {
            id: &run.id,
            product_id: &run.product_id,
            worker_id: &run.worker_id,
            started_at: format_timestamp(run.started_at),
            finished_at: format_timestamp(run.finished_at),
            status: run.status.as_str(),
            error_message: run.error_message.as_deref(),
            duration_ms: run.duration_ms,
            fetch_mode: run.fetch_mode.as_deref(),
            content_hash: run.content_hash.as_deref(),
        }
    }
}

impl From<CheckRunRecord> for CheckRun {
    fn from(record: CheckRunRecord) -> Self {
        Self {
            started_at: parse_datetime(&record.started_at),
            finished_at: parse_datetime(&record.finished_at),
            status: CheckStatus::from_str(&record.status).unwrap_or(CheckStatus::Failed),
            id: record.id,
            product_id: record.product_id,
            worker_id: record.worker_id,
            error_message: record.error_message,
            duration_ms: record.duration_ms,
            fetch_mode: record.fetch_mode,
            content_hash: record.content_hash,
        }
    }
}

/// Tracker record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::trackers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TrackerRecord {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub active: i32,
    pub price_threshold_pct: Option<f64>,
    pub notify_restock: i32,
    pub created_at: String,
}

/// New tracker for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::trackers)]
pub struct NewTracker<'a> {
    pub id: &'a str,
    pub product_id: &'a str,
    pub user_id: &'a str,
    pub active: i32,
    pub price_threshold_pct: Option<f64>,
    pub notify_restock: i32,
    pub created_at: String,
}

impl<'a> From<&'a Tracker> for NewTracker<'a> {
    fn from(tracker: &'a Tracker) -> Self {
        Self {
            id: &tracker.id,
            product_id: &tracker.product_id,
            user_id: &tracker.user_id,
            active: tracker.active as i32,
            price_threshold_pct: tracker.price_threshold_pct,
            notify_restock: tracker.notify_restock as i32,
            created_at: format_timestamp(tracker.created_at),
        }
    }
}

impl From<TrackerRecord> for Tracker {
    fn from(record: TrackerRecord) -> Self {
        Self {
            id: record.id,
            product_id: record.product_id,
            user_id: record.user_id,
            active: record.active != 0,
            price_threshold_pct: record.price_threshold_pct,
            notify_restock: record.notify_restock != 0,
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Lease row behind the per-product check lock.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::check_locks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CheckLockRecord {
    pub product_id: String,
    pub holder: String,
    pub acquired_at: String,
    pub expires_at: String,
}
