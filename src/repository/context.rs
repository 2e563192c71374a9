//! Database context for managing the connection pool and repository access.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::check_runs::CheckRunRepository;
use super::history::HistoryRepository;
use super::locks::LockRepository;
use super::pool::{DbError, DbPool};
use super::products::ProductRepository;
use super::trackers::TrackerRepository;
use super::variants::VariantRepository;

/// Database context that owns the connection pool and hands out repositories.
///
/// Create one context per command or service, then use it to access all
/// repositories.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_url(&settings.database_url());
/// ctx.init_schema().await?;
/// let product = ctx.products().get_by_url(url).await?;
/// ```
#[derive(Clone, Debug)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Create a new database context from a file path.
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: DbPool::from_path(db_path),
        }
    }

    /// Create a new database context from a database URL such as
    /// `sqlite:path/to/db.sqlite` or a plain file path.
    pub fn from_url(database_url: &str) -> Self {
        Self {
            pool: DbPool::new(database_url),
        }
    }

    /// Create a context with an existing pool.
    pub fn with_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn variants(&self) -> VariantRepository {
        VariantRepository::new(self.pool.clone())
    }

    pub fn history(&self) -> HistoryRepository {
        HistoryRepository::new(self.pool.clone())
    }

    pub fn check_runs(&self) -> CheckRunRepository {
        CheckRunRepository::new(self.pool.clone())
    }

    pub fn trackers(&self) -> TrackerRepository {
        TrackerRepository::new(self.pool.clone())
    }

    pub fn locks(&self) -> LockRepository {
        LockRepository::new(self.pool.clone())
    }

    /// Verify that a connection can be opened.
    pub async fn test_connection(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute("SELECT 1").await
    }

    /// Initialize all database tables and indexes.
    ///
    /// Safe to run repeatedly; existing tables are left untouched.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                canonical_url TEXT NOT NULL UNIQUE,
                display_name TEXT,
                primary_image_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS variants (
                id TEXT PRIMARY KEY,
                product_id TEXT NOT NULL REFERENCES products(id),
                attributes TEXT NOT NULL DEFAULT '{}',
                sku TEXT,
                current_price_minor INTEGER,
                currency TEXT,
                current_stock_status TEXT NOT NULL DEFAULT 'unknown',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_variants_product ON variants(product_id);

            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                variant_id TEXT NOT NULL REFERENCES variants(id),
                price_minor INTEGER NOT NULL,
                currency TEXT,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_price_history_variant ON price_history(variant_id, id);

            CREATE TABLE IF NOT EXISTS stock_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                variant_id TEXT NOT NULL REFERENCES variants(id),
                status TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_stock_history_variant ON stock_history(variant_id, id);

            CREATE TABLE IF NOT EXISTS check_runs (
                id TEXT PRIMARY KEY,
                product_id TEXT NOT NULL REFERENCES products(id),
                worker_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                duration_ms INTEGER NOT NULL,
                fetch_mode TEXT,
                content_hash TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_check_runs_product
                ON check_runs(product_id, status, finished_at);
            CREATE INDEX IF NOT EXISTS idx_check_runs_started ON check_runs(started_at);

            CREATE TABLE IF NOT EXISTS trackers (
                id TEXT PRIMARY KEY,
                product_id TEXT NOT NULL REFERENCES products(id),
                user_id TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                price_threshold_pct REAL,
                notify_restock INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trackers_product ON trackers(product_id, active);

            CREATE TABLE IF NOT EXISTS check_locks (
                product_id TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                acquired_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            "#,
        )
        .await
    }
}
