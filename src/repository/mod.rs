//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM over SQLite. Repositories open a
//! connection per call; the `*_on` functions run on a caller-provided
//! connection so several writes can share one transaction.

pub mod check_runs;
pub mod context;
pub mod history;
pub mod locks;
pub mod models;
pub mod pool;
pub mod products;
pub mod trackers;
pub mod util;
pub mod variants;

pub use check_runs::{CheckRunRepository, FailureStats};
pub use context::DbContext;
pub use history::HistoryRepository;
pub use locks::LockRepository;
pub use pool::{DbError, DbPool, SqliteConn};
pub use products::{DueProduct, ProductRepository};
pub use trackers::TrackerRepository;
pub use util::{format_timestamp, parse_datetime, parse_datetime_opt};
pub use variants::VariantRepository;
