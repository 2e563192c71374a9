//! Scheduled product checks.
//!
//! A cycle selects products that have an active tracker and no recent
//! successful check, then runs each through lock, fetch, extract,
//! reconcile, detect and record with bounded parallelism. Every product
//! outcome becomes a check run; one product's failure never stops the batch.

pub mod config;
mod error;
pub mod lock;
pub mod pipeline;
pub mod retry;
mod worker;

pub use config::SchedulerConfig;
pub use error::CheckError;
pub use lock::{CheckLock, LockGuard, SqliteCheckLock};
pub use pipeline::{normalize_product_url, IngestOutcome, Pipeline};
pub use retry::RetryPolicy;
pub use worker::{default_worker_id, CheckOutcome, CycleReport, Scheduler, SkipReason};
