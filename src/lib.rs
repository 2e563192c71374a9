//! pricewatch - price and availability change detection for product pages.
//!
//! Tracked product pages are re-fetched on an interval through a chain of
//! fetch strategies, turned into normalized product and variant records,
//! matched against stored variants, and compared with their history. Every
//! price or stock change becomes a [`ChangeEvent`] for a notification layer
//! to act on.

pub mod cli;
pub mod config;
pub mod detector;
pub mod dispatch;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod reconciler;
pub mod repository;
pub mod schema;
pub mod scheduler;

pub use config::{load_settings, Config, ConfigError, Settings};
pub use detector::ChangeDetector;
pub use dispatch::{ChangeSink, ChannelSink, LogSink, NotificationFilter};
pub use extractor::{ExtractionError, Extractor, ProductShell, VariantCandidate};
pub use fetcher::{Fetch, FetchConfig, FetchError, FetchResult, PageFetcher, DEFAULT_MAX_CONTENT_BYTES};
pub use models::{ChangeEvent, ChangeKind, CheckRun, Price, Product, StockStatus, Tracker, Variant};
pub use reconciler::VariantReconciler;
pub use repository::DbContext;
pub use scheduler::{CheckOutcome, CycleReport, Pipeline, Scheduler, SchedulerConfig};
