//! Domain models for tracked products and their observations.

mod change_event;
mod check_run;
mod history;
mod product;
mod tracker;
mod variant;

pub use change_event::{ChangeEvent, ChangeKind, ChangeValue};
pub use check_run::{CheckRun, CheckStatus};
pub use history::{PriceHistoryEntry, StockHistoryEntry};
pub use product::Product;
pub use tracker::Tracker;
pub use variant::{normalize_attributes, Attributes, Price, StockStatus, Variant};
