//! Append-only price and stock observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Price, StockStatus};

/// A recorded price change for a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub id: i64,
    pub variant_id: String,
    pub price: Price,
    pub recorded_at: DateTime<Utc>,
}

/// A recorded stock status change for a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockHistoryEntry {
    pub id: i64,
    pub variant_id: String,
    pub status: StockStatus,
    pub recorded_at: DateTime<Utc>,
}
