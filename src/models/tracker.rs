//! User tracking subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's subscription to a product, with notification preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracker {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub active: bool,
    /// Minimum price drop, in percent, worth notifying about.
    pub price_threshold_pct: Option<f64>,
    pub notify_restock: bool,
    pub created_at: DateTime<Utc>,
}

impl Tracker {
    pub fn new(product_id: &str, user_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            user_id: user_id.to_string(),
            active: true,
            price_threshold_pct: None,
            notify_restock: true,
            created_at: Utc::now(),
        }
    }
}
