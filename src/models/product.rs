//! Product model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A product page being watched, keyed by its canonical URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub canonical_url: String,
    pub display_name: Option<String>,
    pub primary_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Create a new product for a URL that has not been seen before.
    pub fn new(canonical_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            canonical_url: canonical_url.into(),
            display_name: None,
            primary_image_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name to show in listings, falling back to the URL.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.canonical_url)
    }
}
