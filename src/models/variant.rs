//! Variant model, prices and stock status.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variant attributes such as `size` or `color`, sorted by key.
pub type Attributes = BTreeMap<String, String>;

/// Availability of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    #[default]
    Unknown,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "in_stock",
            Self::OutOfStock => "out_of_stock",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_stock" => Some(Self::InStock),
            "out_of_stock" => Some(Self::OutOfStock),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Whether this status counts as a restock when followed by `in_stock`.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::OutOfStock | Self::Unknown)
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A price in hundredths of the currency unit.
///
/// Two prices are the same observation only when both the amount and the
/// currency match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Price {
    pub amount_minor: i64,
    pub currency: Option<String>,
}

impl Price {
    pub fn new(amount_minor: i64, currency: Option<&str>) -> Self {
        Self {
            amount_minor,
            currency: currency.map(|c| c.trim().to_ascii_uppercase()),
        }
    }

    /// Format the amount as a decimal string, e.g. `29.99`.
    pub fn major_string(&self) -> String {
        let sign = if self.amount_minor < 0 { "-" } else { "" };
        let abs = self.amount_minor.unsigned_abs();
        format!("{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.currency {
            Some(currency) => write!(f, "{} {}", self.major_string(), currency),
            None => f.write_str(&self.major_string()),
        }
    }
}

/// A purchasable configuration of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub product_id: String,
    pub attributes: Attributes,
    pub sku: Option<String>,
    pub current_price: Option<Price>,
    pub current_stock_status: StockStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    pub fn new(product_id: &str, attributes: Attributes, sku: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            attributes,
            sku,
            current_price: None,
            current_stock_status: StockStatus::Unknown,
            created_at: now,
            updated_at: now,
        }
    }

    /// Short human label like `color=Blue, size=M`.
    pub fn label(&self) -> String {
        if self.attributes.is_empty() {
            return "default".to_string();
        }
        self.attributes
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Canonical form used when comparing attribute sets: keys lowercased,
/// keys and values trimmed, values case-folded. Empty keys or values are
/// dropped.
pub fn normalize_attributes(attributes: &Attributes) -> Attributes {
    attributes
        .iter()
        .filter_map(|(k, v)| {
            let key = k.trim().to_lowercase();
            let value = v.trim().to_lowercase();
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((key, value))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_status_roundtrip() {
        for status in [
            StockStatus::InStock,
            StockStatus::OutOfStock,
            StockStatus::Unknown,
        ] {
            assert_eq!(StockStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(StockStatus::from_str("backorder"), None);
    }

    #[test]
    fn test_price_display() {
        assert_eq!(Price::new(2999, Some("usd")).to_string(), "29.99 USD");
        assert_eq!(Price::new(5, None).to_string(), "0.05");
        assert_eq!(Price::new(120000, Some("EUR")).major_string(), "1200.00");
    }

    #[test]
    fn test_price_equality_includes_currency() {
        assert_ne!(Price::new(2999, Some("USD")), Price::new(2999, Some("EUR")));
        assert_eq!(Price::new(2999, Some("usd")), Price::new(2999, Some("USD")));
    }

    #[test]
    fn test_normalize_attributes() {
        let mut attrs = Attributes::new();
        attrs.insert(" Size ".to_string(), " M ".to_string());
        attrs.insert("Color".to_string(), "Blue".to_string());
        attrs.insert("empty".to_string(), "  ".to_string());

        let normalized = normalize_attributes(&attrs);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized.get("size").map(String::as_str), Some("m"));
        assert_eq!(normalized.get("color").map(String::as_str), Some("blue"));
    }
}
