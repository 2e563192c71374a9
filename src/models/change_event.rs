//! Change events emitted by the change detector.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Price, StockStatus};

/// What kind of change was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Price,
    /// Moved from out of stock or unknown to in stock.
    Restock,
    /// Any other stock transition.
    Stock,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Restock => "restock",
            Self::Stock => "stock",
        }
    }
}

/// Value on either side of a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeValue {
    Price(Price),
    Stock { status: StockStatus },
}

impl fmt::Display for ChangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Price(price) => price.fmt(f),
            Self::Stock { status } => status.fmt(f),
        }
    }
}

/// A notification-worthy change on one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub variant_id: String,
    pub product_id: String,
    pub kind: ChangeKind,
    pub old_value: ChangeValue,
    pub new_value: ChangeValue,
    pub detected_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Price movement as a percentage of the old price, negative for drops.
    /// `None` when the two prices are in different known currencies.
    pub fn price_change_pct(&self) -> Option<f64> {
        match (&self.old_value, &self.new_value) {
            (ChangeValue::Price(old), ChangeValue::Price(new)) if old.amount_minor != 0 => {
                if let (Some(a), Some(b)) = (&old.currency, &new.currency) {
                    if a != b {
                        return None;
                    }
                }
                let delta = (new.amount_minor - old.amount_minor) as f64;
                Some(delta / old.amount_minor as f64 * 100.0)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} -> {}",
            self.variant_id,
            self.kind.as_str(),
            self.old_value,
            self.new_value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_change_pct() {
        let event = ChangeEvent {
            variant_id: "v".into(),
            product_id: "p".into(),
            kind: ChangeKind::Price,
            old_value: ChangeValue::Price(Price::new(2000, Some("USD"))),
            new_value: ChangeValue::Price(Price::new(1500, Some("USD"))),
            detected_at: Utc::now(),
        };
        let pct = event.price_change_pct().unwrap();
        assert!((pct + 25.0).abs() < f64::EPSILON);
        assert_eq!(event.to_string(), "v price: 20.00 USD -> 15.00 USD");

        let switched = ChangeEvent {
            new_value: ChangeValue::Price(Price::new(1500, Some("EUR"))),
            ..event.clone()
        };
        assert_eq!(switched.price_change_pct(), None);

        let unlabelled = ChangeEvent {
            new_value: ChangeValue::Price(Price::new(1500, None)),
            ..event
        };
        assert!(unlabelled.price_change_pct().is_some());
    }
}
