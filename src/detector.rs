//! Change detection against variant history.
//!
//! History is append-only: an entry is written only when the observed value
//! differs from the most recent one, so re-recording the same observation is
//! a no-op.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{ChangeEvent, ChangeKind, ChangeValue, Price, StockStatus};
use crate::repository::{DbError, HistoryRepository, SqliteConn, VariantRepository};

/// Compares observations with history and records what changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Record one observation of a variant and return the resulting events.
    ///
    /// Runs on the caller's connection, normally inside the product's
    /// transaction. The variant row is written first so that the history
    /// reads below happen under the write lock.
    pub async fn record(
        &self,
        conn: &mut SqliteConn,
        product_id: &str,
        variant_id: &str,
        price: Option<&Price>,
        stock: StockStatus,
        observed_at: DateTime<Utc>,
    ) -> Result<Vec<ChangeEvent>, DbError> {
        VariantRepository::touch_on(conn, variant_id).await?;

        let mut events = Vec::new();
        let event = |kind, old_value, new_value| ChangeEvent {
            variant_id: variant_id.to_string(),
            product_id: product_id.to_string(),
            kind,
            old_value,
            new_value,
            detected_at: observed_at,
        };

        if let Some(price) = price {
            match HistoryRepository::latest_price_on(conn, variant_id).await? {
                None => {
                    HistoryRepository::append_price_on(conn, variant_id, price, observed_at).await?;
                }
                Some(last) if last.price != *price => {
                    HistoryRepository::append_price_on(conn, variant_id, price, observed_at).await?;
                    events.push(event(
                        ChangeKind::Price,
                        ChangeValue::Price(last.price),
                        ChangeValue::Price(price.clone()),
                    ));
                }
                Some(_) => {}
            }
        }

        match HistoryRepository::latest_stock_on(conn, variant_id).await? {
            None => {
                HistoryRepository::append_stock_on(conn, variant_id, stock, observed_at).await?;
            }
            Some(last) if last.status != stock => {
                HistoryRepository::append_stock_on(conn, variant_id, stock, observed_at).await?;
                let kind = if stock == StockStatus::InStock && last.status.is_unavailable() {
                    ChangeKind::Restock
                } else {
                    ChangeKind::Stock
                };
                events.push(event(
                    kind,
                    ChangeValue::Stock { status: last.status },
                    ChangeValue::Stock { status: stock },
                ));
            }
            Some(_) => {}
        }

        VariantRepository::update_current_on(conn, variant_id, price, stock).await?;

        if !events.is_empty() {
            debug!("Variant {}: {} change(s)", variant_id, events.len());
        }
        Ok(events)
    }
}
