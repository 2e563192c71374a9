//! Hand-off of change events to the notification layer.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{ChangeEvent, ChangeKind, Tracker};
use crate::repository::{DbError, TrackerRepository};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("event receiver closed")]
    Closed,
}

/// Receives events after the check that produced them has committed.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn deliver(&self, events: &[ChangeEvent]) -> Result<(), SinkError>;
}

/// Forwards events over a tokio channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ChangeEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ChangeEvent>) -> Self {
        Self { tx }
    }

    /// A sink and the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl ChangeSink for ChannelSink {
    async fn deliver(&self, events: &[ChangeEvent]) -> Result<(), SinkError> {
        for event in events {
            self.tx
                .send(event.clone())
                .await
                .map_err(|_| SinkError::Closed)?;
        }
        Ok(())
    }
}

/// Logs events, and with a tracker registry, who they would reach.
#[derive(Clone, Default)]
pub struct LogSink {
    trackers: Option<TrackerRepository>,
    filter: NotificationFilter,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log the trackers each event is addressed to.
    pub fn with_trackers(trackers: TrackerRepository) -> Self {
        Self {
            trackers: Some(trackers),
            filter: NotificationFilter,
        }
    }

    /// Active trackers per event that the filter lets through, in event order.
    ///
    /// Empty lists when no registry is attached.
    pub async fn recipients(&self, events: &[ChangeEvent]) -> Result<Vec<Vec<Tracker>>, DbError> {
        let Some(repo) = &self.trackers else {
            return Ok(vec![Vec::new(); events.len()]);
        };
        let mut by_product: HashMap<&str, Vec<Tracker>> = HashMap::new();
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            if !by_product.contains_key(event.product_id.as_str()) {
                let active = repo.active_for_product(&event.product_id).await?;
                by_product.insert(event.product_id.as_str(), active);
            }
            let trackers = &by_product[event.product_id.as_str()];
            out.push(
                self.filter
                    .recipients(trackers, event)
                    .into_iter()
                    .cloned()
                    .collect(),
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl ChangeSink for LogSink {
    async fn deliver(&self, events: &[ChangeEvent]) -> Result<(), SinkError> {
        for event in events {
            info!("Change on product {}: {}", event.product_id, event);
        }
        if self.trackers.is_none() {
            return Ok(());
        }
        match self.recipients(events).await {
            Ok(recipients) => {
                for (event, trackers) in events.iter().zip(&recipients) {
                    if trackers.is_empty() {
                        debug!("No tracker wants {} on {}", event.kind.as_str(), event.variant_id);
                        continue;
                    }
                    let users: Vec<&str> = trackers.iter().map(|t| t.user_id.as_str()).collect();
                    info!(
                        "Notify {} of {} on {}",
                        users.join(", "),
                        event.kind.as_str(),
                        event.variant_id
                    );
                }
            }
            Err(e) => warn!("Could not resolve recipients for {} event(s): {}", events.len(), e),
        }
        Ok(())
    }
}

/// Decides which trackers want to hear about an event.
///
/// Price events reach a tracker when the price dropped by at least its
/// threshold (any drop when it has none). Restocks reach trackers that opted
/// in. Other stock transitions are recorded but not notified.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationFilter;

impl NotificationFilter {
    pub fn wants(&self, tracker: &Tracker, event: &ChangeEvent) -> bool {
        if !tracker.active || tracker.product_id != event.product_id {
            return false;
        }
        match event.kind {
            ChangeKind::Price => match event.price_change_pct() {
                Some(pct) if pct < 0.0 => {
                    tracker.price_threshold_pct.map_or(true, |threshold| -pct >= threshold)
                }
                _ => false,
            },
            ChangeKind::Restock => tracker.notify_restock,
            ChangeKind::Stock => false,
        }
    }

    /// Trackers that should be notified of an event.
    pub fn recipients<'a>(&self, trackers: &'a [Tracker], event: &ChangeEvent) -> Vec<&'a Tracker> {
        trackers.iter().filter(|t| self.wants(t, event)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeValue, Price, StockStatus};
    use chrono::Utc;

    fn price_event(old: i64, new: i64) -> ChangeEvent {
        ChangeEvent {
            variant_id: "v".into(),
            product_id: "p".into(),
            kind: ChangeKind::Price,
            old_value: ChangeValue::Price(Price::new(old, Some("USD"))),
            new_value: ChangeValue::Price(Price::new(new, Some("USD"))),
            detected_at: Utc::now(),
        }
    }

    fn stock_event(kind: ChangeKind, old: StockStatus, new: StockStatus) -> ChangeEvent {
        ChangeEvent {
            variant_id: "v".into(),
            product_id: "p".into(),
            kind,
            old_value: ChangeValue::Stock { status: old },
            new_value: ChangeValue::Stock { status: new },
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_price_threshold() {
        let filter = NotificationFilter;
        let mut tracker = Tracker::new("p", "u");
        tracker.price_threshold_pct = Some(10.0);
        assert!(filter.wants(&tracker, &price_event(10000, 9000)));
        assert!(!filter.wants(&tracker, &price_event(10000, 9500)));
        assert!(!filter.wants(&tracker, &price_event(10000, 12000)));

        let mut other_currency = price_event(10000, 9000);
        other_currency.new_value = ChangeValue::Price(Price::new(9000, Some("EUR")));
        assert!(!filter.wants(&tracker, &other_currency));

        tracker.price_threshold_pct = None;
        assert!(filter.wants(&tracker, &price_event(10000, 9999)));
        assert!(!filter.wants(&tracker, &other_currency));
    }

    #[test]
    fn test_restock_opt_in_and_inactive_trackers() {
        let filter = NotificationFilter;
        let restock = stock_event(ChangeKind::Restock, StockStatus::OutOfStock, StockStatus::InStock);
        let mut opted_out = Tracker::new("p", "a");
        opted_out.notify_restock = false;
        let mut inactive = Tracker::new("p", "b");
        inactive.active = false;
        let opted_in = Tracker::new("p", "c");
        let other_product = Tracker::new("q", "d");

        let trackers = vec![opted_out, inactive, opted_in, other_product];
        let recipients = filter.recipients(&trackers, &restock);
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].user_id, "c");

        let sold_out = stock_event(ChangeKind::Stock, StockStatus::InStock, StockStatus::OutOfStock);
        assert!(filter.recipients(&trackers, &sold_out).is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::channel(8);
        sink.deliver(&[price_event(2, 1), price_event(3, 2)]).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().old_value, ChangeValue::Price(Price::new(2, Some("USD"))));
        assert_eq!(rx.recv().await.unwrap().old_value, ChangeValue::Price(Price::new(3, Some("USD"))));

        drop(rx);
        assert!(matches!(
            sink.deliver(&[price_event(1, 0)]).await,
            Err(SinkError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_log_sink_resolves_recipients_from_registry() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::repository::DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let product = ctx.products().register("https://shop.test/sink").await.unwrap();

        let mut picky = Tracker::new(&product.id, "alice");
        picky.price_threshold_pct = Some(20.0);
        picky.notify_restock = false;
        let casual = Tracker::new(&product.id, "bob");
        ctx.trackers().insert(&picky).await.unwrap();
        ctx.trackers().insert(&casual).await.unwrap();

        let mut small_drop = price_event(10000, 9000);
        small_drop.product_id = product.id.clone();
        let mut big_drop = price_event(10000, 7000);
        big_drop.product_id = product.id.clone();
        let mut restock = stock_event(ChangeKind::Restock, StockStatus::OutOfStock, StockStatus::InStock);
        restock.product_id = product.id.clone();
        let events = vec![small_drop, big_drop, restock];

        let sink = LogSink::with_trackers(ctx.trackers());
        let recipients = sink.recipients(&events).await.unwrap();
        let users: Vec<Vec<&str>> = recipients
            .iter()
            .map(|ts| ts.iter().map(|t| t.user_id.as_str()).collect())
            .collect();
        assert_eq!(users[0], vec!["bob"]);
        assert_eq!(users[1].len(), 2);
        assert!(users[1].contains(&"alice") && users[1].contains(&"bob"));
        assert_eq!(users[2], vec!["bob"]);
        sink.deliver(&events).await.unwrap();

        let bare = LogSink::new();
        assert!(bare.recipients(&events).await.unwrap().iter().all(Vec::is_empty));
    }
}
