//! The check cycle: select due products, then lock, check and record each.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::config::SchedulerConfig;
use super::error::CheckError;
use super::lock::{CheckLock, SqliteCheckLock};
use super::pipeline::Pipeline;
use super::retry::RetryPolicy;
use crate::dispatch::{ChangeSink, LogSink};
use crate::extractor::Extractor;
use crate::fetcher::Fetch;
use crate::models::{ChangeEvent, CheckRun};
use crate::repository::{DbContext, DbError, DueProduct};

/// Why a product was not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another worker holds the product's lock.
    LockUnavailable,
    /// A check finished within the interval after this one was selected.
    RecentlyChecked,
}

/// Result of checking one product.
#[derive(Debug)]
pub enum CheckOutcome {
    Completed {
        run: CheckRun,
        events: Vec<ChangeEvent>,
    },
    Failed {
        run: CheckRun,
        error: CheckError,
    },
    Skipped(SkipReason),
}

impl CheckOutcome {
    /// The recorded run, unless the check was skipped.
    pub fn run(&self) -> Option<&CheckRun> {
        match self {
            Self::Completed { run, .. } | Self::Failed { run, .. } => Some(run),
            Self::Skipped(_) => None,
        }
    }
}

/// Counts from one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub selected: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped_locked: usize,
    pub skipped_recent: usize,
    pub events: usize,
    /// The cycle did not run because another one was in progress.
    pub already_running: bool,
    pub duration_ms: u64,
}

impl CycleReport {
    fn add(&mut self, outcome: &CheckOutcome) {
        match outcome {
            CheckOutcome::Completed { events, .. } => {
                self.completed += 1;
                self.events += events.len();
            }
            CheckOutcome::Failed { .. } => self.failed += 1,
            CheckOutcome::Skipped(SkipReason::LockUnavailable) => self.skipped_locked += 1,
            CheckOutcome::Skipped(SkipReason::RecentlyChecked) => self.skipped_recent += 1,
        }
    }
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Identifier for this process in locks and check runs.
pub fn default_worker_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", host, &suffix[..8])
}

/// Re-checks tracked products on an interval.
pub struct Scheduler {
    pipeline: Pipeline,
    lock: Arc<dyn CheckLock>,
    sink: Arc<dyn ChangeSink>,
    config: SchedulerConfig,
    worker_id: String,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(
        db: DbContext,
        fetcher: Arc<dyn Fetch>,
        extractor: Extractor,
        config: SchedulerConfig,
    ) -> Self {
        let worker_id = default_worker_id();
        let retry = RetryPolicy::new(
            config.persistence_retries,
            Duration::from_millis(config.retry_base_ms),
        );
        let lock = SqliteCheckLock::new(db.locks(), worker_id.clone(), config.lock_ttl_secs);
        let sink = LogSink::with_trackers(db.trackers());
        Self {
            pipeline: Pipeline::new(db, fetcher, extractor).with_retry(retry),
            lock: Arc::new(lock),
            sink: Arc::new(sink),
            config,
            worker_id,
            running: AtomicBool::new(false),
        }
    }

    /// Replace the lock implementation.
    pub fn with_lock(mut self, lock: Arc<dyn CheckLock>) -> Self {
        self.lock = lock;
        self
    }

    /// Replace where change events are delivered.
    pub fn with_sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.min_check_interval_secs.min(i64::MAX as u64) as i64)
    }

    /// Run one cycle over the products that are due.
    ///
    /// A second call while a cycle is in progress on this instance returns
    /// immediately with `already_running` set.
    pub async fn run_cycle(&self) -> Result<CycleReport, DbError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Cycle already running on {}", self.worker_id);
            return Ok(CycleReport {
                already_running: true,
                ..Default::default()
            });
        }
        let _running = RunningGuard(&self.running);

        let start = Instant::now();
        let cutoff = Utc::now() - self.interval();
        let due = self
            .pipeline
            .db()
            .products()
            .due_for_check(cutoff, self.config.batch_size)
            .await?;

        let report = Mutex::new(CycleReport {
            selected: due.len(),
            ..Default::default()
        });
        stream::iter(due)
            .for_each_concurrent(self.config.workers.max(1), |product| {
                let report = &report;
                async move {
                    let outcome = self.check_due(&product, false).await;
                    report.lock().await.add(&outcome);
                }
            })
            .await;

        let mut report = report.into_inner();
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Cycle finished: {} selected, {} completed, {} failed, {} locked, {} recent, {} event(s) in {}ms",
            report.selected,
            report.completed,
            report.failed,
            report.skipped_locked,
            report.skipped_recent,
            report.events,
            report.duration_ms
        );
        Ok(report)
    }

    /// Check one product now, regardless of when it was last checked.
    pub async fn check_product(&self, product_id: &str) -> Result<CheckOutcome, CheckError> {
        let product = self
            .pipeline
            .db()
            .products()
            .get(product_id)
            .await?
            .ok_or_else(|| CheckError::ProductNotFound(product_id.to_string()))?;
        let due = DueProduct {
            id: product.id,
            canonical_url: product.canonical_url,
            last_success_at: None,
        };
        Ok(self.check_due(&due, true).await)
    }

    async fn check_due(&self, product: &DueProduct, force: bool) -> CheckOutcome {
        let guard = match self.lock.try_lock(&product.id).await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                debug!("Product {} is locked by another worker", product.id);
                return CheckOutcome::Skipped(SkipReason::LockUnavailable);
            }
            Err(e) => {
                warn!("Could not lock product {}: {}", product.id, e);
                return CheckOutcome::Skipped(SkipReason::LockUnavailable);
            }
        };

        let mut run = CheckRun::begin(&product.id, &self.worker_id);

        if !force {
            match self.pipeline.db().check_runs().last_success_at(&product.id).await {
                Ok(Some(last)) if last > Utc::now() - self.interval() => {
                    debug!("Product {} was checked at {}, skipping", product.id, last);
                    guard.release().await;
                    return CheckOutcome::Skipped(SkipReason::RecentlyChecked);
                }
                Ok(_) => {}
                Err(e) => {
                    let outcome = self.finish(run, Err(CheckError::Database(e))).await;
                    guard.release().await;
                    return outcome;
                }
            }
        }

        let result = self
            .pipeline
            .check(&product.canonical_url, &mut run)
            .await
            .map(|(_, events)| events);
        let outcome = self.finish(run, result).await;
        guard.release().await;

        if let CheckOutcome::Completed { events, .. } = &outcome {
            if !events.is_empty() {
                if let Err(e) = self.sink.deliver(events).await {
                    warn!("Failed to deliver {} event(s): {}", events.len(), e);
                }
            }
        }
        outcome
    }

    /// Close the run and record it while the lock is still held.
    async fn finish(
        &self,
        run: CheckRun,
        result: Result<Vec<ChangeEvent>, CheckError>,
    ) -> CheckOutcome {
        let outcome = match result {
            Ok(events) => CheckOutcome::Completed {
                run: run.succeed(),
                events,
            },
            Err(error) => {
                warn!("Check of product {} failed: {}", run.product_id, error);
                CheckOutcome::Failed {
                    run: run.fail(error.to_string()),
                    error,
                }
            }
        };

        if let Some(run) = outcome.run() {
            if let Err(e) = self.pipeline.db().check_runs().insert(run).await {
                error!("Failed to record check run {}: {}", run.id, e);
            }
        }
        outcome
    }

    /// Run cycles every `cycle_interval_secs` until `shutdown` completes.
    /// A cycle in progress is allowed to finish.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let period = Duration::from_secs(self.config.cycle_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!("Cycle failed: {}", e);
                    }
                }
            }
        }

        info!("Scheduler {} stopping", self.worker_id);
        self.pipeline.fetcher().shutdown().await;
    }

    /// Run cycles until Ctrl-C.
    pub async fn run_forever(&self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}
