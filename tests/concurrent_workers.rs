//! Several schedulers sharing one database never check a product twice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use pricewatch::fetcher::{ContentKind, FetchMetadata, FetchMode, FetchResult};
use pricewatch::models::Tracker;
use pricewatch::{DbContext, Extractor, Fetch, Scheduler, SchedulerConfig};

const PAGE: &str = r#"<html><head><script type="application/ld+json">
    {"@type":"Product","name":"Lamp","offers":{"price":"45.00","priceCurrency":"EUR",
     "availability":"https://schema.org/InStock"}}</script></head></html>"#;

/// Slow fetcher that records how many fetches of each URL overlap.
#[derive(Default)]
struct SlowFetch {
    state: Mutex<HashMap<String, (usize, usize)>>,
}

impl SlowFetch {
    fn max_overlap(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.values().map(|(_, max)| *max).max().unwrap_or(0)
    }
}

#[async_trait]
impl Fetch for SlowFetch {
    async fn fetch(&self, url: &str) -> FetchResult {
        {
            let mut state = self.state.lock().unwrap();
            let entry = state.entry(url.to_string()).or_default();
            entry.0 += 1;
            entry.1 = entry.1.max(entry.0);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let mut state = self.state.lock().unwrap();
            if let Some(entry) = state.get_mut(url) {
                entry.0 -= 1;
            }
        }
        FetchResult {
            success: true,
            mode_used: Some(FetchMode::Http),
            status_code: Some(200),
            content: PAGE.to_string(),
            content_kind: ContentKind::Html,
            final_url: url.to_string(),
            metadata: FetchMetadata::default(),
            error: None,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_check_each_product_at_most_once() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("pricewatch.db");
    let ctx = DbContext::new(&db_path);
    ctx.init_schema().await.unwrap();

    let mut product_ids = Vec::new();
    for i in 0..6 {
        let product = ctx
            .products()
            .register(&format!("https://shop.test/lamp-{}", i))
            .await
            .unwrap();
        ctx.trackers()
            .insert(&Tracker::new(&product.id, "u1"))
            .await
            .unwrap();
        product_ids.push(product.id);
    }

    let fetch = Arc::new(SlowFetch::default());
    let config = SchedulerConfig {
        workers: 3,
        ..SchedulerConfig::default()
    };
    // Separate contexts, as separate processes would have.
    let schedulers: Vec<Scheduler> = (0..4)
        .map(|_| {
            Scheduler::new(
                DbContext::new(&db_path),
                fetch.clone(),
                Extractor::default(),
                config.clone(),
            )
        })
        .collect();

    let reports = join_all(schedulers.iter().map(|s| s.run_cycle())).await;
    let reports: Vec<_> = reports.into_iter().map(Result::unwrap).collect();

    assert_eq!(fetch.max_overlap(), 1);

    let mut total_successes = 0;
    for id in &product_ids {
        let runs = ctx.check_runs().for_product(id, 10).await.unwrap();
        let successes = runs.iter().filter(|r| r.is_success()).count();
        assert!(successes <= 1, "product {} checked {} times", id, successes);
        for (i, a) in runs.iter().enumerate() {
            for b in &runs[i + 1..] {
                let overlap = a.started_at < b.finished_at && b.started_at < a.finished_at;
                assert!(!overlap, "runs {} and {} overlap", a.id, b.id);
            }
        }
        total_successes += successes;
        assert!(ctx.locks().current(id).await.unwrap().is_none());
    }

    let completed: usize = reports.iter().map(|r| r.completed).sum();
    assert_eq!(completed, total_successes);
    assert_eq!(total_successes, product_ids.len());

    // Everything checked is now inside the interval for every worker.
    for scheduler in &schedulers {
        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.completed, 0);
    }
}
