//! Reporting commands over stored runs and history.

use chrono::{Duration, Utc};
use console::style;

use crate::cli::helpers::{format_duration_ms, open_db, truncate};
use crate::config::Settings;
use crate::models::CheckStatus;

/// Show recent check runs with a 24 hour failure summary.
pub async fn cmd_runs(
    settings: &Settings,
    limit: usize,
    failed: bool,
    slow_ms: Option<i64>,
) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let repo = ctx.check_runs();

    let runs = match (slow_ms, failed) {
        (Some(threshold), _) => repo.slow_runs(threshold, limit).await?,
        (None, true) => repo.recent_failures(limit).await?,
        (None, false) => repo.recent(limit).await?,
    };

    if runs.is_empty() {
        println!("No check runs recorded");
    } else {
        println!(
            "{:<20} {:<36} {:<8} {:>8} {:<16} Error",
            "Finished", "Product", "Status", "Time", "Mode"
        );
        for run in &runs {
            let status = match run.status {
                CheckStatus::Success => style(run.status.as_str()).green(),
                CheckStatus::Failed => style(run.status.as_str()).red(),
            };
            println!(
                "{:<20} {:<36} {:<8} {:>8} {:<16} {}",
                run.finished_at.format("%Y-%m-%d %H:%M:%S"),
                run.product_id,
                status,
                format_duration_ms(run.duration_ms),
                run.fetch_mode.as_deref().unwrap_or("-"),
                truncate(run.error_message.as_deref().unwrap_or(""), 60)
            );
        }
    }

    let stats = repo.failure_stats(Utc::now() - Duration::hours(24)).await?;
    println!();
    println!(
        "Last 24h: {} run(s), {} failed ({:.1}%)",
        stats.total,
        stats.failed,
        stats.failure_rate() * 100.0
    );
    Ok(())
}

/// Show a product's variants and their recorded history.
pub async fn cmd_history(settings: &Settings, product_id: &str) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;

    let product = ctx
        .products()
        .get(product_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product not found: {}", product_id))?;

    println!("{}", style(product.label()).bold());
    println!("{:<12} {}", "URL:", product.canonical_url);
    println!(
        "{:<12} {}",
        "Trackers:",
        ctx.trackers().count_active(&product.id).await?
    );
    if let Some(at) = ctx.check_runs().last_success_at(&product.id).await? {
        println!("{:<12} {}", "Checked:", at.format("%Y-%m-%d %H:%M:%S"));
    }

    let variants = ctx.variants().list_for_product(&product.id).await?;
    if variants.is_empty() {
        println!("\nNo variants recorded yet");
        return Ok(());
    }

    let history = ctx.history();
    for variant in &variants {
        let price = variant
            .current_price
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!();
        println!(
            "{} {}  {}  {}",
            style("•").cyan(),
            style(variant.label()).bold(),
            price,
            variant.current_stock_status
        );
        if let Some(sku) = &variant.sku {
            println!("    sku {}", sku);
        }

        for entry in history.prices(&variant.id).await? {
            println!(
                "    {}  price  {}",
                entry.recorded_at.format("%Y-%m-%d %H:%M"),
                entry.price
            );
        }
        for entry in history.stock(&variant.id).await? {
            println!(
                "    {}  stock  {}",
                entry.recorded_at.format("%Y-%m-%d %H:%M"),
                entry.status
            );
        }
    }
    Ok(())
}
