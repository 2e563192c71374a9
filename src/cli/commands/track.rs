//! Track command.

use console::style;

use crate::cli::helpers::{attributes_label, build_pipeline, open_db};
use crate::config::Settings;
use crate::fetcher::FetchError;
use crate::models::Tracker;
use crate::scheduler::{normalize_product_url, CheckError};

/// Start tracking a product URL.
///
/// The page is fetched right away to record first observations. When that
/// fails the product is still registered and the scheduler picks it up.
pub async fn cmd_track(
    settings: &Settings,
    url: &str,
    user: &str,
    threshold: Option<f64>,
    notify_restock: bool,
) -> anyhow::Result<()> {
    if let Some(pct) = threshold {
        if !(pct > 0.0 && pct <= 100.0) {
            anyhow::bail!("threshold must be between 0 and 100 percent, got {}", pct);
        }
    }

    let ctx = open_db(settings).await?;
    let pipeline = build_pipeline(settings, ctx.clone())?;

    let ingested = pipeline.ingest_url(url).await;
    pipeline.fetcher().shutdown().await;

    let product = match ingested {
        Ok(outcome) => {
            println!(
                "{} {} ({} variant(s))",
                style("✓").green(),
                outcome.product.label(),
                outcome.shell.variants.len()
            );
            for variant in &outcome.shell.variants {
                let price = variant
                    .price
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "    {:<40} {:>14}  {}",
                    attributes_label(&variant.attributes),
                    price,
                    variant.stock
                );
            }
            outcome.product
        }
        Err(CheckError::Fetch(FetchError::InvalidUrl(reason))) => {
            anyhow::bail!("invalid URL {}: {}", url, reason);
        }
        Err(e) => {
            println!(
                "{} Could not check {} now: {}",
                style("!").yellow(),
                url,
                e
            );
            let product_url = normalize_product_url(url)?;
            ctx.products().register(&product_url).await?
        }
    };

    let mut tracker = Tracker::new(&product.id, user);
    tracker.price_threshold_pct = threshold;
    tracker.notify_restock = notify_restock;
    ctx.trackers().insert(&tracker).await?;

    println!(
        "{} Tracking product {} for {}",
        style("✓").green(),
        style(&product.id).cyan(),
        user
    );
    Ok(())
}
