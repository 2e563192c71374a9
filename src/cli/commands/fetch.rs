//! Fetch command: run the fetcher and extractor on one URL.

use console::style;

use crate::cli::helpers::{attributes_label, build_fetcher, truncate};
use crate::config::Settings;
use crate::extractor::Extractor;

/// Fetch and extract a URL without touching the database.
pub async fn cmd_fetch(settings: &Settings, url: &str, json: bool) -> anyhow::Result<()> {
    let fetcher = build_fetcher(settings)?;
    let result = fetcher.fetch(url).await;
    fetcher.shutdown().await;

    for attempt in &result.metadata.attempts {
        eprintln!(
            "  {} {:<16} {:>6}ms  {}",
            style("→").dim(),
            attempt.mode.as_str(),
            attempt.elapsed_ms,
            truncate(&attempt.outcome, 80)
        );
    }

    if !result.success {
        let reason = result
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        anyhow::bail!("fetch of {} failed: {}", url, reason);
    }

    let extractor = Extractor::new(settings.fetch.max_content_bytes);
    let shell = tokio::task::spawn_blocking(move || extractor.extract(&result)).await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&shell)?);
        return Ok(());
    }

    println!("{}", style(shell.name.as_deref().unwrap_or("(unnamed)")).bold());
    println!("{:<12} {}", "URL:", shell.canonical_url);
    if let Some(image) = &shell.image_url {
        println!("{:<12} {}", "Image:", image);
    }
    println!("{:<12} {}", "Variants:", shell.variants.len());
    for variant in &shell.variants {
        let attrs = attributes_label(&variant.attributes);
        let price = variant
            .price
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<40} {:>14}  {:<12} {}",
            truncate(&attrs, 40),
            price,
            variant.stock,
            variant.sku.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
