//! Shared helper functions for CLI commands.

use std::sync::Arc;

use crate::config::Settings;
use crate::extractor::Extractor;
use crate::fetcher::{Fetch, PageFetcher};
use crate::models::Attributes;
use crate::repository::DbContext;
use crate::scheduler::{Pipeline, RetryPolicy, Scheduler};

/// Open the database, creating the schema if needed.
pub async fn open_db(settings: &Settings) -> anyhow::Result<DbContext> {
    settings.ensure_directories()?;
    let ctx = settings.create_db_context();
    ctx.init_schema().await?;
    Ok(ctx)
}

/// Build the production fetcher from settings.
pub fn build_fetcher(settings: &Settings) -> anyhow::Result<Arc<dyn Fetch>> {
    Ok(Arc::new(PageFetcher::new(&settings.fetch)?))
}

/// Build a pipeline for one-off commands.
pub fn build_pipeline(settings: &Settings, ctx: DbContext) -> anyhow::Result<Pipeline> {
    let retry = RetryPolicy::new(
        settings.scheduler.persistence_retries,
        std::time::Duration::from_millis(settings.scheduler.retry_base_ms),
    );
    Ok(Pipeline::new(
        ctx,
        build_fetcher(settings)?,
        Extractor::new(settings.fetch.max_content_bytes),
    )
    .with_retry(retry))
}

/// Build a scheduler from settings.
pub fn build_scheduler(settings: &Settings, ctx: DbContext) -> anyhow::Result<Scheduler> {
    Ok(Scheduler::new(
        ctx,
        build_fetcher(settings)?,
        Extractor::new(settings.fetch.max_content_bytes),
        settings.scheduler.clone(),
    ))
}

/// Format a duration in milliseconds for display.
pub fn format_duration_ms(ms: i64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}

/// `color=Blue, size=M`, or `default` for a variant without attributes.
pub fn attributes_label(attributes: &Attributes) -> String {
    if attributes.is_empty() {
        return "default".to_string();
    }
    attributes
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Shorten text to `max` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(250), "250ms");
        assert_eq!(format_duration_ms(1_500), "1.5s");
        assert_eq!(format_duration_ms(125_000), "2m05s");
    }

    #[test]
    fn test_attributes_label() {
        let mut attrs = Attributes::new();
        assert_eq!(attributes_label(&attrs), "default");
        attrs.insert("size".to_string(), "M".to_string());
        attrs.insert("color".to_string(), "Blue".to_string());
        assert_eq!(attributes_label(&attrs), "color=Blue, size=M");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer message", 8), "a longe…");
    }
}
