//! Check and run commands.

use console::style;

use crate::cli::helpers::{build_scheduler, format_duration_ms, open_db};
use crate::config::Settings;
use crate::scheduler::{CheckOutcome, SkipReason};

/// Check one product immediately, regardless of when it was last checked.
pub async fn cmd_check(settings: &Settings, product_id: &str) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let scheduler = build_scheduler(settings, ctx)?;

    let outcome = scheduler.check_product(product_id).await;
    scheduler.pipeline().fetcher().shutdown().await;

    match outcome? {
        CheckOutcome::Completed { run, events } => {
            println!(
                "{} Checked {} in {} via {}",
                style("✓").green(),
                product_id,
                format_duration_ms(run.duration_ms),
                run.fetch_mode.as_deref().unwrap_or("?")
            );
            if events.is_empty() {
                println!("  No changes");
            }
            for event in &events {
                println!("  {} {}", style("•").cyan(), event);
            }
        }
        CheckOutcome::Failed { run, error } => {
            println!(
                "{} Check of {} failed after {}: {}",
                style("✗").red(),
                product_id,
                format_duration_ms(run.duration_ms),
                error
            );
        }
        CheckOutcome::Skipped(SkipReason::LockUnavailable) => {
            println!(
                "{} {} is being checked by another worker",
                style("!").yellow(),
                product_id
            );
        }
        CheckOutcome::Skipped(SkipReason::RecentlyChecked) => {
            println!("{} {} was checked recently", style("!").yellow(), product_id);
        }
    }
    Ok(())
}

/// Run the scheduler, either for one cycle or until interrupted.
pub async fn cmd_run(settings: &Settings, once: bool) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let scheduler = build_scheduler(settings, ctx)?;

    if !once {
        println!(
            "{} Worker {} checking every {}s (Ctrl-C to stop)",
            style("→").cyan(),
            scheduler.worker_id(),
            settings.scheduler.cycle_interval_secs
        );
        scheduler.run_forever().await;
        return Ok(());
    }

    let report = scheduler.run_cycle().await;
    scheduler.pipeline().fetcher().shutdown().await;
    let report = report?;

    if report.already_running {
        println!("{} A cycle is already in progress", style("!").yellow());
        return Ok(());
    }

    println!(
        "{} Cycle finished in {}",
        style("✓").green(),
        format_duration_ms(report.duration_ms as i64)
    );
    println!("  {:<18} {}", "Selected:", report.selected);
    println!("  {:<18} {}", "Completed:", report.completed);
    println!("  {:<18} {}", "Failed:", report.failed);
    println!("  {:<18} {}", "Skipped (locked):", report.skipped_locked);
    println!("  {:<18} {}", "Skipped (recent):", report.skipped_recent);
    println!("  {:<18} {}", "Changes:", report.events);
    Ok(())
}
