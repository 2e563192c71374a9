//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod fetch;
mod init;
mod report;
mod track;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::load_settings;

#[derive(Parser)]
#[command(name = "pricewatch")]
#[command(about = "Price and availability change detection for product pages")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "PRICEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Start tracking a product URL
    Track {
        /// Product page URL
        url: String,
        /// User the tracker belongs to
        #[arg(short, long, default_value = "local")]
        user: String,
        /// Only notify about price drops of at least this many percent
        #[arg(long)]
        threshold: Option<f64>,
        /// Do not notify about restocks
        #[arg(long)]
        no_restock: bool,
    },

    /// Fetch and extract a URL without storing anything
    Fetch {
        /// Product page URL
        url: String,
        /// Print the extracted product as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check one product now
    Check {
        /// Product ID
        product_id: String,
    },

    /// Run the check scheduler
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Show recent check runs
    Runs {
        /// Maximum runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only failed runs
        #[arg(long)]
        failed: bool,
        /// Only runs that took at least this many milliseconds
        #[arg(long)]
        slow_ms: Option<i64>,
    },

    /// Show variants and price/stock history of a product
    History {
        /// Product ID
        product_id: String,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (settings, _config) = load_settings(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Track {
            url,
            user,
            threshold,
            no_restock,
        } => track::cmd_track(&settings, &url, &user, threshold, !no_restock).await,
        Commands::Fetch { url, json } => fetch::cmd_fetch(&settings, &url, json).await,
        Commands::Check { product_id } => check::cmd_check(&settings, &product_id).await,
        Commands::Run { once } => check::cmd_run(&settings, once).await,
        Commands::Runs {
            limit,
            failed,
            slow_ms,
        } => report::cmd_runs(&settings, limit, failed, slow_ms).await,
        Commands::History { product_id } => report::cmd_history(&settings, &product_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_track() {
        let cli = Cli::try_parse_from([
            "pricewatch",
            "track",
            "https://shop.test/p/lamp",
            "--threshold",
            "15",
            "--no-restock",
        ])
        .unwrap();
        match cli.command {
            Commands::Track {
                url,
                user,
                threshold,
                no_restock,
            } => {
                assert_eq!(url, "https://shop.test/p/lamp");
                assert_eq!(user, "local");
                assert_eq!(threshold, Some(15.0));
                assert!(no_restock);
            }
            _ => panic!("expected track"),
        }
    }
}
