//! Command-line interface for pricewatch.

mod commands;
pub mod helpers;

pub use commands::{is_verbose, run};
