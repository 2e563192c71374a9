//! Per-product check failures.

use thiserror::Error;

use crate::extractor::ExtractionError;
use crate::fetcher::FetchError;
use crate::repository::DbError;

/// Why one product check failed. The display form is what lands in the
/// check run's error message.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for CheckError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}
