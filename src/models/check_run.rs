//! Outcome records of scheduled checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final status of a check attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Success,
    Failed,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One attempt at checking a product. Written once, when the attempt ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRun {
    pub id: String,
    pub product_id: String,
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: CheckStatus,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    /// Fetch strategy that produced the content, if any.
    pub fetch_mode: Option<String>,
    /// SHA-256 of the fetched content.
    pub content_hash: Option<String>,
}

impl CheckRun {
    /// Start building a run record for a product.
    pub fn begin(product_id: &str, worker_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            worker_id: worker_id.to_string(),
            started_at: now,
            finished_at: now,
            status: CheckStatus::Failed,
            error_message: None,
            duration_ms: 0,
            fetch_mode: None,
            content_hash: None,
        }
    }

    /// Close the record as successful.
    pub fn succeed(mut self) -> Self {
        self.finish(CheckStatus::Success, None);
        self
    }

    /// Close the record as failed with a message.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.finish(CheckStatus::Failed, Some(message.into()));
        self
    }

    fn finish(&mut self, status: CheckStatus, error_message: Option<String>) {
        self.finished_at = Utc::now();
        self.duration_ms = (self.finished_at - self.started_at).num_milliseconds().max(0);
        self.status = status;
        self.error_message = error_message;
    }

    pub fn is_success(&self) -> bool {
        self.status == CheckStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_run_lifecycle() {
        let run = CheckRun::begin("p1", "w1").fail("timed out");
        assert_eq!(run.status, CheckStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("timed out"));
        assert!(run.finished_at >= run.started_at);

        let run = CheckRun::begin("p1", "w1").succeed();
        assert!(run.is_success());
        assert!(run.error_message.is_none());
        assert!(run.duration_ms >= 0);
    }
}
