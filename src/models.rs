// Core data structures for the batch fetcher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why a single fetch failed
///
/// Only the fact of failure is counted; the reason is kept for logging,
/// metrics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum FailureReason {
    /// Connect or read timeout elapsed
    Timeout,
    /// Connection could not be established
    Connect,
    /// Response status other than 200
    Status(u16),
    /// Response body could not be read
    Io,
    /// URL could not be parsed
    InvalidUrl,
    /// Any other transport failure
    Transport,
    /// The fetch unit panicked before recording an outcome
    Aborted,
}

impl FailureReason {
    /// Short label used for metrics and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Status(_) => "status",
            Self::Io => "io",
            Self::InvalidUrl => "invalid_url",
            Self::Transport => "transport",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "status {code}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Terminal result of one URL's single attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FetchOutcome {
    Success { body: String },
    Failure { reason: FailureReason },
}

impl FetchOutcome {
    pub fn success(body: impl Into<String>) -> Self {
        Self::Success { body: body.into() }
    }

    pub fn failure(reason: FailureReason) -> Self {
        Self::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Body text, or `None` for a failed fetch
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Success { body } => Some(body),
            Self::Failure { .. } => None,
        }
    }

    pub fn into_body(self) -> Option<String> {
        match self {
            Self::Success { body } => Some(body),
            Self::Failure { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason } => Some(*reason),
        }
    }
}

/// One attempted URL and its outcome, appended to the accumulator as a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRecord {
    pub url: String,
    pub batch: usize, // Batch index within the plan
    pub position: usize, // Index of the URL in the input list
    pub outcome: FetchOutcome,
    pub completed_at: DateTime<Utc>,
}

impl FetchRecord {
    /// Create with current timestamp
    pub fn new(url: impl Into<String>, batch: usize, position: usize, outcome: FetchOutcome) -> Self {
        Self {
            url: url.into(),
            batch,
            position,
            outcome,
            completed_at: Utc::now(),
        }
    }
}

/// Summary of one dispatched batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub index: usize,
    pub size: usize,
    pub successes: usize,
    pub failures: usize,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl BatchReport {
    /// Success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.size == 0 {
            return 1.0;
        }
        self.successes as f64 / self.size as f64
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_body() {
        let ok = FetchOutcome::success("hello");
        assert!(ok.is_success());
        assert_eq!(ok.body(), Some("hello"));
        assert_eq!(ok.failure_reason(), None);

        let failed = FetchOutcome::failure(FailureReason::Status(500));
        assert!(!failed.is_success());
        assert_eq!(failed.body(), None);
        assert_eq!(failed.failure_reason(), Some(FailureReason::Status(500)));
        assert_eq!(failed.into_body(), None);
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(FailureReason::Status(404).to_string(), "status 404");
        assert_eq!(FailureReason::Timeout.to_string(), "timeout");
        assert_eq!(FailureReason::InvalidUrl.as_str(), "invalid_url");
    }

    #[test]
    fn test_outcome_serialization() {
        let failed = FetchOutcome::failure(FailureReason::Status(503));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["result"], "failure");
        assert_eq!(json["reason"]["kind"], "status");
        assert_eq!(json["reason"]["code"], 503);

        let ok = FetchOutcome::success("body");
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["result"], "success");
        assert_eq!(json["body"], "body");
    }

    #[test]
    fn test_batch_report_success_rate() {
        let report = BatchReport {
            index: 0,
            size: 4,
            successes: 3,
            failures: 1,
            elapsed: Duration::from_millis(120),
        };
        assert!((report.success_rate() - 0.75).abs() < f64::EPSILON);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["elapsed"], 120);
    }
}
