//! Shared result store for fetch outcomes
//!
//! Every fetch unit of a batch writes here concurrently. A record and its
//! counter increment are applied under one write guard, so at any observation
//! point `records.len() == successes + failures`.
//!
//! The accumulator also keeps a consecutive-failure streak per URL. A success
//! clears the streak; reaching the warn threshold logs a warning once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::FetchRecord;

/// Consecutive failures of one URL before a warning is logged
pub const DEFAULT_FAILURE_WARN_THRESHOLD: u32 = 3;

#[derive(Debug, Default)]
struct AccumulatorState {
    records: Vec<FetchRecord>,
    successes: u64,
    failures: u64,
    failure_streaks: BTreeMap<String, u32>,
}

/// Append-only store of attempted URLs and their outcomes
///
/// Records appear in completion order. Within a batch that order is not the
/// input order; use [`FetchRecord::position`] to restore it.
#[derive(Debug)]
pub struct ResultAccumulator {
    state: RwLock<AccumulatorState>,
    failure_warn_threshold: u32,
}

impl Default for ResultAccumulator {
    fn default() -> Self {
        Self {
            state: RwLock::default(),
            failure_warn_threshold: DEFAULT_FAILURE_WARN_THRESHOLD,
        }
    }
}

impl ResultAccumulator {
    /// Create an empty accumulator ready to be shared between tasks
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create an empty accumulator warning after `threshold` consecutive
    /// failures of one URL; 0 disables the warning
    pub fn with_failure_warn_threshold(threshold: u32) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::default(),
            failure_warn_threshold: threshold,
        })
    }

    /// Append one record, bump the matching counter and update the URL's
    /// failure streak
    pub async fn record(&self, record: FetchRecord) {
        let mut state = self.state.write().await;
        if record.outcome.is_success() {
            state.successes += 1;
            state.failure_streaks.remove(&record.url);
        } else {
            state.failures += 1;
            let streak = state.failure_streaks.entry(record.url.clone()).or_insert(0);
            *streak += 1;
            if self.failure_warn_threshold > 0 && *streak == self.failure_warn_threshold {
                tracing::warn!(
                    url = %record.url,
                    consecutive_failures = *streak,
                    reason = ?record.outcome.failure_reason(),
                    "URL keeps failing"
                );
            }
        }
        state.records.push(record);
    }

    /// Consecutive failures of `url` since its last success
    pub async fn failure_streak(&self, url: &str) -> u32 {
        self.state
            .read()
            .await
            .failure_streaks
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Number of attempted URLs recorded so far
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    /// `(successes, failures)` read together
    pub async fn counts(&self) -> (u64, u64) {
        let state = self.state.read().await;
        (state.successes, state.failures)
    }

    /// Get snapshot of the current contents
    pub async fn snapshot(&self) -> AccumulatorSnapshot {
        let state = self.state.read().await;
        AccumulatorSnapshot {
            records: state.records.clone(),
            successes: state.successes,
            failures: state.failures,
            failure_streaks: state.failure_streaks.clone(),
        }
    }
}

/// Point-in-time copy of a [`ResultAccumulator`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorSnapshot {
    pub records: Vec<FetchRecord>,
    pub successes: u64,
    pub failures: u64,

    /// Consecutive failures per URL; URLs whose last attempt succeeded are absent
    #[serde(default)]
    pub failure_streaks: BTreeMap<String, u32>,
}

impl AccumulatorSnapshot {
    /// Attempted URLs in record order
    pub fn attempted(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.url.as_str()).collect()
    }

    /// Outcomes aligned with [`attempted`](Self::attempted); `None` marks a failure
    pub fn outcomes(&self) -> Vec<Option<&str>> {
        self.records.iter().map(|r| r.outcome.body()).collect()
    }

    /// Split into the `(attempted, outcomes)` pair
    pub fn into_parts(self) -> (Vec<String>, Vec<Option<String>>) {
        self.records
            .into_iter()
            .map(|r| (r.url, r.outcome.into_body()))
            .unzip()
    }

    /// Records sorted by their position in the input list
    pub fn in_input_order(&self) -> Vec<&FetchRecord> {
        let mut ordered: Vec<&FetchRecord> = self.records.iter().collect();
        ordered.sort_by_key(|r| (r.batch, r.position));
        ordered
    }

    /// Total bytes of successful bodies
    pub fn body_bytes(&self) -> u64 {
        self.records
            .iter()
            .filter_map(|r| r.outcome.body())
            .map(|b| b.len() as u64)
            .sum()
    }

    /// URLs that failed at least `min_streak` times in a row, longest first
    pub fn failing_urls(&self, min_streak: u32) -> Vec<(&str, u32)> {
        let mut failing: Vec<(&str, u32)> = self
            .failure_streaks
            .iter()
            .filter(|(_, streak)| **streak >= min_streak.max(1))
            .map(|(url, streak)| (url.as_str(), *streak))
            .collect();
        failing.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        failing
    }

    /// Success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            return 1.0;
        }
        self.successes as f64 / total as f64
    }
}
