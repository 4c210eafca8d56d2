//! Sequential batch planning
//!
//! The planner partitions the URL list and hands each batch to the
//! dispatcher, awaiting it before starting the next one. Peak concurrency is
//! therefore bounded by the batch length.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use super::accumulator::{AccumulatorSnapshot, ResultAccumulator};
use super::dispatcher::BatchDispatcher;
use super::partition;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::models::BatchReport;
use crate::utils::error::DispatchError;

/// Result of one planning call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    /// One report per dispatched batch, in dispatch order
    pub batches: Vec<BatchReport>,

    /// Full accumulator contents after the last batch, including records
    /// from earlier calls on the same accumulator
    pub snapshot: AccumulatorSnapshot,

    #[serde(with = "secs_f64")]
    pub elapsed: Duration,
}

impl PlanReport {
    /// Split into the `(attempted, outcomes)` pair
    pub fn into_parts(self) -> (Vec<String>, Vec<Option<String>>) {
        self.snapshot.into_parts()
    }

    /// Write the report as pretty JSON to `path`
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if serialization fails and `Error::Io` if the
    /// file cannot be written
    pub async fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        f64::deserialize(deserializer).map(Duration::from_secs_f64)
    }
}

/// Drives batches through a [`BatchDispatcher`] one after another
#[derive(Clone)]
pub struct BatchPlanner {
    dispatcher: BatchDispatcher,
    batch_length: NonZeroUsize,
}

impl BatchPlanner {
    /// Create a planner
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `batch_length` is zero
    pub fn new(dispatcher: BatchDispatcher, batch_length: usize) -> Result<Self> {
        let batch_length = NonZeroUsize::new(batch_length)
            .ok_or_else(|| Error::config("batch_length must be greater than 0"))?;

        Ok(Self {
            dispatcher,
            batch_length,
        })
    }

    /// Build the reqwest-backed fetcher, dispatcher and planner from configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration does not validate
    pub fn from_config(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::config(format!("{e:#}")))?;

        let fetcher = Fetcher::new(&config.fetcher)?;
        let dispatcher = BatchDispatcher::new(Arc::new(fetcher))
            .with_max_in_flight(config.batch.max_in_flight);

        Self::new(dispatcher, config.batch.batch_length)
    }

    /// Attach a shutdown signal that interrupts the batch being joined
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.dispatcher = self.dispatcher.with_shutdown(shutdown);
        self
    }

    pub fn batch_length(&self) -> usize {
        self.batch_length.get()
    }

    /// Fetch every URL, batch by batch, into `accumulator`
    ///
    /// An empty list dispatches nothing and leaves the accumulator unchanged.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Interrupted` if a batch join is interrupted;
    /// batches after it are not started. Records of completed units stay in
    /// the accumulator.
    pub async fn plan(
        &self,
        urls: &[String],
        accumulator: &Arc<ResultAccumulator>,
    ) -> std::result::Result<PlanReport, DispatchError> {
        let started = Instant::now();
        let batches = partition(urls, self.batch_length);

        tracing::info!(
            total = urls.len(),
            batch_length = self.batch_length.get(),
            batches = batches.len(),
            "Starting batch plan"
        );

        let mut reports = Vec::with_capacity(batches.len());
        for batch in &batches {
            tracing::info!(
                batch = batch.index + 1,
                of = batches.len(),
                size = batch.len(),
                "Fetching batch"
            );

            let report = match self.dispatcher.dispatch_batch(batch, accumulator).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(error = %e, "Plan stopped, remaining batches not started");
                    return Err(e);
                }
            };

            tracing::info!(
                batch = report.index + 1,
                successes = report.successes,
                failures = report.failures,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Batch complete"
            );
            reports.push(report);
        }

        let snapshot = accumulator.snapshot().await;
        let elapsed = started.elapsed();

        tracing::info!(
            attempted = snapshot.records.len(),
            successes = snapshot.successes,
            failures = snapshot.failures,
            elapsed_secs = elapsed.as_secs_f64(),
            "Batch plan finished"
        );

        Ok(PlanReport {
            batches: reports,
            snapshot,
            elapsed,
        })
    }
}
