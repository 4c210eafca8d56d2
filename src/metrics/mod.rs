//! Prometheus metrics for batch fetching
//!
//! This module tracks:
//! - Fetch outcomes (success/failure) and failure reasons
//! - Batch durations and interrupted batches
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails or never happens, metrics operations are no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};
use std::sync::OnceLock;

use crate::models::FetchOutcome;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all fetch metrics
struct FetchMetrics {
    fetches: CounterVec,
    failure_reasons: CounterVec,
    body_bytes: Counter,
    batches: Counter,
    interrupted_batches: Counter,
    batch_duration: Histogram,
}

static FETCH_METRICS: OnceLock<FetchMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = FetchMetrics {
        fetches: register_counter_vec!(
            "batchfetch_fetches_total",
            "Total fetch attempts by outcome",
            &["outcome"]
        )?,
        failure_reasons: register_counter_vec!(
            "batchfetch_fetch_failures_total",
            "Failed fetches by reason",
            &["reason"]
        )?,
        body_bytes: register_counter!(
            "batchfetch_body_bytes_total",
            "Total bytes of successfully fetched bodies"
        )?,
        batches: register_counter!("batchfetch_batches_total", "Total batches dispatched")?,
        interrupted_batches: register_counter!(
            "batchfetch_batches_interrupted_total",
            "Batches whose join was interrupted by shutdown"
        )?,
        batch_duration: register_histogram!(
            "batchfetch_batch_duration_seconds",
            "Time from batch dispatch until its join completes",
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 60.0]
        )?,
    };

    FETCH_METRICS
        .set(metrics)
        .map_err(|_| "Fetch metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    FETCH_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record one fetch outcome
pub fn record_fetch(outcome: &FetchOutcome) {
    let Some(m) = FETCH_METRICS.get() else {
        return;
    };

    match outcome {
        FetchOutcome::Success { body } => {
            m.fetches.with_label_values(&["success"]).inc();
            m.body_bytes.inc_by(body.len() as f64);
        }
        FetchOutcome::Failure { reason } => {
            m.fetches.with_label_values(&["failure"]).inc();
            m.failure_reasons
                .with_label_values(&[reason.as_str()])
                .inc();
        }
    }
}

/// Record an interrupted batch join
pub fn record_batch_interrupted() {
    if let Some(m) = FETCH_METRICS.get() {
        m.interrupted_batches.inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Count a dispatched batch and time it until the returned guard drops
pub fn start_batch_timer() -> MetricsTimer {
    match FETCH_METRICS.get() {
        Some(m) => {
            m.batches.inc();
            MetricsTimer::new(m.batch_duration.start_timer())
        }
        None => MetricsTimer::noop(),
    }
}
