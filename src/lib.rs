//! batchfetch - Batched concurrent URL fetcher
//!
//! Fetches a list of URLs in fixed-size batches. All URLs of a batch are
//! requested concurrently; batches run strictly one after another. Every
//! attempted URL ends up in a shared result accumulator with either its body
//! or a failure marker, and one bad URL never aborts its batch.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`batch`] - Partitioning, concurrent dispatch and result accumulation
//! - [`fetcher`] - Single-URL fetch over a pluggable HTTP transport
//! - [`config`] - Configuration management and settings
//! - [`models`] - Outcomes, records and reports
//! - [`error`] - Unified error type
//! - [`metrics`] - Prometheus counters
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let urls = vec![
//!         "https://example.com/".to_string(),
//!         "https://example.org/".to_string(),
//!     ];
//!     let snapshot = batchfetch::fetch_all(&urls, 2).await?;
//!     println!("{} ok, {} failed", snapshot.successes, snapshot.failures);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod models;
pub mod utils;

use batch::{AccumulatorSnapshot, BatchPlanner, ResultAccumulator};
use config::Config;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::batch::{
        AccumulatorSnapshot, BatchDispatcher, BatchPlanner, PlanReport, ResultAccumulator,
    };
    pub use crate::config::Config;
    pub use crate::error::{BatchFetchErrorTrait, Error, ErrorCategory, Result};
    pub use crate::fetcher::transport::{HttpTransport, ReqwestTransport};
    pub use crate::fetcher::Fetcher;
    pub use crate::models::{BatchReport, FailureReason, FetchOutcome, FetchRecord};
}

// Direct re-exports for convenience
pub use models::{BatchReport, FailureReason, FetchOutcome, FetchRecord};

/// Fetch `urls` in batches of `batch_length` with default settings
///
/// Uses a fresh accumulator for this call. Records are in completion order;
/// see [`AccumulatorSnapshot::into_parts`] for the `(attempted, outcomes)` pair.
///
/// # Errors
///
/// Returns `Error::Config` if `batch_length` is zero
pub async fn fetch_all(urls: &[String], batch_length: usize) -> error::Result<AccumulatorSnapshot> {
    let mut config = Config::default();
    config.batch.batch_length = batch_length;

    let planner = BatchPlanner::from_config(&config)?;
    let accumulator = ResultAccumulator::new();
    let report = planner.plan(urls, &accumulator).await?;

    Ok(report.snapshot)
}
