//! Batching, concurrent dispatch and result accumulation
//!
//! - [`partition`] splits the URL list into fixed-capacity batches
//! - [`BatchDispatcher`] fetches one batch concurrently and joins it
//! - [`BatchPlanner`] runs batches strictly one after another
//! - [`ResultAccumulator`] collects every outcome

pub mod accumulator;
pub mod dispatcher;
pub mod planner;

use std::num::NonZeroUsize;

pub use accumulator::{AccumulatorSnapshot, ResultAccumulator};
pub use dispatcher::BatchDispatcher;
pub use planner::{BatchPlanner, PlanReport};

/// Ordered slice of the input URL list dispatched as one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Batch index within the plan
    pub index: usize,

    /// Position of the first URL in the input list
    pub start: usize,

    pub urls: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Split `urls` into consecutive batches of at most `batch_length` URLs
///
/// Every batch but the last is full; concatenating the batches reproduces
/// `urls`. An empty list yields no batches.
pub fn partition(urls: &[String], batch_length: NonZeroUsize) -> Vec<Batch> {
    let size = batch_length.get();
    urls.chunks(size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            start: index * size,
            urls: chunk.to_vec(),
        })
        .collect()
}
