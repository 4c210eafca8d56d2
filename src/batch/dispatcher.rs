//! Concurrent dispatch of one batch
//!
//! ```text
//!                ┌──────────┐
//!          ┌────▶│  unit 0  │──┐
//!          │     └──────────┘  │
//! ┌───────┐│     ┌──────────┐  │  record   ┌─────────────┐
//! │ batch │┼────▶│  unit 1  │──┼──────────▶│ accumulator │
//! └───────┘│     └──────────┘  │           └─────────────┘
//!          │     ┌──────────┐  │
//!          └────▶│  unit n  │──┘
//!                └──────────┘
//!                      │
//!                 join (all)
//! ```
//!
//! Each unit is a task in a [`JoinSet`] that fetches its URL once and records
//! the outcome. Units are joined in completion order. The dispatcher returns
//! only after every unit has finished, or with [`DispatchError::Interrupted`]
//! when shutdown is requested mid-join. In both cases no unit of the batch
//! writes to the accumulator after `dispatch_batch` returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};

use super::accumulator::ResultAccumulator;
use super::Batch;
use crate::fetcher::Fetcher;
use crate::metrics;
use crate::models::{BatchReport, FailureReason, FetchOutcome, FetchRecord};
use crate::utils::error::DispatchError;

/// URL and input position owned by a spawned unit
struct UnitOwner {
    url: String,
    position: usize,
}

/// Terminal outcomes joined so far in one batch
#[derive(Debug, Default)]
struct JoinTally {
    successes: usize,
    failures: usize,
}

impl JoinTally {
    fn completed(&self) -> usize {
        self.successes + self.failures
    }
}

/// Fans a batch out into concurrent fetches and joins them
#[derive(Clone)]
pub struct BatchDispatcher {
    fetcher: Arc<Fetcher>,

    /// Optional cap on concurrent fetches within one batch
    max_in_flight: Option<usize>,

    /// Flips to `true` when the caller wants the current join abandoned
    shutdown: Option<watch::Receiver<bool>>,
}

impl BatchDispatcher {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            max_in_flight: None,
            shutdown: None,
        }
    }

    /// Bound concurrent fetches inside a batch; `None` means the batch size
    pub fn with_max_in_flight(mut self, max_in_flight: Option<usize>) -> Self {
        self.max_in_flight = max_in_flight.filter(|n| *n > 0);
        self
    }

    /// Attach a shutdown signal
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Dispatch every URL of `batch` concurrently and wait for all of them
    ///
    /// Per-URL failures are recorded as failed outcomes and never returned.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Interrupted` if shutdown is requested before
    /// the join completes. Units still running at that point are aborted and
    /// leave no record; `completed` counts the units that did record.
    pub async fn dispatch_batch(
        &self,
        batch: &Batch,
        accumulator: &Arc<ResultAccumulator>,
    ) -> Result<BatchReport, DispatchError> {
        let total = batch.len();

        if self.shutdown_requested() {
            return Err(self.interrupted(batch.index, 0, total));
        }

        let started = Instant::now();
        let _timer = metrics::start_batch_timer();
        let semaphore = self.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));

        tracing::debug!(
            batch = batch.index,
            size = total,
            max_in_flight = ?self.max_in_flight,
            "Dispatching batch"
        );

        let mut units = JoinSet::new();
        let mut owners = HashMap::with_capacity(total);
        for (offset, url) in batch.urls.iter().enumerate() {
            let position = batch.start + offset;
            let handle = units.spawn(run_unit(
                Arc::clone(&self.fetcher),
                url.clone(),
                batch.index,
                position,
                semaphore.clone(),
                Arc::clone(accumulator),
            ));
            owners.insert(
                handle.id(),
                UnitOwner {
                    url: url.clone(),
                    position,
                },
            );
        }

        let mut tally = JoinTally::default();
        let mut shutdown = self.shutdown.clone();

        loop {
            let next = tokio::select! {
                joined = units.join_next() => Some(joined),
                () = wait_for_shutdown(shutdown.as_mut()) => None,
            };

            match next {
                Some(Some(joined)) => {
                    settle(joined, batch.index, &owners, accumulator, &mut tally).await;
                }
                Some(None) => break,
                None => {
                    units.abort_all();
                    // Units that finished before the abort landed still count
                    while let Some(joined) = units.join_next().await {
                        settle(joined, batch.index, &owners, accumulator, &mut tally).await;
                    }
                    return Err(self.interrupted(batch.index, tally.completed(), total));
                }
            }
        }

        let report = BatchReport {
            index: batch.index,
            size: total,
            successes: tally.successes,
            failures: tally.failures,
            elapsed: started.elapsed(),
        };

        tracing::debug!(
            batch = report.index,
            successes = report.successes,
            failures = report.failures,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Batch joined"
        );

        Ok(report)
    }

    fn interrupted(&self, batch: usize, completed: usize, total: usize) -> DispatchError {
        metrics::record_batch_interrupted();
        tracing::error!(batch, completed, total, "Batch join interrupted by shutdown");
        DispatchError::Interrupted {
            batch,
            completed,
            total,
        }
    }
}

/// One fetch unit; yields whether the fetch succeeded
async fn run_unit(
    fetcher: Arc<Fetcher>,
    url: String,
    batch: usize,
    position: usize,
    semaphore: Option<Arc<Semaphore>>,
    accumulator: Arc<ResultAccumulator>,
) -> bool {
    let _permit = acquire_permit(semaphore, &url).await;

    let outcome = fetcher.fetch_one(&url).await;
    let success = outcome.is_success();

    metrics::record_fetch(&outcome);
    accumulator
        .record(FetchRecord::new(url, batch, position, outcome))
        .await;

    success
}

/// Wait for a concurrency slot when a limit is configured
///
/// The dispatcher never closes its semaphore. A closed one is logged and the
/// fetch goes ahead without a permit.
async fn acquire_permit(
    semaphore: Option<Arc<Semaphore>>,
    url: &str,
) -> Option<OwnedSemaphorePermit> {
    let semaphore = semaphore?;
    match semaphore.acquire_owned().await {
        Ok(permit) => Some(permit),
        Err(e) => {
            tracing::warn!(url, error = %e, "Concurrency limit closed, fetching without a permit");
            None
        }
    }
}

/// Fold one joined unit into the tally
///
/// A panicked unit never reached its own record, so it is recorded here as
/// `Aborted`. Cancelled units leave no record and are not counted.
async fn settle(
    joined: Result<bool, JoinError>,
    batch: usize,
    owners: &HashMap<Id, UnitOwner>,
    accumulator: &ResultAccumulator,
    tally: &mut JoinTally,
) {
    let error = match joined {
        Ok(true) => {
            tally.successes += 1;
            return;
        }
        Ok(false) => {
            tally.failures += 1;
            return;
        }
        Err(e) if e.is_cancelled() => return,
        Err(e) => e,
    };

    let Some(owner) = owners.get(&error.id()) else {
        tracing::error!(batch, error = %error, "Panicked unit has no owner");
        return;
    };

    tracing::warn!(
        url = %owner.url,
        batch,
        error = %error,
        "Fetch unit panicked"
    );
    let outcome = FetchOutcome::failure(FailureReason::Aborted);
    metrics::record_fetch(&outcome);
    accumulator
        .record(FetchRecord::new(owner.url.clone(), batch, owner.position, outcome))
        .await;
    tally.failures += 1;
}

/// Resolve once shutdown is requested; never resolves without a signal
async fn wait_for_shutdown(shutdown: Option<&mut watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => {
            if rx.wait_for(|stop| *stop).await.is_err() {
                // Sender gone: nobody can request shutdown any more
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetcherConfig;
    use crate::fetcher::transport::{FetchRequest, HttpTransport, TransportResponse};
    use crate::utils::error::FetchError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks peak concurrency; `/fail` paths return 500, `/slow` takes 30s
    struct CountingTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl CountingTransport {
        fn new(delay: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl HttpTransport for CountingTransport {
        async fn get(&self, request: FetchRequest) -> Result<TransportResponse, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = if request.url.path() == "/slow" {
                Duration::from_secs(30)
            } else {
                self.delay
            };
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if request.url.path() == "/panic" {
                panic!("transport blew up");
            }
            let status = if request.url.path() == "/fail" { 500 } else { 200 };
            Ok(TransportResponse::from_bytes(status, None, request.url.to_string()))
        }
    }

    fn dispatcher_with(transport: Arc<CountingTransport>) -> BatchDispatcher {
        let fetcher = Fetcher::with_transport(&FetcherConfig::default(), transport).unwrap();
        BatchDispatcher::new(Arc::new(fetcher))
    }

    fn batch_of(urls: &[&str]) -> Batch {
        Batch {
            index: 0,
            start: 0,
            urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dispatch_records_every_url() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(20)));
        let dispatcher = dispatcher_with(transport.clone());
        let acc = ResultAccumulator::new();

        let batch = batch_of(&["http://h/a", "http://h/fail", "http://h/c", "http://h/d"]);
        let report = dispatcher.dispatch_batch(&batch, &acc).await.unwrap();

        assert_eq!(report.size, 4);
        assert_eq!(report.successes, 3);
        assert_eq!(report.failures, 1);
        assert_eq!(acc.counts().await, (3, 1));
        assert_eq!(transport.peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_max_in_flight_bounds_concurrency() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(20)));
        let dispatcher = dispatcher_with(transport.clone()).with_max_in_flight(Some(2));
        let acc = ResultAccumulator::new();

        let batch = batch_of(&["http://h/1", "http://h/2", "http://h/3", "http://h/4", "http://h/5"]);
        let report = dispatcher.dispatch_batch(&batch, &acc).await.unwrap();

        assert_eq!(report.successes, 5);
        assert!(transport.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panicking_unit_is_isolated() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(5)));
        let dispatcher = dispatcher_with(transport);
        let acc = ResultAccumulator::new();

        let batch = batch_of(&["http://h/a", "http://h/panic", "http://h/c"]);
        let report = dispatcher.dispatch_batch(&batch, &acc).await.unwrap();

        assert_eq!(report.successes, 2);
        assert_eq!(report.failures, 1);

        let snapshot = acc.snapshot().await;
        let aborted = snapshot
            .records
            .iter()
            .find(|r| r.url == "http://h/panic")
            .unwrap();
        assert_eq!(
            aborted.outcome,
            FetchOutcome::failure(FailureReason::Aborted)
        );
        assert_eq!(aborted.position, 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_dispatch_launches_nothing() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(5)));
        let (tx, rx) = watch::channel(true);
        let dispatcher = dispatcher_with(transport.clone()).with_shutdown(rx);
        let acc = ResultAccumulator::new();

        let result = dispatcher.dispatch_batch(&batch_of(&["http://h/a"]), &acc).await;

        assert_eq!(
            result,
            Err(DispatchError::Interrupted {
                batch: 0,
                completed: 0,
                total: 1
            })
        );
        assert!(acc.is_empty().await);
        assert_eq!(transport.peak.load(Ordering::SeqCst), 0);
        drop(tx);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_during_join_interrupts() {
        let transport = Arc::new(CountingTransport::new(Duration::from_secs(30)));
        let (tx, rx) = watch::channel(false);
        let dispatcher = dispatcher_with(transport).with_shutdown(rx);
        let acc = ResultAccumulator::new();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let started = Instant::now();
        let result = dispatcher
            .dispatch_batch(&batch_of(&["http://h/a", "http://h/b"]), &acc)
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::Interrupted { total: 2, completed: 0, .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(acc.is_empty().await);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_does_not_interrupt() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(5)));
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let dispatcher = dispatcher_with(transport).with_shutdown(rx);
        let acc = ResultAccumulator::new();

        let report = dispatcher
            .dispatch_batch(&batch_of(&["http://h/a", "http://h/b"]), &acc)
            .await
            .unwrap();
        assert_eq!(report.successes, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_interrupt_counts_units_finished_behind_slow_one() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(5)));
        let (tx, rx) = watch::channel(false);
        let dispatcher = dispatcher_with(transport).with_shutdown(rx);
        let acc = ResultAccumulator::new();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let _ = tx.send(true);
        });

        let result = dispatcher
            .dispatch_batch(&batch_of(&["http://h/slow", "http://h/fast"]), &acc)
            .await;

        assert_eq!(
            result,
            Err(DispatchError::Interrupted {
                batch: 0,
                completed: 1,
                total: 2
            })
        );

        let snapshot = acc.snapshot().await;
        assert_eq!(snapshot.attempted(), vec!["http://h/fast"]);

        // Aborted units are drained before returning, nothing lands later
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(acc.len().await, 1);
    }

    #[tokio::test]
    async fn test_closed_semaphore_fetches_without_permit() {
        let semaphore = Arc::new(Semaphore::new(1));
        semaphore.close();

        assert!(acquire_permit(Some(semaphore), "http://h/a").await.is_none());
        assert!(acquire_permit(None, "http://h/a").await.is_none());

        let open = Arc::new(Semaphore::new(1));
        let permit = acquire_permit(Some(Arc::clone(&open)), "http://h/a").await;
        assert!(permit.is_some());
        assert_eq!(open.available_permits(), 0);
    }
}
