//! Common test utilities

use async_trait::async_trait;
use batchfetch::batch::{BatchDispatcher, BatchPlanner, ResultAccumulator};
use batchfetch::config::FetcherConfig;
use batchfetch::error::FetchError;
use batchfetch::fetcher::transport::{FetchRequest, HttpTransport, TransportResponse};
use batchfetch::fetcher::Fetcher;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE: &str = "http://test.local";

/// Build URLs under [`BASE`] from short names
pub fn urls(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| format!("{BASE}/{n}")).collect()
}

/// Scripted failure modes
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum Fault {
    Timeout,
    Connect,
    BrokenBody,
    Panic,
}

/// What the transport answers for one URL
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Option<String>,
    pub delay: Duration,
    pub fault: Option<Fault>,
}

#[allow(dead_code)]
impl Reply {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            body: Some(body.to_string()),
            delay: Duration::ZERO,
            fault: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Some(format!("status {status}")),
            delay: Duration::ZERO,
            fault: None,
        }
    }

    pub fn fault(fault: Fault) -> Self {
        Self {
            status: 200,
            body: None,
            delay: Duration::ZERO,
            fault: Some(fault),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One observed transport call
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    /// Accumulator length when the call started (0 without an observer)
    pub recorded_before: usize,
    pub at: DateTime<Utc>,
}

/// Transport answering from a per-URL script; unscripted URLs get 200
pub struct ScriptedTransport {
    replies: HashMap<String, Reply>,
    default_delay: Duration,
    observer: Option<Arc<ResultAccumulator>>,
    calls: Mutex<Vec<Call>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            default_delay: Duration::ZERO,
            observer: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Capture the accumulator length at the start of every call
    pub fn observe(mut self, accumulator: Arc<ResultAccumulator>) -> Self {
        self.observer = Some(accumulator);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, request: FetchRequest) -> Result<TransportResponse, FetchError> {
        let url = request.url.to_string();
        let recorded_before = match &self.observer {
            Some(acc) => acc.len().await,
            None => 0,
        };
        self.calls.lock().unwrap().push(Call {
            url: url.clone(),
            recorded_before,
            at: Utc::now(),
        });

        let reply = self.replies.get(&url).cloned().unwrap_or_else(|| {
            Reply::ok(&format!("body of {url}")).delayed(self.default_delay)
        });

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        match reply.fault {
            Some(Fault::Timeout) => Err(FetchError::Timeout),
            Some(Fault::Connect) => Err(FetchError::Connect("connection refused".to_string())),
            Some(Fault::Panic) => panic!("scripted panic for {url}"),
            Some(Fault::BrokenBody) => {
                let chunks: Vec<Result<Bytes, FetchError>> = vec![
                    Ok(Bytes::from_static(b"partial")),
                    Err(FetchError::Body("connection reset".to_string())),
                ];
                Ok(TransportResponse::new(200, None, stream::iter(chunks).boxed()))
            }
            None => Ok(TransportResponse::from_bytes(
                reply.status,
                Some("text/plain; charset=utf-8"),
                reply.body.unwrap_or_default(),
            )),
        }
    }
}

/// Planner over a scripted transport with default fetcher settings
pub fn planner_with(transport: Arc<ScriptedTransport>, batch_length: usize) -> BatchPlanner {
    let fetcher = Fetcher::with_transport(&FetcherConfig::default(), transport).unwrap();
    BatchPlanner::new(BatchDispatcher::new(Arc::new(fetcher)), batch_length).unwrap()
}
