//! Error types for the batch fetcher
//!
//! This module defines the errors produced while fetching a single URL and
//! while joining a batch of fetches.

use thiserror::Error;

use crate::models::FailureReason;

/// Errors that can occur during HTTP fetching operations
///
/// None of these escape a batch: the fetcher collapses every variant into a
/// failed outcome and keeps only its [`FailureReason`].
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP client error that is neither a timeout nor a connect failure
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    /// Connect or read timeout elapsed
    #[error("Request timeout")]
    Timeout,

    /// Connection could not be established (DNS, refused, TLS handshake)
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Response status other than 200
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Response body could not be read to the end
    #[error("Body read error: {0}")]
    Body(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Diagnostic tag kept on the failed outcome
    #[must_use]
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Http(_) => FailureReason::Transport,
            Self::Timeout => FailureReason::Timeout,
            Self::Connect(_) => FailureReason::Connect,
            Self::Status(code) => FailureReason::Status(*code),
            Self::Body(_) => FailureReason::Io,
            Self::InvalidUrl(_) => FailureReason::InvalidUrl,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else if err.is_builder() {
            Self::InvalidUrl(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

/// Errors that can occur while joining a batch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Shutdown was requested before every unit of the batch finished
    #[error("Batch {batch} interrupted after {completed}/{total} fetches")]
    Interrupted {
        /// Batch index within the plan
        batch: usize,
        /// Units that reached a terminal outcome before the interruption
        completed: usize,
        /// Units in the batch
        total: usize,
    },
}
