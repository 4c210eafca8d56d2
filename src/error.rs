//! Unified error handling for the batchfetch crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`BatchFetchErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for reporting
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! Per-URL fetch failures never surface through this type during a plan; they
//! are recorded as failed outcomes. What does surface is an interrupted batch
//! join, configuration problems and report I/O.

use std::io;
use thiserror::Error;

pub use crate::utils::error::{DispatchError, FetchError};

/// Common trait for all batchfetch error types
pub trait BatchFetchErrorTrait: std::error::Error {
    /// Get the error category for reporting
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// HTTP client errors
    Network,
    /// Batch join errors (interruption)
    Dispatch,
    /// Report serialization errors
    Parsing,
    /// Report file errors
    Storage,
    /// Configuration and validation errors
    Config,
}

impl ErrorCategory {
    /// Get description for the category
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "network error",
            Self::Dispatch => "dispatch error",
            Self::Parsing => "parsing error",
            Self::Storage => "storage error",
            Self::Config => "configuration error",
        }
    }
}

/// Unified error type for the batchfetch crate
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP client construction errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Batch join errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Report file I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Report serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl BatchFetchErrorTrait for FetchError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Network
    }
}

impl BatchFetchErrorTrait for DispatchError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Dispatch
    }
}

impl BatchFetchErrorTrait for Error {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Dispatch(e) => e.category(),
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
