//! Configuration management for batchfetch
//!
//! This module handles loading and validating configuration from environment variables,
//! files, and command-line arguments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::batch::accumulator::DEFAULT_FAILURE_WARN_THRESHOLD;
use crate::fetcher::body::LineEndingPolicy;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Single-URL fetch configuration
    pub fetcher: FetcherConfig,

    /// Batch planning configuration
    pub batch: BatchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Fetcher-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,

    /// User agent string
    pub user_agent: String,

    /// How line breaks in response bodies are handled
    pub line_endings: LineEndingPolicy,
}

/// Batch planning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of URLs per batch
    pub batch_length: usize,

    /// Upper bound on concurrent fetches inside one batch (unset = batch size)
    pub max_in_flight: Option<usize>,

    /// Consecutive failures of one URL before a warning is logged (0 = never)
    pub failure_warn_threshold: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn default_user_agent() -> String {
    format!(
        "batchfetch/{} (concurrent batch URL fetcher)",
        env!("CARGO_PKG_VERSION")
    )
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 20_000,
            read_timeout_ms: 20_000,
            user_agent: default_user_agent(),
            line_endings: LineEndingPolicy::default(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_length: 10,
            max_in_flight: None,
            failure_warn_threshold: DEFAULT_FAILURE_WARN_THRESHOLD,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive for this crate; `verbose` forces debug
    pub fn filter_directive(&self, verbose: bool) -> String {
        if verbose {
            String::from("batchfetch=debug,info")
        } else {
            format!("batchfetch={},warn", self.level.to_ascii_lowercase())
        }
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl FetcherConfig {
    /// Get connect timeout as Duration
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get read timeout as Duration
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let connect_timeout_ms = std::env::var("BATCHFETCH_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.fetcher.connect_timeout_ms);

        let read_timeout_ms = std::env::var("BATCHFETCH_READ_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.fetcher.read_timeout_ms);

        let user_agent =
            std::env::var("BATCHFETCH_USER_AGENT").unwrap_or(defaults.fetcher.user_agent);

        let line_endings = std::env::var("BATCHFETCH_LINE_ENDINGS")
            .ok()
            .and_then(|v| v.parse::<LineEndingPolicy>().ok())
            .unwrap_or(defaults.fetcher.line_endings);

        let batch_length = std::env::var("BATCHFETCH_BATCH_LENGTH")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.batch.batch_length);

        let max_in_flight = std::env::var("BATCHFETCH_MAX_IN_FLIGHT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok());

        let failure_warn_threshold = std::env::var("BATCHFETCH_FAILURE_WARN_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.batch.failure_warn_threshold);

        let log_level =
            std::env::var("BATCHFETCH_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("BATCHFETCH_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            fetcher: FetcherConfig {
                connect_timeout_ms,
                read_timeout_ms,
                user_agent,
                line_endings,
            },
            batch: BatchConfig {
                batch_length,
                max_in_flight,
                failure_warn_threshold,
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.batch.batch_length == 0 {
            anyhow::bail!("batch_length must be greater than 0");
        }

        if self.batch.max_in_flight == Some(0) {
            anyhow::bail!("max_in_flight must be greater than 0 when set");
        }

        if self.fetcher.connect_timeout_ms == 0 || self.fetcher.read_timeout_ms == 0 {
            anyhow::bail!("timeouts must be greater than 0");
        }

        if self.fetcher.user_agent.trim().is_empty() {
            anyhow::bail!("user_agent must not be empty");
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            anyhow::bail!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            );
        }

        if !matches!(self.logging.format.to_ascii_lowercase().as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be text or json, got '{}'", self.logging.format);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_batch_length() {
        let mut config = Config::default();
        config.batch.batch_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_max_in_flight() {
        let mut config = Config::default();
        config.batch.max_in_flight = Some(0);
        assert!(config.validate().is_err());

        config.batch.max_in_flight = Some(4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_conversion() {
        let config = Config::default();
        assert_eq!(config.fetcher.connect_timeout(), Duration::from_secs(20));
        assert_eq!(config.fetcher.read_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[batch]\nbatch_length = 3\n").unwrap();
        assert_eq!(config.batch.batch_length, 3);
        assert_eq!(config.batch.max_in_flight, None);
        assert_eq!(config.fetcher.read_timeout_ms, 20_000);
        assert_eq!(config.fetcher.line_endings, LineEndingPolicy::Preserve);
    }

    #[test]
    fn test_logging_filter_directive() {
        let mut logging = LoggingConfig::default();
        assert_eq!(logging.filter_directive(false), "batchfetch=info,warn");
        assert_eq!(logging.filter_directive(true), "batchfetch=debug,info");

        logging.level = String::from("WARN");
        assert_eq!(logging.filter_directive(false), "batchfetch=warn,warn");
    }

    #[test]
    fn test_invalid_logging_settings() {
        let mut config = Config::default();
        config.logging.level = String::from("loud");
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = String::from("xml");
        assert!(config.validate().is_err());

        config.logging.format = String::from("JSON");
        assert!(config.validate().is_ok());
        assert!(config.logging.is_json());
    }
}
