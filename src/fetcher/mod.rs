//! Single-URL fetching
//!
//! [`Fetcher::fetch_one`] performs exactly one GET for one URL and turns
//! whatever happens into a [`FetchOutcome`]. It never returns an error: a
//! timeout, refused connection, non-200 status or broken body all become a
//! failed outcome tagged with a [`FailureReason`](crate::models::FailureReason).

pub mod body;
pub mod headers;
pub mod transport;

use reqwest::header::HeaderMap;
use std::sync::Arc;
use url::Url;

use crate::config::FetcherConfig;
use crate::error::{Error, Result};
use crate::models::FetchOutcome;
use crate::utils::error::FetchError;
use body::{decode_body, LineEndingPolicy};
use headers::build_fetch_headers;
use transport::{FetchRequest, HttpTransport, ReqwestTransport, TransportResponse};

/// Status code treated as success; everything else fails
const SUCCESS_STATUS: u16 = 200;

/// Fetches one URL through an [`HttpTransport`]
pub struct Fetcher {
    /// Transport used for every request
    transport: Arc<dyn HttpTransport>,

    /// Fixed headers sent with every request
    headers: HeaderMap,

    /// Line ending policy applied to successful bodies
    line_endings: LineEndingPolicy,
}

impl Fetcher {
    /// Create a fetcher backed by [`ReqwestTransport`]
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unusable user agent and `Error::Fetch`
    /// if the HTTP client cannot be created
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a fetcher with a custom transport
    pub fn with_transport(config: &FetcherConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let headers = build_fetch_headers(&config.user_agent)
            .map_err(|e| Error::config(format!("Invalid user agent: {e}")))?;

        Ok(Self {
            transport,
            headers,
            line_endings: config.line_endings,
        })
    }

    /// Fetch one URL, exactly once
    pub async fn fetch_one(&self, url: &str) -> FetchOutcome {
        match self.try_fetch(url).await {
            Ok(body) => {
                tracing::debug!(url = %url, bytes = body.len(), "Fetch succeeded");
                FetchOutcome::success(body)
            }
            Err(e) => {
                let reason = e.reason();
                tracing::debug!(url = %url, reason = %reason, error = %e, "Fetch failed");
                FetchOutcome::failure(reason)
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

        let request = FetchRequest {
            url: parsed,
            headers: self.headers.clone(),
        };

        let TransportResponse {
            status,
            content_type,
            body,
        } = self.transport.get(request).await?;

        if status != SUCCESS_STATUS {
            return Err(FetchError::Status(status));
        }

        let bytes = TransportResponse::read_to_end(body).await?;
        let text = decode_body(&bytes, content_type.as_deref());

        Ok(self.line_endings.apply(text))
    }
}
