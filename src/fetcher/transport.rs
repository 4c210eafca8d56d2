//! HTTP transport seam
//!
//! The fetcher never talks to the network directly. It hands a
//! [`FetchRequest`] to an [`HttpTransport`] and gets back a status line and a
//! body stream. [`ReqwestTransport`] is the production implementation; tests
//! substitute scripted transports.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Client;
use std::fmt;
use url::Url;

use crate::config::FetcherConfig;
use crate::utils::error::FetchError;

/// Response body as a stream of chunks
pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// A single GET request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub headers: HeaderMap,
}

/// Status line and body of a response
///
/// Dropping the value releases the underlying connection.
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: BodyStream,
}

impl TransportResponse {
    pub fn new(status: u16, content_type: Option<String>, body: BodyStream) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    /// Build a response whose body is already in memory
    pub fn from_bytes(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        let chunk: Result<Bytes, FetchError> = Ok(body.into());
        Self::new(
            status,
            content_type.map(str::to_string),
            stream::iter([chunk]).boxed(),
        )
    }

    /// Read the whole body, failing on the first chunk error
    ///
    /// Data received before the error is discarded.
    pub async fn read_to_end(mut body: BodyStream) -> Result<Vec<u8>, FetchError> {
        let mut buf = Vec::new();
        while let Some(chunk) = body.try_next().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Capability to perform one HTTP GET
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request and return once the status line and headers arrive
    async fn get(&self, request: FetchRequest) -> Result<TransportResponse, FetchError>;
}

/// reqwest-backed transport
///
/// Idle connections are not pooled, so every fetch opens and closes its own
/// connection.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with the configured connect and read timeouts
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .pool_max_idle_per_host(0)
            .gzip(true)
            .build()
            .map_err(FetchError::Http)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: FetchRequest) -> Result<TransportResponse, FetchError> {
        let response = self
            .client
            .get(request.url)
            .headers(request.headers)
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes_stream().map_err(FetchError::from).boxed();

        Ok(TransportResponse::new(status, content_type, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_to_end_concatenates_chunks() {
        let chunks: Vec<Result<Bytes, FetchError>> = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let body = stream::iter(chunks).boxed();

        let bytes = TransportResponse::read_to_end(body).await.unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn test_read_to_end_discards_partial_body() {
        let chunks: Vec<Result<Bytes, FetchError>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(FetchError::Body("connection reset".to_string())),
        ];
        let body = stream::iter(chunks).boxed();

        let result = TransportResponse::read_to_end(body).await;
        assert!(matches!(result, Err(FetchError::Body(_))));
    }

    #[test]
    fn test_transport_creation() {
        let transport = ReqwestTransport::new(&FetcherConfig::default());
        assert!(transport.is_ok());
    }

    #[test]
    fn test_from_bytes_debug() {
        let response = TransportResponse::from_bytes(200, Some("text/plain"), "ok");
        let debug = format!("{response:?}");
        assert!(debug.contains("200"));
        assert!(debug.contains("text/plain"));
    }
}
