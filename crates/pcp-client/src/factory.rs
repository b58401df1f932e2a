//! HTTP client construction

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, instrument};

use crate::error::{Result, TransportError};
use crate::request::Attempt;
use crate::tls::insecure_client_config;
use crate::transport::{AttemptResponse, Transport, TransportFactory};

/// Per-request timeout covering connect, send and body read
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Builds HTTP clients for the phone.
///
/// Every client speaks HTTP/1.1 over plain TCP or TLS and accepts any
/// server certificate.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    timeout: Duration,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self {
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Factory with a custom per-request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create a new client.
    pub fn create(&self) -> Result<HttpClient> {
        let https = HttpsConnectorBuilder::new()
            .with_tls_config(insecure_client_config()?)
            .https_or_http()
            .enable_http1()
            .build();
        let inner = Client::builder(TokioExecutor::new()).build(https);
        debug!(timeout = ?self.timeout, "Created HTTP client");
        Ok(HttpClient {
            inner,
            timeout: self.timeout,
        })
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for ClientFactory {
    fn build_transport(&self) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(self.create()?))
    }
}

/// HTTP client for the phone's web API
#[derive(Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    async fn execute(&self, attempt: &Attempt) -> std::result::Result<AttemptResponse, TransportError> {
        let response = self.inner.request(attempt.to_http_request()?).await?;

        let status = response.status();
        let reason = response
            .extensions()
            .get::<hyper::ext::ReasonPhrase>()
            .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).into_owned())
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_default();
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await?.to_bytes();

        Ok(AttemptResponse {
            status: status.as_u16(),
            reason,
            headers: parts.headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

#[async_trait]
impl Transport for HttpClient {
    #[instrument(skip(self, attempt), fields(method = %attempt.method, url = %attempt.url))]
    async fn send(&self, attempt: &Attempt) -> std::result::Result<AttemptResponse, TransportError> {
        let response = tokio::time::timeout(self.timeout, self.execute(attempt))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;
        debug!(status = response.status, "Attempt completed");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout() {
        assert_eq!(ClientFactory::new().timeout(), Duration::from_secs(15));
        assert_eq!(ClientFactory::default().timeout(), REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_create_client() {
        let client = ClientFactory::with_timeout(Duration::from_secs(1)).create().unwrap();
        assert_eq!(client.timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_factory_builds_distinct_transports() {
        let factory = ClientFactory::new();
        let a = factory.build_transport().unwrap();
        let b = factory.build_transport().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
