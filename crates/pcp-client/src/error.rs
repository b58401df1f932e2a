//! Error types for the forwarding client

use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for client construction
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while building an HTTP client
#[derive(Error, Debug)]
pub enum ClientError {
    /// TLS configuration could not be assembled
    #[error("TLS configuration failed: {0}")]
    Tls(#[from] rustls::Error),
}

/// Errors while resolving the target URL of a forward
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Relative path against a base URL that is not `https://`
    #[error("Base URL must start with https://")]
    HttpsRequired,

    /// Base URL or path does not form a valid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors of a single HTTP attempt; none of them carries a response
#[derive(Error, Debug)]
pub enum TransportError {
    /// Method name is not a valid HTTP token
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request could not be assembled
    #[error("Invalid request: {0}")]
    Request(#[from] hyper::http::Error),

    /// Connection or protocol failure before a response arrived
    #[error("HTTP request failed: {0}")]
    Connect(#[from] hyper_util::client::legacy::Error),

    /// Response body could not be read
    #[error("Failed to read response body: {0}")]
    Body(#[from] hyper::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Attempt exceeded the per-request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Describe the error with its whole source chain.
    ///
    /// The hyper errors keep the useful part (DNS failure, refused
    /// connection, TLS alert) in their sources.
    pub fn describe(&self) -> String {
        let mut text = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            let part = err.to_string();
            if !text.contains(&part) {
                text.push_str(": ");
                text.push_str(&part);
            }
            source = err.source();
        }
        text
    }
}
