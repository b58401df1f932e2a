//! Transport seam between the forwarding engine and the network

use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::HeaderMap;
use pcp_core::ResponseEcho;

use crate::error::{Result, TransportError};
use crate::request::{render_headers, Attempt};

/// Sends one HTTP attempt and reads the full response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, attempt: &Attempt) -> std::result::Result<AttemptResponse, TransportError>;
}

/// Builds fresh transports for a [`ClientHandle`](crate::ClientHandle).
pub trait TransportFactory: Send + Sync {
    fn build_transport(&self) -> Result<Arc<dyn Transport>>;
}

/// Fully read response of one attempt
#[derive(Debug, Clone)]
pub struct AttemptResponse {
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: String,
}

impl AttemptResponse {
    pub fn echo(&self) -> ResponseEcho {
        ResponseEcho {
            headers: render_headers(&self.headers),
            body: self.body.clone(),
        }
    }
}
