//! PCP Client Library
//!
//! Forwards JSON-over-HTTP requests to a desk phone's embedded web API.
//!
//! The phone serves its API over HTTPS with a self-signed certificate, so the
//! client built by [`ClientFactory`] accepts any server certificate. One
//! endpoint (`/api/v1/callctrl/dial`) spuriously answers `400` on some
//! models; [`Forwarder`] retries it with the documented variants.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pcp_client::{ClientFactory, ClientHandle, Forwarder};
//! use pcp_core::{ForwardRequest, NoopRecorder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let clients = Arc::new(ClientHandle::new(ClientFactory::new())?);
//!     let forwarder = Forwarder::new(clients, Arc::new(NoopRecorder));
//!
//!     let result = forwarder
//!         .forward(&ForwardRequest::get("https://10.0.0.12", "/api/v1/mgmt/device/info"))
//!         .await;
//!     println!("{} {}", result.status, result.reason);
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides a mock phone and a scripted transport:
//!
//! ```rust,ignore
//! use pcp_client::testing::MockDevice;
//!
//! let device = MockDevice::start_with_dial_failures(3).await?;
//! let path = device.url("/api/v1/callctrl/dial");
//! ```

mod engine;
mod error;
mod factory;
mod handle;
mod request;
pub mod testing;
mod tls;
mod transport;

pub use engine::{Forwarder, DIAL_ENDPOINT};
pub use error::{ClientError, ResolveError, Result, TransportError};
pub use factory::{ClientFactory, HttpClient, REQUEST_TIMEOUT};
pub use handle::{ClientHandle, ClientLease};
pub use request::{render_headers, Attempt, Target, JSON_CONTENT_TYPE};
pub use tls::{insecure_client_config, AcceptAnyServerCert, TLS_INSECURE};
pub use transport::{AttemptResponse, Transport, TransportFactory};
