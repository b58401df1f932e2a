//! Test utilities for pcp-client
//!
//! Provides a mock phone (plain HTTP, or HTTPS with a self-signed
//! certificate) for integration tests and scripted doubles for the
//! transport seam.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use parking_lot::Mutex;
use pcp_core::{ForwardResult, ResultRecorder};
use rcgen::CertifiedKey;
use rustls::pki_types::PrivatePkcs8KeyDer;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_rustls::TlsAcceptor;

use crate::engine::DIAL_ENDPOINT;
use crate::error::{ClientError, Result, TransportError};
use crate::request::{Attempt, JSON_CONTENT_TYPE};
use crate::transport::{AttemptResponse, Transport, TransportFactory};

/// Body the mock phone answers the dial quirk with
pub const QUIRK_BODY: &str = "<html><body><h1>400 Bad Request</h1></body></html>";

/// Body of every successful mock phone response
pub const OK_BODY: &str = r#"{"Status":"2000"}"#;

/// Path the mock phone holds for a minute before answering
pub const STALL_PATH: &str = "/stall";

const STALL: Duration = Duration::from_secs(60);

/// First byte of a TLS handshake record
const TLS_HANDSHAKE: u8 = 0x16;

// =============================================================================
// Mock phone
// =============================================================================

/// A request as received by [`MockDevice`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: String,
    /// Whether the request arrived over TLS
    pub tls: bool,
}

#[derive(Default)]
struct DeviceState {
    requests: Mutex<Vec<RecordedRequest>>,
    dial_failures: AtomicUsize,
}

/// Router state of one listener flavour
#[derive(Clone)]
struct Endpoint {
    device: Arc<DeviceState>,
    tls: bool,
}

/// Stand-in for a phone's web API.
///
/// Records every request. The dial endpoint answers `400` for the
/// configured number of requests, `/status/{code}` answers `{code}`,
/// [`STALL_PATH`] never answers in time, and everything else answers `200`
/// with a JSON body. Shuts down when dropped.
pub struct MockDevice {
    pub addr: SocketAddr,
    tls: bool,
    state: Arc<DeviceState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockDevice {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with_dial_failures(0).await
    }

    /// Start a plain-HTTP device whose dial endpoint fails `failures` times
    /// before succeeding.
    pub async fn start_with_dial_failures(failures: usize) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = device_state(failures);
        let router = device_router(&state, false);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            tls: false,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub async fn start_tls() -> std::io::Result<Self> {
        Self::start_tls_with_dial_failures(0).await
    }

    /// Start a device serving HTTPS with a freshly generated self-signed
    /// certificate, like a factory-fresh phone.
    ///
    /// Plain HTTP is answered on the same port, so a downgraded dial retry
    /// reaches the same device.
    pub async fn start_tls_with_dial_failures(failures: usize) -> std::io::Result<Self> {
        let acceptor = self_signed_acceptor()?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = device_state(failures);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(serve_dual(listener, acceptor, state.clone(), shutdown_rx));

        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            tls: true,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}", scheme, self.addr)
    }

    /// Absolute URL of `path` on this device
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn device_state(dial_failures: usize) -> Arc<DeviceState> {
    Arc::new(DeviceState {
        requests: Mutex::new(Vec::new()),
        dial_failures: AtomicUsize::new(dial_failures),
    })
}

fn device_router(state: &Arc<DeviceState>, tls: bool) -> Router {
    Router::new().fallback(handle_request).with_state(Endpoint {
        device: state.clone(),
        tls,
    })
}

fn self_signed_acceptor() -> std::io::Result<TlsAcceptor> {
    let CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .map_err(std::io::Error::other)?;
    let key = PrivatePkcs8KeyDer::from(key_pair.serialize_der());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(std::io::Error::other)?
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key.into())
        .map_err(std::io::Error::other)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accept loop answering TLS and plain HTTP on one port.
///
/// A connection is TLS when its first byte opens a handshake record.
async fn serve_dual(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    state: Arc<DeviceState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let https = device_router(&state, true);
    let http = device_router(&state, false);

    loop {
        let stream = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(_) => continue,
            },
            _ = &mut shutdown_rx => break,
        };
        let (acceptor, https, http) = (acceptor.clone(), https.clone(), http.clone());
        tokio::spawn(async move {
            let mut first = [0u8; 1];
            match stream.peek(&mut first).await {
                Ok(1) if first[0] == TLS_HANDSHAKE => {
                    if let Ok(stream) = acceptor.accept(stream).await {
                        serve_connection(stream, https).await;
                    }
                }
                Ok(_) => serve_connection(stream, http).await,
                Err(_) => {}
            }
        });
    }
}

async fn serve_connection<S>(stream: S, router: Router)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let _ = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(router))
        .await;
}

async fn handle_request(State(endpoint): State<Endpoint>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let path = parts.uri.path().to_string();
    let state = &endpoint.device;
    state.requests.lock().push(RecordedRequest {
        method: parts.method.to_string(),
        path: path.clone(),
        headers: parts.headers,
        body,
        tls: endpoint.tls,
    });

    if path == STALL_PATH {
        tokio::time::sleep(STALL).await;
    }

    if path.contains(DIAL_ENDPOINT) {
        let failing = state
            .dial_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return (
                StatusCode::BAD_REQUEST,
                [(CONTENT_TYPE, "text/html")],
                QUIRK_BODY,
            )
                .into_response();
        }
    }

    if let Some(code) = path.strip_prefix("/status/") {
        let status = code
            .parse::<u16>()
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::BAD_REQUEST);
        return status.into_response();
    }

    ([(CONTENT_TYPE, JSON_CONTENT_TYPE)], OK_BODY).into_response()
}

/// URL of a local port nothing listens on
pub fn unused_local_url() -> std::io::Result<String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}", addr))
}

// =============================================================================
// Scripted doubles
// =============================================================================

/// Scripted outcome of one attempt
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Respond { status: u16, body: String },
    /// Fails with a refused connection carrying this message
    Fail(String),
}

impl ScriptedOutcome {
    pub fn respond(status: u16, body: impl Into<String>) -> Self {
        Self::Respond {
            status,
            body: body.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

#[derive(Default)]
struct ScriptState {
    outcomes: Mutex<VecDeque<ScriptedOutcome>>,
    attempts: Mutex<Vec<Attempt>>,
}

/// Transport replaying scripted outcomes in order.
///
/// Answers `200` with an empty body once the script is exhausted. Clones
/// share the script and the attempt log.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<ScriptState>,
}

impl ScriptedTransport {
    pub fn new(outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            state: Arc::new(ScriptState {
                outcomes: Mutex::new(outcomes.into()),
                attempts: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Attempts sent so far
    pub fn attempts(&self) -> Vec<Attempt> {
        self.state.attempts.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, attempt: &Attempt) -> std::result::Result<AttemptResponse, TransportError> {
        self.state.attempts.lock().push(attempt.clone());
        let outcome = self
            .state
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScriptedOutcome::respond(200, ""));

        match outcome {
            ScriptedOutcome::Respond { status, body } => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
                Ok(AttemptResponse {
                    status,
                    reason: StatusCode::from_u16(status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or_default()
                        .to_string(),
                    headers,
                    body,
                })
            }
            ScriptedOutcome::Fail(message) => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                message,
            ))),
        }
    }
}

#[derive(Default)]
struct FactoryState {
    builds: AtomicUsize,
    fail_next: AtomicBool,
}

/// Factory handing out scripted transports and counting builds
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    transport: Option<ScriptedTransport>,
    state: Arc<FactoryState>,
}

impl ScriptedFactory {
    /// Every build returns a fresh transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every build returns `transport`.
    pub fn with_transport(transport: ScriptedTransport) -> Self {
        Self {
            transport: Some(transport),
            state: Arc::default(),
        }
    }

    /// Successful builds so far
    pub fn builds(&self) -> usize {
        self.state.builds.load(Ordering::SeqCst)
    }

    /// Make the next build fail.
    pub fn fail_next_build(&self) {
        self.state.fail_next.store(true, Ordering::SeqCst);
    }
}

impl TransportFactory for ScriptedFactory {
    fn build_transport(&self) -> Result<Arc<dyn Transport>> {
        if self.state.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ClientError::Tls(rustls::Error::General(
                "scripted build failure".to_string(),
            )));
        }
        self.state.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.transport.clone().unwrap_or_default()))
    }
}

/// Recorder keeping every result in memory
#[derive(Clone, Default)]
pub struct CollectingRecorder {
    results: Arc<Mutex<Vec<ForwardResult>>>,
}

impl CollectingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ForwardResult> {
        self.results.lock().clone()
    }
}

impl ResultRecorder for CollectingRecorder {
    fn record(&self, result: &ForwardResult) {
        self.results.lock().push(result.clone());
    }
}
