//! Local host surface: static UI, bridge shim and the bridge WebSocket

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::{CONTENT_TYPE, HOST, ORIGIN};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use pcp_core::ReplyMessage;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::bridge::MessageBridge;

/// Shim defining `window.native.invoke`
pub const NATIVE_JS: &str = include_str!("../assets/native.js");

/// Page served at `/` when the content root has no `index.html`
pub const MISSING_INDEX_PAGE: &str =
    "<h2 style='font-family:sans-serif'>Missing wwwroot/index.html</h2>";

const SHIM_TAG: &str = "<script src=\"/native.js\"></script>";

/// Shared state of the host router
#[derive(Clone)]
pub struct HostState {
    bridge: Arc<MessageBridge>,
    log_stream: broadcast::Sender<ReplyMessage>,
    content_root: Arc<PathBuf>,
}

impl HostState {
    pub fn new(
        bridge: MessageBridge,
        log_stream: broadcast::Sender<ReplyMessage>,
        content_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bridge: Arc::new(bridge),
            log_stream,
            content_root: Arc::new(content_root.into()),
        }
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }
}

/// Create the host router.
///
/// No CORS layer: the UI is served by this router, so every legitimate
/// page is same-origin.
pub fn create_router(state: HostState) -> Router {
    let static_files = ServeDir::new(state.content_root.as_path());

    Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "OK" }))
        .route("/native.js", get(native_js))
        .route("/bridge", get(bridge_socket))
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `index.html` with the bridge shim loaded ahead of the page's own scripts
async fn index(State(state): State<HostState>) -> Html<String> {
    let path = state.content_root.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(inject_shim(&page)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "No index.html in content root");
            Html(MISSING_INDEX_PAGE.to_string())
        }
    }
}

fn inject_shim(page: &str) -> String {
    match page.find("</head>") {
        Some(at) => format!("{}{}{}", &page[..at], SHIM_TAG, &page[at..]),
        None => format!("{}{}", SHIM_TAG, page),
    }
}

async fn native_js() -> Response {
    ([(CONTENT_TYPE, "application/javascript")], NATIVE_JS).into_response()
}

async fn bridge_socket(
    headers: HeaderMap,
    State(state): State<HostState>,
    ws: WebSocketUpgrade,
) -> Response {
    if !is_own_origin(&headers) {
        warn!(origin = ?headers.get(ORIGIN), host = ?headers.get(HOST), "Refusing bridge connection");
        return StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| run_session(socket, state))
}

/// Whether a bridge upgrade comes from a page this host served.
///
/// Clients that send no `Origin` are not browsers and pass. A browser page
/// must be `http://` on exactly the authority in `Host`, and that host must
/// be `localhost` or an IP literal so a rebound DNS name cannot pose as us.
fn is_own_origin(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(ORIGIN) else {
        return true;
    };
    let Some(host) = headers.get(HOST).and_then(|h| h.to_str().ok()) else {
        return false;
    };
    let Ok(origin) = origin.to_str().unwrap_or_default().parse::<Uri>() else {
        return false;
    };
    let Some(authority) = origin.authority() else {
        return false;
    };
    if origin.scheme_str() != Some("http") || !authority.as_str().eq_ignore_ascii_case(host) {
        return false;
    }

    let name = authority.host();
    name.eq_ignore_ascii_case("localhost")
        || name
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok()
}

/// One bridge session.
///
/// Every text frame is dispatched on its own task, so a slow forward or a
/// pending confirmation never holds up other commands. Replies and log
/// stream events share the single socket writer.
async fn run_session(socket: WebSocket, state: HostState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ReplyMessage>();
    let mut log_rx = state.log_stream.subscribe();
    info!("Bridge session opened");

    let writer = tokio::spawn(async move {
        let mut log_open = true;
        loop {
            let reply = tokio::select! {
                reply = rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
                event = log_rx.recv(), if log_open => match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Bridge session fell behind the log stream");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        log_open = false;
                        continue;
                    }
                },
            };
            if sink.send(Message::Text(reply.to_json().into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let bridge = state.bridge.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    bridge.dispatch(text.as_str(), &tx).await;
                });
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => debug!("Ignoring binary bridge frame"),
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Bridge socket error");
                break;
            }
        }
    }

    writer.abort();
    info!("Bridge session closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shim_injected_before_head_end() {
        let page = "<html><head><title>x</title></head><body></body></html>";
        assert_eq!(
            inject_shim(page),
            "<html><head><title>x</title><script src=\"/native.js\"></script></head><body></body></html>"
        );
    }

    #[test]
    fn test_shim_prepended_without_head() {
        assert_eq!(inject_shim("<p>hi</p>"), "<script src=\"/native.js\"></script><p>hi</p>");
    }

    fn upgrade_headers(origin: Option<&str>, host: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, host.parse().unwrap());
        if let Some(origin) = origin {
            headers.insert(ORIGIN, origin.parse().unwrap());
        }
        headers
    }

    #[test]
    fn test_own_origin_accepted() {
        assert!(is_own_origin(&upgrade_headers(None, "127.0.0.1:18090")));
        assert!(is_own_origin(&upgrade_headers(
            Some("http://127.0.0.1:18090"),
            "127.0.0.1:18090"
        )));
        assert!(is_own_origin(&upgrade_headers(
            Some("http://LOCALHOST:18090"),
            "localhost:18090"
        )));
        assert!(is_own_origin(&upgrade_headers(Some("http://[::1]:18090"), "[::1]:18090")));
    }

    #[test]
    fn test_foreign_origin_refused() {
        let host = "127.0.0.1:18090";
        for origin in [
            "https://evil.example",
            "http://evil.example",
            "http://127.0.0.1:8080",
            "https://127.0.0.1:18090",
            "null",
            "file://",
        ] {
            assert!(!is_own_origin(&upgrade_headers(Some(origin), host)), "{}", origin);
        }
    }

    #[test]
    fn test_rebound_name_refused() {
        assert!(!is_own_origin(&upgrade_headers(
            Some("http://evil.example:18090"),
            "evil.example:18090"
        )));
    }

    #[test]
    fn test_origin_without_host_refused() {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, "http://127.0.0.1:18090".parse().unwrap());
        assert!(!is_own_origin(&headers));
    }

    #[test]
    fn test_shim_defines_invoke() {
        assert!(NATIVE_JS.contains("window.native"));
        assert!(NATIVE_JS.contains("invoke"));
        assert!(NATIVE_JS.contains("/bridge"));
    }
}
