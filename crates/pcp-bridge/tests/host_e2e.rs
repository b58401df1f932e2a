//! End-to-end tests for the host surface
//!
//! These tests serve the full router on a local port, drive it over HTTP
//! and the bridge WebSocket, and forward to a mock phone.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pcp_bridge::{
    create_router, FixedConfirmer, HostState, MessageBridge, RequestLogger, Verbosity,
    MISSING_INDEX_PAGE,
};
use pcp_client::testing::MockDevice;
use pcp_client::{ClientFactory, ClientHandle, Forwarder, DIAL_ENDPOINT};
use pcp_core::{ReplyMessage, LOG_STREAM_TAG};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

type Socket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// =============================================================================
// Fixture
// =============================================================================

struct Host {
    addr: SocketAddr,
    dir: TempDir,
    clients: Arc<ClientHandle>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Host {
    async fn start() -> Self {
        Self::start_with_index(None).await
    }

    async fn start_with_index(index: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let content_root = dir.path().join("wwwroot");
        std::fs::create_dir_all(&content_root).unwrap();
        if let Some(index) = index {
            std::fs::write(content_root.join("index.html"), index).unwrap();
        }
        std::fs::write(content_root.join("app.js"), "console.log('app');").unwrap();

        let verbosity = Verbosity::default();
        let logger = Arc::new(RequestLogger::new(
            dir.path().join("logs").join("pcp-log.txt"),
            verbosity.clone(),
        ));
        let clients = Arc::new(ClientHandle::new(ClientFactory::new()).unwrap());
        let forwarder = Forwarder::new(clients.clone(), logger.clone());
        let bridge = MessageBridge::new(forwarder, Arc::new(FixedConfirmer(true)), verbosity);
        let router = create_router(HostState::new(bridge, logger.stream(), content_root));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            addr,
            dir,
            clients,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("logs").join("pcp-log.txt")
    }

    async fn connect(&self) -> Socket {
        let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/bridge", self.addr))
            .await
            .unwrap();
        socket
    }

    async fn connect_from(&self, origin: &str) -> Result<Socket, WsError> {
        let mut request = format!("ws://{}/bridge", self.addr)
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert("origin", HeaderValue::from_str(origin).unwrap());
        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(socket)
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn send(socket: &mut Socket, message: Value) {
    socket.send(Message::text(message.to_string())).await.unwrap();
}

async fn recv(socket: &mut Socket) -> ReplyMessage {
    let frame = tokio::time::timeout(Duration::from_secs(10), socket.next())
        .await
        .expect("reply timed out")
        .expect("socket closed")
        .unwrap();
    serde_json::from_str(frame.to_text().unwrap()).unwrap()
}

// =============================================================================
// HTTP surface
// =============================================================================

#[tokio::test]
async fn test_health() {
    let host = Host::start().await;
    let body = reqwest::get(host.url("/health")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_native_js() {
    let host = Host::start().await;
    let response = reqwest::get(host.url("/native.js")).await.unwrap();
    assert_eq!(response.headers()["content-type"], "application/javascript");
    assert!(response.text().await.unwrap().contains("window.native"));
}

#[tokio::test]
async fn test_missing_index_page() {
    let host = Host::start().await;
    let body = reqwest::get(host.url("/")).await.unwrap().text().await.unwrap();
    assert_eq!(body, MISSING_INDEX_PAGE);
}

#[tokio::test]
async fn test_index_loads_shim() {
    let host = Host::start_with_index(Some("<html><head></head><body>ui</body></html>")).await;
    let body = reqwest::get(host.url("/")).await.unwrap().text().await.unwrap();
    assert_eq!(
        body,
        "<html><head><script src=\"/native.js\"></script></head><body>ui</body></html>"
    );
}

#[tokio::test]
async fn test_static_content() {
    let host = Host::start().await;
    let response = reqwest::get(host.url("/app.js")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "console.log('app');");

    let missing = reqwest::get(host.url("/nope.css")).await.unwrap();
    assert_eq!(missing.status(), 404);
}

// =============================================================================
// Bridge WebSocket
// =============================================================================

#[tokio::test]
async fn test_foreign_origin_cannot_open_bridge() {
    let host = Host::start().await;
    let device = MockDevice::start().await.unwrap();

    let err = host.connect_from("https://evil.example").await.err().expect("upgrade accepted");
    match err {
        WsError::Http(response) => assert_eq!(response.status(), 403),
        other => panic!("unexpected handshake error: {}", other),
    }
    assert!(device.requests().is_empty());
}

#[tokio::test]
async fn test_served_page_origin_opens_bridge() {
    let host = Host::start().await;
    let mut socket = host
        .connect_from(&format!("http://{}", host.addr))
        .await
        .unwrap();

    send(&mut socket, json!({"id": "o1", "kind": "setVerbose", "payload": {"value": false}})).await;

    assert_eq!(
        recv(&mut socket).await,
        ReplyMessage::data("o1", json!({"ok": true, "verbose": false}))
    );
}

#[tokio::test]
async fn test_unknown_kind_over_socket() {
    let host = Host::start().await;
    let mut socket = host.connect().await;

    send(&mut socket, json!({"id": "x9", "kind": "frobnicate", "payload": {}})).await;

    assert_eq!(recv(&mut socket).await, ReplyMessage::error("x9", "Unknown kind: frobnicate"));
}

#[tokio::test]
async fn test_undecodable_frame_over_socket() {
    let host = Host::start().await;
    let mut socket = host.connect().await;

    socket.send(Message::text("{not json")).await.unwrap();

    let reply = recv(&mut socket).await;
    assert!(reply.is_error());
    assert_eq!(reply.reply_to(), "");
}

#[tokio::test]
async fn test_api_fetch_over_socket() {
    let host = Host::start().await;
    let device = MockDevice::start().await.unwrap();
    let mut socket = host.connect().await;

    send(
        &mut socket,
        json!({
            "id": "f1",
            "kind": "apiFetch",
            "payload": {"path": device.url("/api/v1/mgmt/device/info"), "user": "Polycom", "pass": "456"}
        }),
    )
    .await;

    let ReplyMessage::Data { reply_to, data } = recv(&mut socket).await else {
        panic!("expected data reply");
    };
    assert_eq!(reply_to, "f1");
    assert_eq!(data["ok"], true);
    assert_eq!(data["status"], 200);
    assert_eq!(data["request"]["headers"], "authorization: Basic UG9seWNvbTo0NTY=\r\n");
    assert_eq!(device.requests().len(), 1);

    let log = std::fs::read_to_string(host.log_path()).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("\"status\":200"));
}

#[tokio::test]
async fn test_verbose_streams_log_events() {
    let host = Host::start().await;
    let device = MockDevice::start_with_dial_failures(1).await.unwrap();
    let mut socket = host.connect().await;

    send(&mut socket, json!({"id": "v1", "kind": "setVerbose", "payload": {"value": true}})).await;
    assert_eq!(
        recv(&mut socket).await,
        ReplyMessage::data("v1", json!({"ok": true, "verbose": true}))
    );

    send(
        &mut socket,
        json!({
            "id": "f2",
            "kind": "apiFetch",
            "payload": {"baseUrl": "https://unused.invalid", "path": device.url(DIAL_ENDPOINT), "method": "POST", "body": "{}"}
        }),
    )
    .await;

    let mut reply = None;
    let mut event = None;
    for _ in 0..2 {
        let message = recv(&mut socket).await;
        if message.is_log() {
            event = Some(message);
        } else {
            reply = Some(message);
        }
    }

    let ReplyMessage::Data { data: result, .. } = reply.expect("no reply") else {
        panic!("expected data reply");
    };
    let ReplyMessage::Data { reply_to, data: record } = event.expect("no log event") else {
        panic!("expected log event");
    };
    assert_eq!(reply_to, LOG_STREAM_TAG);
    assert_eq!(record, result);
    assert_eq!(result["status"], 200);
    assert_eq!(device.requests().len(), 2);
}

#[tokio::test]
async fn test_set_tls_insecure_over_socket() {
    let host = Host::start().await;
    let mut socket = host.connect().await;

    send(&mut socket, json!({"id": "t1", "kind": "setTlsInsecure", "payload": {"value": false}})).await;

    assert_eq!(
        recv(&mut socket).await,
        ReplyMessage::data("t1", json!({"ok": true, "tlsInsecure": true}))
    );
    assert_eq!(host.clients.generation(), 2);
}

#[tokio::test]
async fn test_concurrent_commands_each_get_one_reply() {
    let host = Host::start().await;
    let device = MockDevice::start().await.unwrap();
    let mut socket = host.connect().await;

    for i in 0..5 {
        send(
            &mut socket,
            json!({"id": format!("c{}", i), "kind": "apiFetch", "payload": {"path": device.url("/x")}}),
        )
        .await;
    }
    send(&mut socket, json!({"id": "r1", "kind": "confirmReboot", "payload": null})).await;

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(recv(&mut socket).await.reply_to().to_string());
    }
    ids.sort();
    assert_eq!(ids, vec!["c0", "c1", "c2", "c3", "c4", "r1"]);
}
