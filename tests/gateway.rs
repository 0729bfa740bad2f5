//! End-to-end tests: boot the gateway on an ephemeral port and talk to it
//! over real WebSocket and HTTP connections.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use notifier_gateway::app_state::AppState;
use notifier_gateway::directory::{DeviceDirectory, MemoryDirectory};
use notifier_gateway::domain::{
    Channel, ChannelKind, ChannelSubscription, DeviceRecord, ExpectedVersion, MailBus,
};
use notifier_gateway::error::DirectoryError;
use notifier_gateway::mail::MailWatchHub;
use notifier_gateway::server::{self, BackgroundTasks};
use notifier_gateway::session::ConnectionRegistry;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    _tasks: BackgroundTasks,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(Duration::from_secs(5), Duration::from_secs(60)).await
    }

    async fn start_with(handshake_timeout: Duration, sweep_interval: Duration) -> Self {
        Self::start_on(Arc::new(seeded_directory()), handshake_timeout, sweep_interval).await
    }

    async fn start_on(
        directory: Arc<dyn DeviceDirectory>,
        handshake_timeout: Duration,
        sweep_interval: Duration,
    ) -> Self {
        let mail_watch = Arc::new(MailWatchHub::new(MailBus::new(64)));
        let registry = Arc::new(ConnectionRegistry::new());
        let state = AppState::new(
            Arc::clone(&registry),
            directory,
            mail_watch,
            handshake_timeout,
        );
        let tasks = BackgroundTasks::spawn(&state, sweep_interval);

        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        let app = server::build_app(state);
        tokio::spawn(server::serve(listener, app));

        Self {
            addr,
            registry,
            _tasks: tasks,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn connect(&self) -> Socket {
        let Ok((socket, _)) = connect_async(format!("ws://{}/ws", self.addr)).await else {
            panic!("websocket connect failed");
        };
        socket
    }

    /// Connects and completes a handshake, returning the session id.
    async fn connect_as(&self, callsign: &str) -> (Socket, String) {
        let mut socket = self.connect().await;
        send(&mut socket, &format!("HELLO {callsign}")).await;
        let welcome = recv_text(&mut socket).await;
        let Some(id) = welcome.strip_prefix("WELCOME ") else {
            panic!("expected WELCOME, got {welcome}");
        };
        (socket, id.to_string())
    }

    async fn wait_for_sessions(&self, expected: usize) {
        for _ in 0..100 {
            if self.registry.len().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} sessions, have {}",
            self.registry.len().await
        );
    }
}

fn seeded_directory() -> MemoryDirectory {
    let directory = MemoryDirectory::new();

    let mut alpha = DeviceRecord::new("ALPHA");
    alpha.channels = vec![
        ChannelSubscription::new("ops"),
        ChannelSubscription::new("alerts"),
    ];
    directory.insert_device(alpha);

    let mut bravo = DeviceRecord::new("BRAVO");
    bravo.channels = vec![ChannelSubscription::new("dev")];
    directory.insert_device(bravo);

    let mut pinned = DeviceRecord::new("PINNED");
    pinned.expected_version = ExpectedVersion::Version("fw-2".to_string());
    directory.insert_device(pinned);

    for (id, email, commands) in [
        ("ops", "ops@example.com", vec!["LED 1 ON 2000"]),
        ("alerts", "alerts@example.com", vec!["BEEP 1 1 440 100"]),
        ("dev", "dev@example.com", vec!["LED 1 ON 500"]),
    ] {
        directory.insert_channel(Channel {
            id: id.to_string(),
            name: id.to_string(),
            kind: ChannelKind::Gmail,
            email: email.to_string(),
            commands: commands.into_iter().map(str::to_string).collect(),
        });
    }
    directory
}

/// Directory whose `lookup` never completes for one callsign.
#[derive(Debug)]
struct StallingDirectory {
    inner: MemoryDirectory,
    stalls_on: &'static str,
}

#[async_trait]
impl DeviceDirectory for StallingDirectory {
    async fn lookup(&self, callsign: &str) -> Result<Option<DeviceRecord>, DirectoryError> {
        if callsign == self.stalls_on {
            std::future::pending::<()>().await;
        }
        self.inner.lookup(callsign).await
    }

    async fn channel(&self, channel_id: &str) -> Result<Option<Channel>, DirectoryError> {
        self.inner.channel(channel_id).await
    }

    async fn record_checkin(
        &self,
        callsign: &str,
        firmware: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        self.inner.record_checkin(callsign, firmware, at).await
    }

    async fn record_interaction(
        &self,
        callsign: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        self.inner.record_interaction(callsign, at).await
    }
}

async fn send(socket: &mut Socket, line: &str) {
    let Ok(()) = socket.send(Message::text(line.to_string())).await else {
        panic!("send failed");
    };
}

/// Next text frame, skipping pings.
async fn recv_text(socket: &mut Socket) -> String {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), socket.next()).await;
        match next {
            Ok(Some(Ok(Message::Text(text)))) => return text.as_str().to_string(),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Asserts the server closes the socket next.
async fn expect_close(socket: &mut Socket) {
    let next = tokio::time::timeout(Duration::from_secs(5), socket.next()).await;
    match next {
        Ok(Some(Ok(Message::Close(_))) | None | Some(Err(_))) => {}
        other => panic!("expected close, got {other:?}"),
    }
}

/// Asserts nothing arrives for a short while.
async fn expect_silence(socket: &mut Socket) {
    let next = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(next.is_err(), "unexpected frame: {next:?}");
}

fn push_body(mailbox: &str, history_id: u64) -> serde_json::Value {
    let data = STANDARD.encode(format!(
        r#"{{"emailAddress":"{mailbox}","historyId":"{history_id}"}}"#
    ));
    serde_json::json!({
        "message": { "data": data, "messageId": "1" },
        "subscription": "projects/test/subscriptions/mail",
    })
}

#[tokio::test]
async fn unknown_callsign_is_rejected_and_unregistered() {
    let server = TestServer::start().await;
    let mut socket = server.connect().await;
    server.wait_for_sessions(1).await;

    send(&mut socket, "HELLO NOBODY").await;
    assert_eq!(recv_text(&mut socket).await, "ERROR device not known");
    expect_close(&mut socket).await;
    server.wait_for_sessions(0).await;
}

#[tokio::test]
async fn firmware_mismatch_gets_ota() {
    let server = TestServer::start().await;
    let mut socket = server.connect().await;
    send(&mut socket, "HELLO PINNED fw-1").await;
    assert_eq!(recv_text(&mut socket).await, "OTA fw-2");
    expect_close(&mut socket).await;

    let (_socket, _id) = server.connect_as("PINNED fw-2").await;
    server.wait_for_sessions(1).await;
}

#[tokio::test]
async fn known_device_is_welcomed_and_listed() {
    let server = TestServer::start().await;
    let (_a, id_a) = server.connect_as("ALPHA").await;
    let (_b, _id_b) = server.connect_as("BRAVO").await;
    server.wait_for_sessions(2).await;

    let Ok(resp) = reqwest::get(server.url("/api/v1/devices/connected")).await else {
        panic!("request failed");
    };
    assert_eq!(resp.status(), 200);
    let Ok(body) = resp.json::<serde_json::Value>().await else {
        panic!("invalid json");
    };
    assert_eq!(body["count"], 2);
    let sessions = body["sessions"].as_array().cloned().unwrap_or_default();
    assert!(
        sessions
            .iter()
            .any(|s| s["id"] == id_a.as_str() && s["callsign"] == "ALPHA")
    );
}

#[tokio::test]
async fn handshake_timeout_closes_socket() {
    let server = TestServer::start_with(Duration::from_millis(200), Duration::from_secs(60)).await;
    let mut socket = server.connect().await;
    assert_eq!(recv_text(&mut socket).await, "ERROR No handshake");
    expect_close(&mut socket).await;
    server.wait_for_sessions(0).await;
}

#[tokio::test]
async fn unknown_verbs_are_ignored() {
    let server = TestServer::start().await;
    let (mut socket, _) = server.connect_as("ALPHA").await;
    send(&mut socket, "DANCE wildly").await;
    send(&mut socket, "BUTTON 1").await;
    expect_silence(&mut socket).await;
    assert_eq!(server.registry.len().await, 1);
}

#[tokio::test]
async fn test_endpoint_targets_callsign() {
    let server = TestServer::start().await;
    let (mut alpha, _) = server.connect_as("ALPHA").await;
    let (mut bravo, _) = server.connect_as("BRAVO").await;

    let client = reqwest::Client::new();
    let Ok(resp) = client
        .post(server.url("/api/v1/devices/ALPHA/test"))
        .send()
        .await
    else {
        panic!("request failed");
    };
    assert_eq!(resp.status(), 200);

    assert_eq!(
        recv_text(&mut alpha).await,
        "BEEP 1 2 262 200 294 200 330 200 349 200 392 200 440 200 494 200 523 400 0 400"
    );
    assert_eq!(recv_text(&mut alpha).await, "LED 1 ON 5000");
    expect_silence(&mut bravo).await;

    let Ok(resp) = client
        .post(server.url("/api/v1/devices/NOBODY/test"))
        .send()
        .await
    else {
        panic!("request failed");
    };
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn mail_push_fans_out_to_subscribed_devices() {
    let server = TestServer::start().await;
    let (mut alpha, _) = server.connect_as("ALPHA").await;
    let (mut bravo, _) = server.connect_as("BRAVO").await;

    let client = reqwest::Client::new();
    let Ok(resp) = client
        .post(server.url("/api/v1/mail/notify"))
        .json(&push_body("ops@example.com", 7))
        .send()
        .await
    else {
        panic!("request failed");
    };
    assert_eq!(resp.status(), 200);
    let Ok(body) = resp.json::<serde_json::Value>().await else {
        panic!("invalid json");
    };
    assert_eq!(body["outcome"], "published");

    assert_eq!(recv_text(&mut alpha).await, "LED 1 ON 2000");
    expect_silence(&mut bravo).await;

    // Same history id again is a duplicate.
    let Ok(resp) = client
        .post(server.url("/api/v1/mail/notify"))
        .json(&push_body("ops@example.com", 7))
        .send()
        .await
    else {
        panic!("request failed");
    };
    let Ok(body) = resp.json::<serde_json::Value>().await else {
        panic!("invalid json");
    };
    assert_eq!(body["outcome"], "stale");
    expect_silence(&mut alpha).await;
}

#[tokio::test]
async fn malformed_push_is_rejected() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let Ok(resp) = client
        .post(server.url("/api/v1/mail/notify"))
        .json(&serde_json::json!({ "message": { "data": "%%%" } }))
        .send()
        .await
    else {
        panic!("request failed");
    };
    assert_eq!(resp.status(), 400);
    let Ok(body) = resp.json::<serde_json::Value>().await else {
        panic!("invalid json");
    };
    assert_eq!(body["error"]["code"], 1002);
}

#[tokio::test]
async fn disconnect_all_closes_sessions() {
    let server = TestServer::start().await;
    let (mut alpha, _) = server.connect_as("ALPHA").await;
    let (mut bravo, _) = server.connect_as("BRAVO").await;
    server.wait_for_sessions(2).await;

    let client = reqwest::Client::new();
    let Ok(resp) = client
        .post(server.url("/api/v1/devices/disconnect-all"))
        .send()
        .await
    else {
        panic!("request failed");
    };
    let Ok(body) = resp.json::<serde_json::Value>().await else {
        panic!("invalid json");
    };
    assert_eq!(body["disconnected"], 2);
    expect_close(&mut alpha).await;
    expect_close(&mut bravo).await;
    server.wait_for_sessions(0).await;
}

#[tokio::test]
async fn silent_peer_is_swept() {
    let server = TestServer::start_with(Duration::from_secs(5), Duration::from_millis(200)).await;
    let (mut socket, _) = server.connect_as("ALPHA").await;
    server.wait_for_sessions(1).await;

    // Never reading means tungstenite never answers the ping.
    tokio::time::sleep(Duration::from_millis(700)).await;
    server.wait_for_sessions(0).await;
    let _ = socket.close(None).await;
}

#[tokio::test]
async fn health_and_keepalive() {
    let server = TestServer::start().await;
    let Ok(resp) = reqwest::get(server.url("/api/keepalive")).await else {
        panic!("request failed");
    };
    assert_eq!(resp.status(), 200);
    let Ok(body) = resp.json::<serde_json::Value>().await else {
        panic!("invalid json");
    };
    assert_eq!(body["status"], "ok");

    let Ok(resp) = reqwest::get(server.url("/health")).await else {
        panic!("request failed");
    };
    let Ok(body) = resp.json::<serde_json::Value>().await else {
        panic!("invalid json");
    };
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn slow_lookup_does_not_block_outbound_frames() {
    let directory = StallingDirectory {
        inner: seeded_directory(),
        stalls_on: "ALPHA",
    };
    let server =
        TestServer::start_on(Arc::new(directory), Duration::from_secs(5), Duration::from_secs(60))
            .await;
    let mut socket = server.connect().await;
    server.wait_for_sessions(1).await;
    send(&mut socket, "HELLO ALPHA").await;
    expect_silence(&mut socket).await;

    // The handshake is still waiting on the directory; the close queued by
    // a reset must reach the device anyway.
    assert_eq!(server.registry.reset().await, 1);
    expect_close(&mut socket).await;
    server.wait_for_sessions(0).await;
}
