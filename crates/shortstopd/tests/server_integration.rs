//! Integration tests for the Unix socket server.
//!
//! These tests run a complete daemon (server, aggregator, in-memory store
//! and broadcast surface) and talk to it the way the browser bridge does:
//! NDJSON lines over the socket.
//!
//! Tests use `.unwrap()` freely; production code is checked through
//! assertions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shortstop_core::SystemClock;
use shortstop_protocol::{ClientMessage, DaemonMessage, MessageType, PageSignal, ProtocolVersion};
use shortstopd::aggregator::{event_channel, spawn_aggregator};
use shortstopd::client::{ClientError, DaemonClient};
use shortstopd::config::ClassifierConfig;
use shortstopd::server::{DaemonServer, PageContext};
use shortstopd::store::MemoryStore;
use shortstopd::surface::BroadcastSurface;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for server socket to appear
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between socket existence checks
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period for server shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Upper bound on waiting for any one message
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Dwell threshold used by test pages, short enough to wait out
const TEST_DWELL_MS: u64 = 50;

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle and cleanup.
struct TestServer {
    socket_path: PathBuf,
    cancel_token: CancellationToken,
    _temp_dir: TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let socket_path = temp_dir.path().join("test.sock");

        let clock = Arc::new(SystemClock);
        let events = event_channel();
        let surface = Arc::new(BroadcastSurface::new(events.clone(), true));
        let aggregator = spawn_aggregator(
            Arc::new(MemoryStore::new()),
            surface,
            clock.clone(),
            events,
        );
        let page = PageContext {
            classifier: ClassifierConfig {
                dwell_ms: TEST_DWELL_MS,
                tick_ms: 1000,
                discovery_retry_ms: 10,
            },
            clock,
        };
        let cancel_token = CancellationToken::new();
        let server = DaemonServer::new(socket_path.clone(), aggregator, page, cancel_token.clone());

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let start = tokio::time::Instant::now();
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if socket_path.exists() {
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }
        assert!(
            socket_path.exists(),
            "Server socket did not appear within {SOCKET_WAIT_TIMEOUT:?}"
        );

        TestServer {
            socket_path,
            cancel_token,
            _temp_dir: temp_dir,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    /// A connected client that has completed the handshake.
    async fn connect_ready(&self) -> TestClient {
        let mut client = self.connect().await;
        match client.handshake(ProtocolVersion::CURRENT).await {
            DaemonMessage::Connected { .. } => client,
            other => panic!("Expected Connected, got {other:?}"),
        }
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

/// Raw NDJSON client, the way a bridge talks to the daemon.
struct TestClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send(&mut self, msg: ClientMessage) {
        let json = serde_json::to_string(&msg).unwrap();
        self.send_raw(&json).await;
    }

    async fn recv(&mut self) -> DaemonMessage {
        let mut line = String::new();
        timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for daemon")
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn request(&mut self, msg: MessageType) -> DaemonMessage {
        self.send(ClientMessage::new(msg)).await;
        self.recv().await
    }

    async fn handshake(&mut self, version: ProtocolVersion) -> DaemonMessage {
        let mut msg = ClientMessage::connect(None);
        msg.protocol_version = version;
        self.send(msg).await;
        self.recv().await
    }

    /// Reads until a message matching `pred` arrives.
    async fn recv_until(&mut self, pred: impl Fn(&DaemonMessage) -> bool) -> DaemonMessage {
        loop {
            let msg = self.recv().await;
            if pred(&msg) {
                return msg;
            }
        }
    }

    async fn today_watched(&mut self) -> u64 {
        match self.request(MessageType::GetToday).await {
            DaemonMessage::Today { summary } => summary.watched,
            other => panic!("Expected Today, got {other:?}"),
        }
    }
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_handshake_assigns_client_id() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    match client.handshake(ProtocolVersion::CURRENT).await {
        DaemonMessage::Connected {
            client_id,
            protocol_version,
        } => {
            assert!(client_id.starts_with("client-"));
            assert_eq!(protocol_version, ProtocolVersion::CURRENT);
        }
        other => panic!("Expected Connected, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    match client.handshake(ProtocolVersion::new(99, 0)).await {
        DaemonMessage::Rejected { reason, .. } => {
            assert!(
                reason.contains("not compatible"),
                "Expected 'not compatible' in reason, got: {reason}"
            );
        }
        other => panic!("Expected Rejected, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_message_before_connect_is_refused() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client
        .send(ClientMessage::shorts_viewed("/shorts/a"))
        .await;
    assert!(matches!(client.recv().await, DaemonMessage::Error { .. }));

    server.shutdown().await;
}

// ============================================================================
// Extension Message Tests
// ============================================================================

#[tokio::test]
async fn test_shorts_viewed_then_get_today() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready().await;

    client.send(ClientMessage::shorts_viewed("/shorts/a")).await;
    assert_eq!(client.recv().await, DaemonMessage::Ack);
    client.send(ClientMessage::shorts_viewed("/shorts/b")).await;
    assert_eq!(client.recv().await, DaemonMessage::Ack);
    client.send(ClientMessage::shorts_skipped("/shorts/c")).await;
    assert_eq!(client.recv().await, DaemonMessage::Ack);

    match client.request(MessageType::GetToday).await {
        DaemonMessage::Today { summary } => {
            assert_eq!(summary.watched, 2);
            assert_eq!(summary.skipped, 1);
        }
        other => panic!("Expected Today, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_bridge_shaped_json_is_accepted() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready().await;

    // No protocol_version field, exactly as a minimal bridge sends it
    client
        .send_raw(r#"{"type":"UPDATE_WATCH_TIME","seconds":7}"#)
        .await;
    assert_eq!(client.recv().await, DaemonMessage::Ack);

    match client.request(MessageType::GetSessionTime).await {
        DaemonMessage::SessionTime { session_time } => assert_eq!(session_time, 7),
        other => panic!("Expected SessionTime, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_parse_error_keeps_connection_open() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready().await;

    client.send_raw("{not json").await;
    match client.recv().await {
        DaemonMessage::Error { code, .. } => assert_eq!(code.as_deref(), Some("parse_error")),
        other => panic!("Expected Error, got {other:?}"),
    }

    assert_eq!(
        client.request(MessageType::Ping { seq: 9 }).await,
        DaemonMessage::Pong { seq: 9 }
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_reset_recent_stats_reports_removed_entries() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready().await;

    client.send(ClientMessage::shorts_viewed("/shorts/a")).await;
    assert_eq!(client.recv().await, DaemonMessage::Ack);

    match client.request(MessageType::ResetRecentStats).await {
        DaemonMessage::Reset { removed } => assert!(removed > 0),
        other => panic!("Expected Reset, got {other:?}"),
    }
    assert_eq!(
        client.request(MessageType::ResetRecentStats).await,
        DaemonMessage::Reset { removed: 0 }
    );
    assert_eq!(client.today_watched().await, 0);

    server.shutdown().await;
}

// ============================================================================
// Page Signal Tests
// ============================================================================

#[tokio::test]
async fn test_page_signals_are_classified() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready().await;

    client
        .send(ClientMessage::page_signal(PageSignal::UrlChanged {
            path: "/shorts/a".to_string(),
        }))
        .await;
    sleep(Duration::from_millis(TEST_DWELL_MS * 4)).await;
    client
        .send(ClientMessage::page_signal(PageSignal::UrlChanged {
            path: "/shorts/b".to_string(),
        }))
        .await;
    // Leave before the dwell threshold
    client
        .send(ClientMessage::page_signal(PageSignal::UrlChanged {
            path: "/".to_string(),
        }))
        .await;
    sleep(Duration::from_millis(TEST_DWELL_MS)).await;

    // Page signals get no reply, so the first line back answers GET_TODAY
    match client.request(MessageType::GetToday).await {
        DaemonMessage::Today { summary } => {
            assert_eq!(summary.watched, 1);
            assert_eq!(summary.skipped, 1);
        }
        other => panic!("Expected Today, got {other:?}"),
    }

    match client.request(MessageType::GetWeekly).await {
        DaemonMessage::Weekly { series } => {
            assert_eq!(series.sessions_by_hour.iter().sum::<u32>(), 1);
        }
        other => panic!("Expected Weekly, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_finalizes_open_page() {
    let server = TestServer::spawn().await;

    let mut page = server.connect_ready().await;
    page.send(ClientMessage::page_signal(PageSignal::UrlChanged {
        path: "/shorts/a".to_string(),
    }))
    .await;
    sleep(Duration::from_millis(TEST_DWELL_MS * 4)).await;
    drop(page);
    sleep(Duration::from_millis(100)).await;

    let mut client = server.connect_ready().await;
    match client.request(MessageType::GetWeekly).await {
        DaemonMessage::Weekly { series } => {
            assert_eq!(series.sessions_by_hour.iter().sum::<u32>(), 1);
            assert_eq!(series.watched.last().copied(), Some(1));
        }
        other => panic!("Expected Weekly, got {other:?}"),
    }

    server.shutdown().await;
}

// ============================================================================
// Subscription Tests
// ============================================================================

#[tokio::test]
async fn test_subscriber_receives_badge_updates() {
    let server = TestServer::spawn().await;

    let mut watcher = server.connect_ready().await;
    match watcher.request(MessageType::Subscribe).await {
        DaemonMessage::Today { summary } => assert_eq!(summary.watched, 0),
        other => panic!("Expected Today, got {other:?}"),
    }

    let mut bridge = server.connect_ready().await;
    bridge.send(ClientMessage::shorts_viewed("/shorts/a")).await;
    assert_eq!(bridge.recv().await, DaemonMessage::Ack);

    let badge = watcher
        .recv_until(|m| matches!(m, DaemonMessage::Badge { text } if !text.is_empty()))
        .await;
    assert_eq!(
        badge,
        DaemonMessage::Badge {
            text: "1".to_string()
        }
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_subscriber_receives_intervention_surfaces() {
    let server = TestServer::spawn().await;

    let mut watcher = server.connect_ready().await;
    assert!(matches!(
        watcher.request(MessageType::Subscribe).await,
        DaemonMessage::Today { .. }
    ));

    let mut control = server.connect_ready().await;
    assert!(matches!(
        control.request(MessageType::TestNotification).await,
        DaemonMessage::Ack
    ));

    let notify = watcher
        .recv_until(|m| matches!(m, DaemonMessage::Notify { .. }))
        .await;
    assert!(matches!(notify, DaemonMessage::Notify { title, .. } if !title.is_empty()));
    let popup = watcher
        .recv_until(|m| matches!(m, DaemonMessage::OpenPopup))
        .await;
    assert_eq!(popup, DaemonMessage::OpenPopup);

    server.shutdown().await;
}

// ============================================================================
// Client Library Tests
// ============================================================================

#[tokio::test]
async fn test_daemon_client_round_trip() {
    let server = TestServer::spawn().await;

    let mut client = DaemonClient::connect(&server.socket_path, Some("cli".to_string()))
        .await
        .unwrap();
    assert_eq!(client.client_id(), "cli");

    client
        .send(&ClientMessage::new(MessageType::StartShortsSession))
        .await
        .unwrap();
    assert_eq!(client.next_message().await.unwrap(), DaemonMessage::Ack);

    match client.request(MessageType::GetSettings).await.unwrap() {
        DaemonMessage::Settings { settings, rejected } => {
            assert!(!settings.redirect_enabled);
            assert!(rejected.is_empty());
        }
        other => panic!("Expected Settings, got {other:?}"),
    }

    let err = client
        .request(MessageType::Connect { client_id: None })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Daemon(_)));

    client.disconnect().await.unwrap();
    server.shutdown().await;
}
