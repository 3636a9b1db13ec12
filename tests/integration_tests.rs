//! Integration tests for daemon-client IPC communication.
//!
//! These tests run a real coordinator behind a real Unix socket and talk to
//! it with the CLI client and with raw newline-delimited JSON:
//! - request/response round trips
//! - error responses for unknown actions and malformed lines
//! - `subscribe` push streams
//! - connection error handling

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use focusdot::cli::IpcClient;
use focusdot::daemon::{Coordinator, CoordinatorHandle, CoordinatorOptions, IpcServer, SystemClock};
use focusdot::notification::MockNotifier;
use focusdot::storage::MemoryStore;
use focusdot::sync::MockRemoteStore;
use focusdot::types::{IpcResponse, PushMessage, SessionKind, SettingsPatch, TimerPhase};

// ============================================================================
// Test Helpers
// ============================================================================

/// Creates a temporary socket path for testing.
fn create_temp_socket_path() -> PathBuf {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("integration_test.sock");
    // Keep the directory so it's not deleted
    std::mem::forget(dir);
    path
}

struct Daemon {
    socket_path: PathBuf,
    handle: CoordinatorHandle,
    server: JoinHandle<()>,
    coordinator: JoinHandle<()>,
}

impl Daemon {
    /// Starts a coordinator and an IPC server on a fresh socket.
    fn start() -> Self {
        let socket_path = create_temp_socket_path();
        let (coordinator, handle) = Coordinator::<MockRemoteStore>::new(
            Box::new(MemoryStore::new()),
            None,
            Arc::new(MockNotifier::new()),
            Arc::new(SystemClock),
            CoordinatorOptions::default(),
        );
        let coordinator = tokio::spawn(coordinator.run());

        let server = IpcServer::new(&socket_path).unwrap();
        let server_handle = handle.clone();
        let server = tokio::spawn(async move {
            let _ = server.serve(server_handle).await;
        });

        Self {
            socket_path,
            handle,
            server,
            coordinator,
        }
    }

    fn client(&self) -> IpcClient {
        IpcClient::new(self.socket_path.clone())
    }

    async fn raw(&self) -> (BufReader<tokio::net::unix::OwnedReadHalf>, tokio::net::unix::OwnedWriteHalf) {
        let stream = UnixStream::connect(&self.socket_path).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        (BufReader::new(read_half), write_half)
    }

    async fn stop(self) {
        self.server.abort();
        self.handle.shutdown();
        timeout(Duration::from_secs(2), self.coordinator)
            .await
            .unwrap()
            .unwrap();
    }
}

async fn read_line(reader: &mut BufReader<tokio::net::unix::OwnedReadHalf>) -> String {
    let mut line = String::new();
    timeout(Duration::from_secs(2), reader.read_line(&mut line))
        .await
        .expect("no line received in time")
        .unwrap();
    line
}

// ============================================================================
// Request / Response
// ============================================================================

#[tokio::test]
async fn test_get_state_via_client() {
    let daemon = Daemon::start();

    let response = daemon.client().get_state().await.unwrap();

    assert_eq!(response.status, "success");
    let snapshot = response.data.unwrap();
    assert_eq!(snapshot.kind, SessionKind::Focus);
    assert_eq!(snapshot.phase, TimerPhase::Idle);
    assert_eq!(snapshot.remaining_seconds, 25 * 60);
    assert!(!snapshot.authenticated);

    daemon.stop().await;
}

#[tokio::test]
async fn test_start_pause_reset_via_client() {
    let daemon = Daemon::start();
    let client = daemon.client();

    let started = client.start().await.unwrap();
    assert_eq!(started.message, "Timer started");
    assert_eq!(started.data.unwrap().phase, TimerPhase::Running);

    let paused = client.pause().await.unwrap();
    assert_eq!(paused.message, "Timer paused");
    assert_eq!(paused.data.unwrap().phase, TimerPhase::Paused);

    let reset = client.reset().await.unwrap();
    assert_eq!(reset.message, "Timer reset");
    let snapshot = reset.data.unwrap();
    assert_eq!(snapshot.phase, TimerPhase::Idle);
    assert_eq!(snapshot.remaining_seconds, 25 * 60);

    daemon.stop().await;
}

#[tokio::test]
async fn test_update_settings_and_skip_via_client() {
    let daemon = Daemon::start();
    let client = daemon.client();

    let updated = client
        .update_settings(SettingsPatch {
            short_break_minutes: Some(7),
            auto_start_breaks: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.data.unwrap().settings.short_break_minutes, 7);

    let skipped = client.skip().await.unwrap();
    let snapshot = skipped.data.unwrap();
    assert_eq!(snapshot.kind, SessionKind::ShortBreak);
    assert_eq!(snapshot.phase, TimerPhase::Idle);
    assert_eq!(snapshot.remaining_seconds, 7 * 60);

    daemon.stop().await;
}

#[tokio::test]
async fn test_several_requests_on_one_connection() {
    let daemon = Daemon::start();
    let (mut reader, mut writer) = daemon.raw().await;

    writer
        .write_all(b"{\"action\":\"start\"}\n{\"action\":\"getState\"}\n")
        .await
        .unwrap();

    let first: IpcResponse = serde_json::from_str(&read_line(&mut reader).await).unwrap();
    let second: IpcResponse = serde_json::from_str(&read_line(&mut reader).await).unwrap();
    assert_eq!(first.message, "Timer started");
    assert_eq!(second.message, "Current state");
    assert_eq!(second.data.unwrap().phase, TimerPhase::Running);

    daemon.stop().await;
}

// ============================================================================
// Error Responses
// ============================================================================

#[tokio::test]
async fn test_unknown_action_yields_error() {
    let daemon = Daemon::start();
    let (mut reader, mut writer) = daemon.raw().await;

    writer.write_all(b"{\"action\":\"explode\"}\n").await.unwrap();
    let response: IpcResponse = serde_json::from_str(&read_line(&mut reader).await).unwrap();

    assert_eq!(response.status, "error");
    assert_eq!(response.message, "Unknown action: explode");
    assert!(response.data.is_none());

    daemon.stop().await;
}

#[tokio::test]
async fn test_malformed_line_keeps_connection_usable() {
    let daemon = Daemon::start();
    let (mut reader, mut writer) = daemon.raw().await;

    writer.write_all(b"this is not json\n").await.unwrap();
    let error: IpcResponse = serde_json::from_str(&read_line(&mut reader).await).unwrap();
    assert_eq!(error.status, "error");
    assert!(error.message.starts_with("Invalid request"));

    writer.write_all(b"{\"action\":\"getState\"}\n").await.unwrap();
    let ok: IpcResponse = serde_json::from_str(&read_line(&mut reader).await).unwrap();
    assert!(ok.is_success());

    daemon.stop().await;
}

#[tokio::test]
async fn test_connection_error_without_daemon() {
    let socket_path = create_temp_socket_path();
    let client = IpcClient::new(socket_path);

    let result = client.get_state().await;

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Cannot connect"));
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn test_subscribe_receives_timer_updates() {
    let daemon = Daemon::start();
    let (mut reader, mut writer) = daemon.raw().await;

    writer.write_all(b"{\"action\":\"subscribe\"}\n").await.unwrap();
    let ack: IpcResponse = serde_json::from_str(&read_line(&mut reader).await).unwrap();
    assert!(ack.is_success());
    let initial = ack.data.unwrap();
    assert_eq!(initial.phase, TimerPhase::Idle);

    daemon.client().start().await.unwrap();

    let line = read_line(&mut reader).await;
    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["action"], "timerUpdate");

    let update = serde_json::from_value::<PushMessage>(value)
        .unwrap()
        .into_snapshot();
    assert_eq!(update.phase, TimerPhase::Running);
    assert!(update.timestamp > initial.timestamp);

    daemon.stop().await;
}

#[tokio::test]
async fn test_two_subscribers_see_the_same_update() {
    let daemon = Daemon::start();
    let client = daemon.client();
    let mut panel = client.subscribe().await.unwrap();
    let mut widget = client.subscribe().await.unwrap();

    let panel_initial = panel.next().await.unwrap().unwrap();
    let widget_initial = widget.next().await.unwrap().unwrap();
    assert_eq!(panel_initial.phase, widget_initial.phase);

    client.start().await.unwrap();

    let a = timeout(Duration::from_secs(2), panel.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let b = timeout(Duration::from_secs(2), widget.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(a.phase, TimerPhase::Running);
    assert_eq!(a.timestamp, b.timestamp);

    daemon.stop().await;
}
