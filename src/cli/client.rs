//! IPC Client for communicating with the FocusDot daemon.
//!
//! This module provides:
//! - Unix Domain Socket client
//! - Newline-delimited request/response handling
//! - Connection retry logic
//! - A subscription stream for `timerUpdate` pushes

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::daemon::SnapshotCache;
use crate::types::{Identity, IpcRequest, IpcResponse, PushMessage, SettingsPatch, Snapshot};

// ============================================================================
// Constants
// ============================================================================

/// Connection timeout in seconds
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Read/write timeout in seconds
const IO_TIMEOUT_SECS: u64 = 5;

/// Maximum connection attempts
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (base delay, multiplied by attempt number)
const RETRY_DELAY_MS: u64 = 500;

// ============================================================================
// IpcClient
// ============================================================================

/// IPC client for daemon communication.
pub struct IpcClient {
    /// Socket path
    socket_path: PathBuf,
    /// Connection timeout
    timeout: Duration,
}

impl IpcClient {
    /// Creates a new IPC client for the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn get_state(&self) -> Result<IpcResponse> {
        self.send_request(&IpcRequest::GetState).await
    }

    pub async fn start(&self) -> Result<IpcResponse> {
        self.send_request(&IpcRequest::Start).await
    }

    pub async fn pause(&self) -> Result<IpcResponse> {
        self.send_request(&IpcRequest::Pause).await
    }

    pub async fn reset(&self) -> Result<IpcResponse> {
        self.send_request(&IpcRequest::Reset).await
    }

    pub async fn skip(&self) -> Result<IpcResponse> {
        self.send_request(&IpcRequest::Skip).await
    }

    /// Sends a partial settings update.
    pub async fn update_settings(&self, data: SettingsPatch) -> Result<IpcResponse> {
        self.send_request(&IpcRequest::UpdateSettings { data }).await
    }

    /// Attaches an identity to the daemon.
    pub async fn sign_in(&self, identity: Identity) -> Result<IpcResponse> {
        self.send_request(&IpcRequest::SignIn { identity }).await
    }

    pub async fn sign_out(&self) -> Result<IpcResponse> {
        self.send_request(&IpcRequest::SignOut).await
    }

    /// Opens a subscription. The returned stream yields the initial
    /// snapshot first and then every pushed update.
    pub async fn subscribe(&self) -> Result<UpdateStream> {
        let stream = self.connect_with_retry().await?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_line(&mut writer, &IpcRequest::Subscribe).await?;
        let line = read_response_line(&mut reader).await?;
        let response: IpcResponse =
            serde_json::from_str(&line).context("Failed to parse subscribe response")?;
        if !response.is_success() {
            anyhow::bail!("{}", response.message);
        }
        let initial = response
            .data
            .context("Subscribe response carried no snapshot")?;

        Ok(UpdateStream {
            reader,
            _writer: writer,
            cache: SnapshotCache::new(),
            pending: Some(initial),
        })
    }

    /// Sends a request and reads one response line.
    ///
    /// An error response is turned into an `Err` carrying its message.
    async fn send_request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let stream = self.connect_with_retry().await?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_line(&mut writer, request).await?;
        let line = read_response_line(&mut reader).await?;

        let response: IpcResponse =
            serde_json::from_str(&line).context("Failed to parse daemon response")?;
        if !response.is_success() {
            anyhow::bail!("{}", response.message);
        }
        Ok(response)
    }

    /// Connects to the daemon, retrying only when the connection itself
    /// fails. Requests are never resent.
    async fn connect_with_retry(&self) -> Result<UnixStream> {
        let mut attempt = 1;
        loop {
            match self.connect().await {
                Ok(stream) => return Ok(stream),
                Err(e) if attempt >= MAX_RETRIES => return Err(e),
                Err(e) => {
                    tracing::debug!("Connection failed (attempt {}/{}): {:#}", attempt, MAX_RETRIES, e);
                    let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn connect(&self) -> Result<UnixStream> {
        timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timed out")?
            .with_context(|| {
                format!(
                    "Cannot connect to the daemon at {}. Start it with 'focusdot daemon'",
                    self.socket_path.display()
                )
            })
    }
}

async fn write_line<W>(writer: &mut W, request: &IpcRequest) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_vec(request).context("Failed to serialize request")?;
    json.push(b'\n');

    timeout(Duration::from_secs(IO_TIMEOUT_SECS), async {
        writer.write_all(&json).await?;
        writer.flush().await
    })
    .await
    .context("Write timed out")?
    .context("Failed to send request")?;
    Ok(())
}

async fn read_response_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<String> {
    let mut line = String::new();
    let n = timeout(Duration::from_secs(IO_TIMEOUT_SECS), reader.read_line(&mut line))
        .await
        .context("Read timed out")?
        .context("Failed to receive response")?;
    if n == 0 {
        anyhow::bail!("The daemon closed the connection without responding");
    }
    Ok(line)
}

// ============================================================================
// UpdateStream
// ============================================================================

/// Snapshots pushed over a subscribed connection.
///
/// Out-of-order snapshots are discarded by timestamp.
pub struct UpdateStream {
    reader: BufReader<OwnedReadHalf>,
    _writer: tokio::net::unix::OwnedWriteHalf,
    cache: SnapshotCache,
    pending: Option<Snapshot>,
}

impl UpdateStream {
    /// Waits for the next snapshot. Returns `None` when the daemon closes
    /// the connection.
    pub async fn next(&mut self) -> Result<Option<Snapshot>> {
        if let Some(initial) = self.pending.take() {
            self.cache.accept(initial.clone());
            return Ok(Some(initial));
        }

        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .await
                .context("Failed to read update")?;
            if n == 0 {
                return Ok(None);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let snapshot = match serde_json::from_str::<PushMessage>(trimmed) {
                Ok(push) => push.into_snapshot(),
                Err(e) => {
                    tracing::warn!("Ignoring unexpected message: {}", e);
                    continue;
                }
            };
            if self.cache.accept(snapshot.clone()) {
                return Ok(Some(snapshot));
            }
        }
    }

    /// Most recent snapshot seen on this stream.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.cache.latest()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Settings, TimerSession};
    use std::sync::Arc;
    use tokio::net::UnixListener;
    use tokio::sync::Mutex;

    // ------------------------------------------------------------------------
    // Helper functions
    // ------------------------------------------------------------------------

    fn create_temp_socket_path() -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        // Keep the directory so it's not deleted
        std::mem::forget(dir);
        path
    }

    fn snapshot(timestamp: i64) -> Snapshot {
        let mut snapshot = Snapshot::capture(
            &TimerSession::default(),
            &Settings::default(),
            chrono::DateTime::<chrono::Utc>::default(),
        );
        snapshot.timestamp = timestamp;
        snapshot
    }

    /// Accepts one connection, records the request line and answers with
    /// `response` as a single line.
    fn spawn_mock_server(
        socket_path: &Path,
        response: IpcResponse,
    ) -> (tokio::task::JoinHandle<()>, Arc<Mutex<Option<IpcRequest>>>) {
        let listener = UnixListener::bind(socket_path).unwrap();
        let received = Arc::new(Mutex::new(None));
        let received_clone = received.clone();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut writer) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            *received_clone.lock().await = Some(IpcRequest::parse(line.trim()).unwrap());

            let mut json = serde_json::to_vec(&response).unwrap();
            json.push(b'\n');
            writer.write_all(&json).await.unwrap();
        });

        (handle, received)
    }

    // ------------------------------------------------------------------------
    // IpcClient Tests
    // ------------------------------------------------------------------------

    mod client_tests {
        use super::*;

        #[test]
        fn test_socket_path() {
            let path = PathBuf::from("/tmp/test.sock");
            let client = IpcClient::new(path.clone());
            assert_eq!(client.socket_path(), path.as_path());
        }

        #[tokio::test]
        async fn test_connection_failure() {
            let socket_path = create_temp_socket_path();
            let client = IpcClient::new(socket_path);

            let result = client.get_state().await;
            assert!(result.is_err());
        }

        #[tokio::test]
        async fn test_get_state_request() {
            let socket_path = create_temp_socket_path();
            let (server, received) = spawn_mock_server(
                &socket_path,
                IpcResponse::success("Current state", Some(snapshot(1))),
            );

            let client = IpcClient::new(socket_path);
            let response = client.get_state().await.unwrap();

            assert!(response.is_success());
            assert_eq!(response.data.unwrap().remaining_seconds, 1500);
            assert_eq!(*received.lock().await, Some(IpcRequest::GetState));
            server.await.unwrap();
        }

        #[tokio::test]
        async fn test_update_settings_request() {
            let socket_path = create_temp_socket_path();
            let (server, received) =
                spawn_mock_server(&socket_path, IpcResponse::success("Settings updated", None));

            let client = IpcClient::new(socket_path);
            let patch = SettingsPatch {
                pomodoro_minutes: Some(50),
                ..Default::default()
            };
            client.update_settings(patch.clone()).await.unwrap();

            assert_eq!(
                *received.lock().await,
                Some(IpcRequest::UpdateSettings { data: patch })
            );
            server.await.unwrap();
        }

        #[tokio::test]
        async fn test_error_response_becomes_err() {
            let socket_path = create_temp_socket_path();
            let (server, _) =
                spawn_mock_server(&socket_path, IpcResponse::error("Unknown action: foo"));

            let client = IpcClient::new(socket_path);
            let err = client.start().await.unwrap_err();

            assert!(err.to_string().contains("Unknown action: foo"));
            server.await.unwrap();
        }
    }

    // ------------------------------------------------------------------------
    // UpdateStream Tests
    // ------------------------------------------------------------------------

    mod update_stream_tests {
        use super::*;

        #[tokio::test]
        async fn test_stream_yields_initial_then_updates_in_order() {
            let socket_path = create_temp_socket_path();
            let listener = UnixListener::bind(&socket_path).unwrap();

            let server = tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                let (read_half, mut writer) = stream.into_split();
                let mut reader = BufReader::new(read_half);
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                assert_eq!(IpcRequest::parse(line.trim()).unwrap(), IpcRequest::Subscribe);

                let mut out = Vec::new();
                for message in [
                    serde_json::to_string(&IpcResponse::success("Subscribed", Some(snapshot(10)))).unwrap(),
                    serde_json::to_string(&PushMessage::TimerUpdate { data: snapshot(30) }).unwrap(),
                    serde_json::to_string(&PushMessage::TimerUpdate { data: snapshot(20) }).unwrap(),
                    serde_json::to_string(&PushMessage::TimerUpdate { data: snapshot(40) }).unwrap(),
                ] {
                    out.extend_from_slice(message.as_bytes());
                    out.push(b'\n');
                }
                writer.write_all(&out).await.unwrap();
            });

            let client = IpcClient::new(socket_path);
            let mut stream = client.subscribe().await.unwrap();

            let mut stamps = Vec::new();
            while let Some(snapshot) = stream.next().await.unwrap() {
                stamps.push(snapshot.timestamp);
            }

            assert_eq!(stamps, vec![10, 30, 40]);
            assert_eq!(stream.latest().unwrap().timestamp, 40);
            server.await.unwrap();
        }
    }
}
