//! IPC server for FocusDot.
//!
//! This module provides the Unix Domain Socket message channel:
//! - Server that listens on a Unix socket
//! - Newline-delimited JSON framing, one request and one response per line
//! - Dispatch of requests to the coordinator
//! - `subscribe` connections that stay open and receive `timerUpdate` pushes

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::coordinator::CoordinatorHandle;
use crate::types::{IpcRequest, IpcResponse, PushMessage};

// ============================================================================
// Constants
// ============================================================================

/// Maximum request line size in bytes (16KB)
pub const MAX_REQUEST_SIZE: usize = 16 * 1024;

/// Idle timeout of a request/response connection in seconds
const READ_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// IpcError
// ============================================================================

/// IPC-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Read error
    #[error("Failed to read request: {0}")]
    ReadError(String),

    /// Write error
    #[error("Failed to write message: {0}")]
    WriteError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Request too large
    #[error("Request too large (max {MAX_REQUEST_SIZE} bytes)")]
    RequestTooLarge,
}

// ============================================================================
// Framing
// ============================================================================

/// Reads one request line. Returns `None` when the peer closed the stream.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>, IpcError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let limit = (MAX_REQUEST_SIZE + 1) as u64;
    let n = reader
        .take(limit)
        .read_line(&mut line)
        .await
        .map_err(|e| IpcError::ReadError(e.to_string()))?;

    if n == 0 {
        return Ok(None);
    }
    if n > MAX_REQUEST_SIZE && !line.ends_with('\n') {
        return Err(IpcError::RequestTooLarge);
    }
    Ok(Some(line))
}

/// Serializes `message` as one JSON line and flushes it.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json =
        serde_json::to_vec(message).map_err(|e| IpcError::SerializationError(e.to_string()))?;
    json.push(b'\n');

    writer
        .write_all(&json)
        .await
        .map_err(|e| IpcError::WriteError(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| IpcError::WriteError(e.to_string()))?;
    Ok(())
}

// ============================================================================
// IpcServer
// ============================================================================

/// Unix Domain Socket IPC server.
pub struct IpcServer {
    /// Unix socket listener
    listener: UnixListener,
    /// Socket path (for cleanup)
    socket_path: PathBuf,
}

impl IpcServer {
    /// Creates a new IPC server bound to the specified socket path.
    ///
    /// A stale socket file is removed before binding.
    pub fn new(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove existing socket: {:?}", socket_path))?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {:?}", socket_path))?;

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Accepts an incoming client connection.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        Ok(stream)
    }

    /// Accepts connections forever, serving each on its own task.
    pub async fn serve(&self, handle: CoordinatorHandle) -> Result<()> {
        loop {
            let stream = self.accept().await?;
            let handle = handle.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handle).await {
                    debug!("Connection closed: {}", e);
                }
            });
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

// ============================================================================
// Connection handling
// ============================================================================

/// Serves one connection until the peer closes it.
///
/// Malformed lines and unknown actions are answered with an error response;
/// the connection stays usable.
pub async fn handle_connection(stream: UnixStream, handle: CoordinatorHandle) -> Result<(), IpcError> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let line = match timeout(Duration::from_secs(READ_TIMEOUT_SECS), read_line(&mut reader)).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(IpcError::RequestTooLarge)) => {
                write_message(&mut writer, &IpcResponse::error(IpcError::RequestTooLarge.to_string()))
                    .await?;
                return Err(IpcError::RequestTooLarge);
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(IpcError::Timeout),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match IpcRequest::parse(line) {
            Ok(IpcRequest::Subscribe) => return stream_updates(reader, writer, handle).await,
            Ok(request) => {
                let response = handle.request(request).await;
                write_message(&mut writer, &response).await?;
            }
            Err(e) => {
                warn!("Rejected request: {}", e);
                write_message(&mut writer, &IpcResponse::error(e.to_string())).await?;
            }
        }
    }
}

/// Turns the connection into a push stream.
///
/// The first line is a success response carrying the current snapshot;
/// every later line is a `timerUpdate` push. The consumer is detached when
/// either side closes.
async fn stream_updates(
    mut reader: BufReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    handle: CoordinatorHandle,
) -> Result<(), IpcError> {
    let Some(mut subscription) = handle.subscribe("ipc").await else {
        write_message(&mut writer, &IpcResponse::error("Timer service is not running")).await?;
        return Ok(());
    };
    let consumer = subscription.consumer;

    let result = async {
        let initial = IpcResponse::success("Subscribed", Some(subscription.initial.clone()));
        write_message(&mut writer, &initial).await?;

        let mut ignored = String::new();
        loop {
            tokio::select! {
                update = subscription.updates.recv() => match update {
                    Some(snapshot) => {
                        write_message(&mut writer, &PushMessage::TimerUpdate { data: snapshot }).await?;
                    }
                    None => break,
                },
                read = reader.read_line(&mut ignored) => match read {
                    Ok(0) | Err(_) => break,
                    Ok(_) => ignored.clear(),
                },
            }
        }
        Ok::<(), IpcError>(())
    }
    .await;

    handle.detach(consumer);
    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_temp_socket_path() -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        // Keep the directory so it's not deleted
        std::mem::forget(dir);
        path
    }

    // ------------------------------------------------------------------------
    // IpcServer Tests
    // ------------------------------------------------------------------------

    mod ipc_server_tests {
        use super::*;

        #[tokio::test]
        async fn test_server_creation() {
            let socket_path = create_temp_socket_path();
            let server = IpcServer::new(&socket_path);

            assert!(server.is_ok());
            assert!(socket_path.exists());
        }

        #[tokio::test]
        async fn test_server_removes_existing_socket() {
            let socket_path = create_temp_socket_path();
            std::fs::write(&socket_path, "dummy").unwrap();

            let server = IpcServer::new(&socket_path);
            assert!(server.is_ok());
        }

        #[tokio::test]
        async fn test_server_creates_parent_directory() {
            let dir = tempfile::tempdir().unwrap();
            let socket_path = dir.path().join("subdir").join("test.sock");

            let server = IpcServer::new(&socket_path);
            assert!(server.is_ok());
            assert!(socket_path.parent().unwrap().exists());
        }

        #[tokio::test]
        async fn test_drop_removes_socket() {
            let socket_path = create_temp_socket_path();
            let server = IpcServer::new(&socket_path).unwrap();
            assert_eq!(server.socket_path(), socket_path.as_path());

            drop(server);
            assert!(!socket_path.exists());
        }
    }

    // ------------------------------------------------------------------------
    // Framing Tests
    // ------------------------------------------------------------------------

    mod framing_tests {
        use super::*;

        #[tokio::test]
        async fn test_read_line_splits_requests() {
            let data: &[u8] = b"{\"action\":\"start\"}\n{\"action\":\"pause\"}\n";
            let mut reader = BufReader::new(data);

            let first = read_line(&mut reader).await.unwrap().unwrap();
            let second = read_line(&mut reader).await.unwrap().unwrap();

            assert_eq!(first.trim(), r#"{"action":"start"}"#);
            assert_eq!(second.trim(), r#"{"action":"pause"}"#);
            assert!(read_line(&mut reader).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_read_line_accepts_unterminated_last_line() {
            let data: &[u8] = b"{\"action\":\"getState\"}";
            let mut reader = BufReader::new(data);

            let line = read_line(&mut reader).await.unwrap().unwrap();
            assert_eq!(line, r#"{"action":"getState"}"#);
        }

        #[tokio::test]
        async fn test_read_line_rejects_oversized() {
            let data = vec![b'a'; MAX_REQUEST_SIZE + 10];
            let mut reader = BufReader::new(data.as_slice());

            let result = read_line(&mut reader).await;
            assert!(matches!(result, Err(IpcError::RequestTooLarge)));
        }

        #[tokio::test]
        async fn test_write_message_appends_newline() {
            let mut out: Vec<u8> = Vec::new();
            write_message(&mut out, &IpcResponse::error("Unknown action: foo"))
                .await
                .unwrap();

            let text = String::from_utf8(out).unwrap();
            assert!(text.ends_with('\n'));
            let parsed: IpcResponse = serde_json::from_str(text.trim()).unwrap();
            assert_eq!(parsed.message, "Unknown action: foo");
        }
    }
}
