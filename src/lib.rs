//! FocusDot Library
//!
//! This library provides the core functionality of the FocusDot timer.
//! It includes:
//! - Timer engine and the coordinator that owns it
//! - Snapshot broadcast to attached consumers
//! - IPC server/client for daemon-CLI communication
//! - Reconciliation with a remote store reachable only by polling
//! - Local persistence and completion notifications
//! - CLI command parsing and display utilities

pub mod cli;
pub mod config;
pub mod daemon;
pub mod notification;
pub mod storage;
pub mod sync;
pub mod types;

// Re-export commonly used types for convenience
pub use types::{
    CompletedSessionEntry, Identity, IpcRequest, IpcResponse, PersistedState, PushMessage,
    SessionKind, Settings, SettingsPatch, Snapshot, SyncRecord, TimerPhase, TimerSession,
};

pub use config::{ConfigError, DaemonConfig};
pub use daemon::{Coordinator, CoordinatorHandle, CoordinatorOptions, TimerEngine, TimerEvent};
pub use notification::{LogNotifier, MockNotifier, NotificationContent, Notifier};
pub use storage::{JsonFileStore, MemoryStore, StateStore, StorageError};
pub use sync::{MockRemoteStore, Reconciler, RemoteError, RemoteStore, RestRemoteStore};
