//! Messages exchanged between consumers and the coordinator.
//!
//! Requests are newline-delimited JSON objects tagged by `action`; responses
//! echo the status/message/data shape and push updates are tagged the same
//! way as requests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Identity, SettingsPatch, Snapshot};

/// Actions a consumer may send. Anything else is answered with an
/// `Unknown action` error.
pub const KNOWN_ACTIONS: &[&str] = &[
    "getState",
    "start",
    "pause",
    "reset",
    "skip",
    "updateSettings",
    "signIn",
    "signOut",
    "subscribe",
];

/// IPC request from a consumer to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum IpcRequest {
    /// Query the current snapshot
    GetState,
    /// Start or resume the current session
    Start,
    /// Pause the running session
    Pause,
    /// Reload the current kind at full duration
    Reset,
    /// End the current session now
    Skip,
    /// Merge a partial settings update
    UpdateSettings {
        /// Fields to change
        data: SettingsPatch,
    },
    /// Attach an identity and begin remote reconciliation
    SignIn {
        #[serde(flatten)]
        identity: Identity,
    },
    /// Detach the identity and stop polling
    SignOut,
    /// Keep the connection open and stream snapshots
    Subscribe,
}

impl IpcRequest {
    /// Returns the wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            IpcRequest::GetState => "getState",
            IpcRequest::Start => "start",
            IpcRequest::Pause => "pause",
            IpcRequest::Reset => "reset",
            IpcRequest::Skip => "skip",
            IpcRequest::UpdateSettings { .. } => "updateSettings",
            IpcRequest::SignIn { .. } => "signIn",
            IpcRequest::SignOut => "signOut",
            IpcRequest::Subscribe => "subscribe",
        }
    }

    /// Parses a request line, telling unknown actions apart from
    /// malformed payloads.
    pub fn parse(line: &str) -> Result<Self, RequestParseError> {
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| RequestParseError::Malformed(e.to_string()))?;

        let action = value
            .get("action")
            .and_then(|a| a.as_str())
            .ok_or_else(|| RequestParseError::Malformed("missing \"action\" field".to_string()))?
            .to_string();

        if !KNOWN_ACTIONS.contains(&action.as_str()) {
            return Err(RequestParseError::UnknownAction(action));
        }

        serde_json::from_value(value).map_err(|e| RequestParseError::Malformed(e.to_string()))
    }
}

/// Failure to turn a request line into an [`IpcRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestParseError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid request: {0}")]
    Malformed(String),
}

/// IPC response from the coordinator to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Response status ("success" or "error")
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// Snapshot after the request was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Snapshot>,
}

impl IpcResponse {
    /// Creates a success response.
    pub fn success(message: impl Into<String>, data: Option<Snapshot>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }

    /// Returns true for a success response.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Unsolicited message pushed to subscribed consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PushMessage {
    /// A fresh snapshot after a mutation or a visible tick
    TimerUpdate { data: Snapshot },
}

impl PushMessage {
    /// Returns the carried snapshot.
    pub fn into_snapshot(self) -> Snapshot {
        match self {
            PushMessage::TimerUpdate { data } => data,
        }
    }
}
