//! Remote store error types.

use thiserror::Error;

/// Errors that can occur while talking to the remote store.
///
/// None of these are fatal: the reconciler logs them and the local state
/// stays authoritative until the next successful exchange.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The request could not be sent or the connection failed.
    #[error("remote store unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("remote store returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("unexpected response from remote store: {0}")]
    Decode(String),

    /// The remote store is disabled in the configuration.
    #[error("remote store is not configured")]
    NotConfigured,

    /// Injected failure (used by the in-memory store in tests).
    #[error("remote store unavailable")]
    Unavailable,
}

impl RemoteError {
    /// Returns true if the request may succeed when retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Unavailable => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::NotConfigured => false,
        }
    }

    /// Returns true if the credential was rejected.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}
