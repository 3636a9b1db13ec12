//! Notification error types.

use thiserror::Error;

/// Errors that can occur while showing a desktop notification.
///
/// Notification failures never affect the timer; they are only logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// No notification command exists on this platform.
    #[error("no notification command available on this platform")]
    Unsupported,

    /// The notification command could not be spawned.
    #[error("failed to run {0}: {1}")]
    SpawnFailed(String, String),

    /// The notification command exited with an error.
    #[error("{0} exited with an error: {1}")]
    CommandFailed(String, String),

    /// The notification command did not finish in time.
    #[error("{0} timed out after {1}s")]
    Timeout(String, u64),
}

impl NotificationError {
    /// Returns true if retrying cannot help.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Unsupported | Self::SpawnFailed(_, _))
    }
}
