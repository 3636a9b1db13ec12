//! Local persistence error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing local state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The state file could not be read or written.
    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but does not contain valid state.
    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// State could not be encoded.
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),

    /// Writes were rejected (used by the in-memory store in tests).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Returns true if the failure means the stored state is unusable
    /// rather than temporarily unreachable.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}
