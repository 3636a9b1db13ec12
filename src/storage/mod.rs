//! Local persistence of settings, session and identity.
//!
//! The coordinator writes the whole [`PersistedState`] after every mutation
//! and reads it once at startup. A missing or unreadable file yields
//! defaults; write failures are logged and do not affect the live state.

pub mod error;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::types::PersistedState;

pub use error::StorageError;

// ============================================================================
// StateStore
// ============================================================================

/// Key-value persistence for the coordinator's state.
pub trait StateStore: Send {
    /// Reads stored state. `Ok(None)` means nothing was stored yet.
    fn load(&self) -> Result<Option<PersistedState>, StorageError>;

    /// Replaces stored state.
    fn save(&self, state: &PersistedState) -> Result<(), StorageError>;
}

/// Loads state from `store`, falling back to defaults on any failure.
pub fn load_or_default(store: &dyn StateStore) -> PersistedState {
    match store.load() {
        Ok(Some(state)) => state,
        Ok(None) => {
            debug!("No stored state, using defaults");
            PersistedState::default()
        }
        Err(e) => {
            warn!("Ignoring stored state: {}", e);
            PersistedState::default()
        }
    }
}

// ============================================================================
// JsonFileStore
// ============================================================================

/// Stores state as a JSON document on disk.
///
/// Writes go to a sibling temporary file that is renamed over the target,
/// so a crash mid-write leaves the previous state intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<PersistedState>, StorageError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut state: PersistedState =
            serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        state.settings.normalize();
        state.session.normalize();
        Ok(Some(state))
    }

    fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let content = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<PersistedState>>>,
    fail_saves: Arc<AtomicBool>,
    save_count: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `state`.
    pub fn with_state(state: PersistedState) -> Self {
        let store = Self::default();
        *store.lock() = Some(state);
        store
    }

    /// Returns the stored state.
    pub fn stored(&self) -> Option<PersistedState> {
        self.lock().clone()
    }

    /// Makes subsequent saves fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PersistedState>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedState>, StorageError> {
        Ok(self.lock().clone())
    }

    fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("saves disabled".to_string()));
        }
        *self.lock() = Some(state.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
