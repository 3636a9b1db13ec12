//! Reconciliation between the local timer and the remote store.
//!
//! The reconciler never touches the engine. Network work runs on spawned
//! tasks and every result is handed back through a [`SyncSink`], which the
//! coordinator turns into a command on its queue. Remote data therefore
//! enters the engine through the same serialized path as local requests.
//!
//! Outbound writes (timer record, settings, session log) go through a single
//! worker so they reach the store in the order they were issued.

pub mod error;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::types::{CompletedSessionEntry, Identity, Settings, SyncRecord, TimerSession};

pub use self::error::RemoteError;
pub use self::remote::{MockRemoteStore, RemoteStore, RestRemoteStore, SessionLogRow};

/// Default interval between remote polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

// ============================================================================
// Messages
// ============================================================================

/// Result of a remote read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// First pull after an identity was attached
    Initial {
        record: Option<SyncRecord>,
        settings: Option<Settings>,
        /// Local revision at the time of attaching
        revision: u64,
    },
    /// Periodic poll
    Poll { record: Option<SyncRecord> },
}

/// Message delivered back to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// A pull finished for `user_id`
    Pulled { user_id: String, outcome: PullOutcome },
    /// A timer push for `revision` was stored as `record`
    PushAcked {
        user_id: String,
        revision: u64,
        record: SyncRecord,
    },
}

/// Callback receiving sync results.
pub type SyncSink = Arc<dyn Fn(SyncMessage) + Send + Sync>;

enum Outbound {
    Timer {
        identity: Identity,
        record: SyncRecord,
        revision: u64,
    },
    Settings {
        identity: Identity,
        settings: Settings,
    },
    Session {
        identity: Identity,
        entry: CompletedSessionEntry,
    },
}

// ============================================================================
// Reconciler
// ============================================================================

/// Pulls, pushes and polls on behalf of the signed-in identity.
pub struct Reconciler<R: RemoteStore> {
    store: Arc<R>,
    origin: String,
    sink: SyncSink,
    identity: Option<Identity>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    poller: Option<JoinHandle<()>>,
}

impl<R: RemoteStore> Reconciler<R> {
    /// Creates a reconciler that stamps pushed records with `origin`.
    pub fn new(store: Arc<R>, origin: impl Into<String>, sink: SyncSink) -> Self {
        Self {
            store,
            origin: origin.into(),
            sink,
            identity: None,
            outbound: None,
            poller: None,
        }
    }

    /// Returns the attached identity.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Returns true while an identity is attached.
    pub fn is_active(&self) -> bool {
        self.identity.is_some()
    }

    /// Returns true while the poll task exists.
    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    /// Attaches `identity` and requests the initial pull.
    ///
    /// `revision` is the local revision at attach time; it travels with the
    /// pull result so the coordinator can tell whether the local session
    /// changed while the pull was in flight.
    pub fn attach(&mut self, identity: Identity, revision: u64) {
        self.stop_polling();
        info!("Remote sync attached for {}", identity.user_id);
        self.identity = Some(identity);
        self.pull_initial(revision);
    }

    /// Re-attaches an identity restored from local state.
    ///
    /// Unlike [`attach`](Self::attach) the first read is an ordinary poll,
    /// so local changes made while offline are not discarded.
    pub fn resume(&mut self, identity: Identity) {
        self.stop_polling();
        info!("Remote sync resumed for {}", identity.user_id);
        self.identity = Some(identity);
        self.pull();
    }

    /// Detaches the identity and stops polling.
    pub fn detach(&mut self) -> Option<Identity> {
        self.stop_polling();
        let identity = self.identity.take();
        if let Some(identity) = &identity {
            info!("Remote sync detached for {}", identity.user_id);
        }
        identity
    }

    /// Fetches the timer record and settings once.
    pub fn pull_initial(&self, revision: u64) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            let record = match store.fetch_timer_state(&identity).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Initial pull failed: {}", e);
                    return;
                }
            };
            let settings = match store.fetch_settings(&identity).await {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Settings pull failed: {}", e);
                    None
                }
            };
            sink(SyncMessage::Pulled {
                user_id: identity.user_id,
                outcome: PullOutcome::Initial {
                    record,
                    settings,
                    revision,
                },
            });
        });
    }

    /// Fetches the timer record once.
    pub fn pull(&self) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            poll_once(store.as_ref(), &identity, &sink).await;
        });
    }

    /// Starts polling every `period`, replacing any running poller.
    pub fn start_polling(&mut self, period: Duration) {
        self.stop_polling();
        let Some(identity) = self.identity.clone() else {
            debug!("start_polling ignored: no identity");
            return;
        };
        let store = Arc::clone(&self.store);
        let sink = Arc::clone(&self.sink);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                poll_once(store.as_ref(), &identity, &sink).await;
            }
        });

        debug!("Polling every {:?}", period);
        self.poller = Some(handle);
    }

    /// Stops polling.
    pub fn stop_polling(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
            debug!("Polling stopped");
        }
    }

    /// Queues a write of the timer record for `revision`.
    pub fn push(&mut self, session: &TimerSession, revision: u64) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        let record = SyncRecord::from_session(&identity.user_id, session, &self.origin);
        self.send(Outbound::Timer {
            identity,
            record,
            revision,
        });
    }

    /// Queues a write of the settings.
    pub fn push_settings(&mut self, settings: &Settings) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        self.send(Outbound::Settings {
            identity,
            settings: settings.clone(),
        });
    }

    /// Queues an append to the session log.
    pub fn record_session(&mut self, entry: CompletedSessionEntry) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        self.send(Outbound::Session { identity, entry });
    }

    fn send(&mut self, job: Outbound) {
        if self.outbound.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_outbound(Arc::clone(&self.store), rx, Arc::clone(&self.sink)));
            self.outbound = Some(tx);
        }

        let delivered = self
            .outbound
            .as_ref()
            .is_some_and(|tx| tx.send(job).is_ok());
        if !delivered {
            warn!("Outbound sync worker stopped; write dropped");
            self.outbound = None;
        }
    }
}

impl<R: RemoteStore> Drop for Reconciler<R> {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

async fn poll_once<R: RemoteStore>(store: &R, identity: &Identity, sink: &SyncSink) {
    match store.fetch_timer_state(identity).await {
        Ok(record) => sink(SyncMessage::Pulled {
            user_id: identity.user_id.clone(),
            outcome: PullOutcome::Poll { record },
        }),
        Err(e) => warn!("Poll failed: {}", e),
    }
}

async fn run_outbound<R: RemoteStore>(
    store: Arc<R>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    sink: SyncSink,
) {
    while let Some(job) = rx.recv().await {
        match job {
            Outbound::Timer {
                identity,
                record,
                revision,
            } => match store.upsert_timer_state(&identity, &record).await {
                Ok(stored) => sink(SyncMessage::PushAcked {
                    user_id: identity.user_id,
                    revision,
                    record: stored,
                }),
                Err(e) => warn!("Timer push failed: {}", e),
            },
            Outbound::Settings { identity, settings } => {
                if let Err(e) = store.upsert_settings(&identity, &settings).await {
                    warn!("Settings push failed: {}", e);
                }
            }
            Outbound::Session { identity, entry } => {
                if let Err(e) = store.insert_session(&identity, &entry).await {
                    warn!("Session log write failed: {}", e);
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
