//! Timer engine for FocusDot.
//!
//! This module provides the core timer functionality:
//! - Start / pause / reset / skip transitions
//! - Deadline-based countdown (remaining time is derived, never decremented)
//! - Completion handling with long-break cadence and auto-start
//! - Event firing for notifications, session logging and remote sync
//! - Last-writer-wins adoption of remote records

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::clock::{Clock, WakeScheduler};
use crate::types::{
    CompletedSessionEntry, SessionKind, Settings, SettingsPatch, Snapshot, SyncRecord,
    TimerPhase, TimerSession,
};

// ============================================================================
// TimerEvent
// ============================================================================

/// Events emitted by the engine after a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A session started running
    Started {
        kind: SessionKind,
        deadline_at: DateTime<Utc>,
    },
    /// The running session was paused
    Paused {
        kind: SessionKind,
        remaining_seconds: u32,
    },
    /// The current kind was reloaded at full duration
    Reset {
        kind: SessionKind,
        /// Focus time thrown away by the reset, if any
        interrupted: Option<CompletedSessionEntry>,
    },
    /// A session ended, naturally or by skip
    Completed {
        ended: SessionKind,
        next: SessionKind,
        /// Log entry when a focus session ended
        entry: Option<CompletedSessionEntry>,
        /// True when ended by skip before the deadline
        skipped: bool,
    },
    /// Settings changed
    SettingsUpdated {
        settings: Settings,
        /// True when adopted from the remote store
        from_remote: bool,
    },
    /// A remote record overwrote the local session
    RemoteApplied { updated_at: DateTime<Utc> },
}

// ============================================================================
// TimerEngine
// ============================================================================

/// Timer engine that owns the authoritative session.
///
/// All operations are synchronous and infallible. Callers serialize access
/// (the coordinator owns the engine), so a completion can never be applied
/// twice for the same deadline.
pub struct TimerEngine {
    /// Current settings
    settings: Settings,
    /// Authoritative session record
    session: TimerSession,
    /// Time source
    clock: Arc<dyn Clock>,
    /// One-shot deadline alarm
    wake: Box<dyn WakeScheduler>,
    /// Event sender channel
    event_tx: mpsc::UnboundedSender<TimerEvent>,
    /// Bumped on every local mutation
    revision: u64,
}

impl TimerEngine {
    /// Creates an engine with a fresh idle focus session.
    pub fn new(
        settings: Settings,
        clock: Arc<dyn Clock>,
        wake: Box<dyn WakeScheduler>,
        event_tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        let settings = settings.normalized();
        let mut session = TimerSession::new(SessionKind::Focus, &settings);
        session.updated_at = clock.now();
        Self {
            settings,
            session,
            clock,
            wake,
            event_tx,
            revision: 0,
        }
    }

    /// Restores an engine from persisted state.
    ///
    /// A running session whose deadline passed while the process was down
    /// completes immediately; otherwise the wake is re-armed.
    pub fn restore(
        settings: Settings,
        mut session: TimerSession,
        clock: Arc<dyn Clock>,
        wake: Box<dyn WakeScheduler>,
        event_tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        session.normalize();
        let mut engine = Self {
            settings: settings.normalized(),
            session,
            clock,
            wake,
            event_tx,
            revision: 0,
        };
        engine.resume();
        engine
    }

    /// Re-synchronizes with the wall clock after a restart or suspension.
    pub fn resume(&mut self) {
        let now = self.clock.now();
        match self.session.deadline_at {
            Some(_) if self.session.is_due(now) => {
                info!("Deadline passed while suspended, completing {}", self.session.kind.as_str());
                self.complete(now, false);
            }
            Some(deadline) => {
                self.session.remaining_seconds = self.session.remaining_at(now);
                self.wake.arm_wake(deadline);
            }
            None => self.wake.disarm_wake(),
        }
    }

    /// Returns the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the session record as last stored.
    pub fn session(&self) -> &TimerSession {
        &self.session
    }

    /// Returns the local mutation counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Brings the cached remaining time up to date.
    ///
    /// Runs completion handling when a running session is found past its
    /// deadline. Returns true if a completion happened.
    pub fn refresh(&mut self) -> bool {
        let now = self.clock.now();
        if self.session.is_due(now) {
            self.complete(now, false);
            return true;
        }
        self.session.remaining_seconds = self.session.remaining_at(now);
        false
    }

    /// Returns a fresh snapshot, completing an overdue session first.
    pub fn snapshot(&mut self) -> Snapshot {
        self.refresh();
        Snapshot::capture(&self.session, &self.settings, self.clock.now())
    }

    /// Starts or resumes the current session. No-op while running.
    pub fn start(&mut self) {
        if self.session.is_running() {
            debug!("start ignored: already running");
            return;
        }

        let now = self.clock.now();
        if self.session.remaining_seconds == 0 {
            self.session.remaining_seconds = self.session.total_seconds;
        }
        self.session.run_from(now);
        let deadline = self.session.deadline_at.unwrap_or(now);
        self.wake.arm_wake(deadline);
        self.touch(now);

        info!(
            "{} started, {}s remaining",
            self.session.kind.label(),
            self.session.remaining_seconds
        );
        self.emit(TimerEvent::Started {
            kind: self.session.kind,
            deadline_at: deadline,
        });
    }

    /// Pauses the running session. No-op unless running.
    pub fn pause(&mut self) {
        if self.refresh() {
            debug!("pause found an overdue session; completed it first");
        }
        if !self.session.is_running() {
            debug!("pause ignored: not running");
            return;
        }

        let now = self.clock.now();
        self.session.remaining_seconds = self.session.remaining_at(now);
        self.session.phase = TimerPhase::Paused;
        self.session.deadline_at = None;
        self.session.started_at = None;
        self.wake.disarm_wake();
        self.touch(now);

        info!("{} paused at {}s", self.session.kind.label(), self.session.remaining_seconds);
        self.emit(TimerEvent::Paused {
            kind: self.session.kind,
            remaining_seconds: self.session.remaining_seconds,
        });
    }

    /// Reloads the current kind at full duration, idle.
    pub fn reset(&mut self) {
        let now = self.clock.now();
        let elapsed = self.elapsed_at(now);
        let interrupted = (self.session.kind == SessionKind::Focus && elapsed > 0)
            .then(|| CompletedSessionEntry::focus(now, elapsed, false));

        self.wake.disarm_wake();
        let kind = self.session.kind;
        self.session.reload(kind, self.settings.duration_for(kind));
        self.touch(now);

        info!("{} reset", kind.label());
        self.emit(TimerEvent::Reset { kind, interrupted });
    }

    /// Ends the current session now, as if its deadline had been reached.
    pub fn skip(&mut self) {
        let now = self.clock.now();
        if self.session.is_due(now) {
            self.complete(now, false);
        } else {
            self.complete(now, true);
        }
    }

    /// Handles a fired wake. Ignored unless the running deadline is reached.
    pub fn handle_wake(&mut self) -> bool {
        let now = self.clock.now();
        if !self.session.is_due(now) {
            debug!("stale wake ignored");
            return false;
        }
        self.complete(now, false);
        true
    }

    /// Merges a settings patch.
    ///
    /// An idle session picks up the new duration of its kind; running and
    /// paused sessions keep their timing.
    pub fn update_settings(&mut self, patch: &SettingsPatch) {
        let before = self.settings.clone();
        self.settings.apply(patch);
        if self.settings == before {
            debug!("settings update changed nothing");
            return;
        }
        self.reload_idle_duration();

        self.emit(TimerEvent::SettingsUpdated {
            settings: self.settings.clone(),
            from_remote: false,
        });
    }

    /// Replaces settings with a copy adopted from the remote store.
    pub fn adopt_remote_settings(&mut self, settings: Settings) {
        let settings = settings.normalized();
        if settings == self.settings {
            return;
        }
        self.settings = settings;
        self.revision += 1;
        self.reload_idle_duration();

        self.emit(TimerEvent::SettingsUpdated {
            settings: self.settings.clone(),
            from_remote: true,
        });
    }

    /// Applies a polled remote record if it is strictly newer than the
    /// local watermark. Returns true if the local session was overwritten.
    pub fn apply_remote(&mut self, record: &SyncRecord) -> bool {
        if record.updated_at <= self.session.updated_at {
            debug!(
                "remote record at {} is not newer than local {}",
                record.updated_at, self.session.updated_at
            );
            return false;
        }
        self.overwrite_from_remote(record);
        true
    }

    /// Overwrites the local session with a remote record unconditionally.
    pub fn overwrite_from_remote(&mut self, record: &SyncRecord) {
        let session = record.to_session();
        info!(
            "Adopting remote {} ({}) updated at {}",
            session.kind.as_str(),
            session.phase.as_str(),
            session.updated_at
        );
        self.session = session;
        // Acks for pushes issued before this point describe a session that
        // no longer exists.
        self.revision += 1;

        match self.session.deadline_at {
            Some(deadline) => self.wake.arm_wake(deadline),
            None => self.wake.disarm_wake(),
        }
        self.emit(TimerEvent::RemoteApplied {
            updated_at: record.updated_at,
        });

        // A remote running session may already be over on this machine.
        let now = self.clock.now();
        if self.session.is_due(now) {
            self.complete(now, false);
        } else {
            self.session.remaining_seconds = self.session.remaining_at(now);
        }
    }

    /// Adopts the timestamp the remote store assigned to a pushed record,
    /// provided nothing changed locally since the push.
    pub fn acknowledge_push(&mut self, revision: u64, updated_at: DateTime<Utc>) -> bool {
        if revision != self.revision {
            debug!("push ack for revision {} superseded by {}", revision, self.revision);
            return false;
        }
        if updated_at > self.session.updated_at {
            self.session.updated_at = updated_at;
        }
        true
    }

    /// Runs completion handling for the current session.
    fn complete(&mut self, now: DateTime<Utc>, skipped: bool) {
        let remaining = self.session.remaining_at(now);
        let elapsed = self.elapsed_at(now);
        self.wake.disarm_wake();

        let ended = self.session.kind;
        let entry = if ended == SessionKind::Focus {
            self.session.completed_focus_count += 1;
            Some(CompletedSessionEntry::focus(now, elapsed, remaining == 0))
        } else {
            None
        };

        let next = self.next_kind(ended);
        self.session.reload(next, self.settings.duration_for(next));
        self.touch(now);

        info!(
            "{} {}, next: {}",
            ended.label(),
            if skipped { "skipped" } else { "completed" },
            next.label()
        );
        self.emit(TimerEvent::Completed {
            ended,
            next,
            entry,
            skipped,
        });

        if self.settings.auto_start_for(next) {
            self.start();
        }
    }

    /// Kind that follows `ended` given the current focus count.
    fn next_kind(&self, ended: SessionKind) -> SessionKind {
        match ended {
            SessionKind::Focus => {
                let every = self.settings.pomodoros_before_long_break.max(1);
                if self.session.completed_focus_count % every == 0 {
                    SessionKind::LongBreak
                } else {
                    SessionKind::ShortBreak
                }
            }
            SessionKind::ShortBreak | SessionKind::LongBreak => SessionKind::Focus,
        }
    }

    /// Seconds already counted in the current session.
    fn elapsed_at(&self, now: DateTime<Utc>) -> u32 {
        self.session
            .total_seconds
            .saturating_sub(self.session.remaining_at(now))
    }

    fn reload_idle_duration(&mut self) {
        if self.session.phase != TimerPhase::Idle {
            return;
        }
        let total = self.settings.duration_for(self.session.kind);
        if total != self.session.total_seconds {
            let now = self.clock.now();
            let kind = self.session.kind;
            self.session.reload(kind, total);
            self.touch(now);
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.revision += 1;
        // Never move the watermark backwards, even if the wall clock did.
        self.session.updated_at = now.max(self.session.updated_at);
        debug_assert!(self.session.holds_invariants());
    }

    fn emit(&self, event: TimerEvent) {
        if self.event_tx.send(event).is_err() {
            warn!("Timer event receiver dropped");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
