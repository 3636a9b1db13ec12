//! Core data types for the FocusDot timer.
//!
//! This module defines the data structures used for:
//! - Settings and partial settings updates
//! - The authoritative timer session and its invariants
//! - Snapshots handed to consumers
//! - Persisted local state
//!
//! IPC and remote-store projections live in the `ipc` and `sync` submodules.

pub mod ipc;
pub mod sync;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub use ipc::{IpcRequest, IpcResponse, PushMessage, RequestParseError};
pub use sync::{SyncRecord, UserSettingsRecord};

// ============================================================================
// SessionKind
// ============================================================================

/// Which kind of session the timer is currently counting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    /// Focused work session
    #[default]
    Focus,
    /// Short break between focus sessions
    ShortBreak,
    /// Long break after a full cycle of focus sessions
    LongBreak,
}

impl SessionKind {
    /// Returns the wire representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Focus => "focus",
            SessionKind::ShortBreak => "shortBreak",
            SessionKind::LongBreak => "longBreak",
        }
    }

    /// Returns a human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            SessionKind::Focus => "Focus",
            SessionKind::ShortBreak => "Short break",
            SessionKind::LongBreak => "Long break",
        }
    }

    /// Returns true for either break kind.
    pub fn is_break(&self) -> bool {
        matches!(self, SessionKind::ShortBreak | SessionKind::LongBreak)
    }
}

// ============================================================================
// TimerPhase
// ============================================================================

/// Represents the current phase of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    /// Waiting to be started, full duration loaded
    #[default]
    Idle,
    /// Counting down towards `deadline_at`
    Running,
    /// Stopped part-way, remaining time frozen
    Paused,
}

impl TimerPhase {
    /// Returns the string representation of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Running => "running",
            TimerPhase::Paused => "paused",
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// User settings that drive session durations and auto-start behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Focus session length in minutes
    pub pomodoro_minutes: u32,
    /// Short break length in minutes
    pub short_break_minutes: u32,
    /// Long break length in minutes
    pub long_break_minutes: u32,
    /// Number of focus sessions per long break (>= 1)
    pub pomodoros_before_long_break: u32,
    /// Start breaks automatically when a focus session ends
    pub auto_start_breaks: bool,
    /// Start focus sessions automatically when a break ends
    pub auto_start_pomodoros: bool,
    /// Whether completion notifications are shown
    pub notifications_enabled: bool,
    /// Whether overlay widgets are displayed
    pub widget_visible: bool,
    /// Overlay widget size in pixels
    pub widget_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pomodoro_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            pomodoros_before_long_break: 4,
            auto_start_breaks: true,
            auto_start_pomodoros: true,
            notifications_enabled: true,
            widget_visible: true,
            widget_size: 45,
        }
    }
}

impl Settings {
    /// Duration in seconds of a session of the given kind.
    pub fn duration_for(&self, kind: SessionKind) -> u32 {
        let minutes = match kind {
            SessionKind::Focus => self.pomodoro_minutes,
            SessionKind::ShortBreak => self.short_break_minutes,
            SessionKind::LongBreak => self.long_break_minutes,
        };
        minutes.max(1).saturating_mul(60)
    }

    /// Whether a session of the given kind starts on its own after the
    /// previous one completes.
    pub fn auto_start_for(&self, kind: SessionKind) -> bool {
        if kind.is_break() {
            self.auto_start_breaks
        } else {
            self.auto_start_pomodoros
        }
    }

    /// Merges a partial update into these settings.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(v) = patch.pomodoro_minutes {
            self.pomodoro_minutes = v;
        }
        if let Some(v) = patch.short_break_minutes {
            self.short_break_minutes = v;
        }
        if let Some(v) = patch.long_break_minutes {
            self.long_break_minutes = v;
        }
        if let Some(v) = patch.pomodoros_before_long_break {
            self.pomodoros_before_long_break = v;
        }
        if let Some(v) = patch.auto_start_breaks {
            self.auto_start_breaks = v;
        }
        if let Some(v) = patch.auto_start_pomodoros {
            self.auto_start_pomodoros = v;
        }
        if let Some(v) = patch.notifications_enabled {
            self.notifications_enabled = v;
        }
        if let Some(v) = patch.widget_visible {
            self.widget_visible = v;
        }
        if let Some(v) = patch.widget_size {
            self.widget_size = v;
        }
        self.normalize();
    }

    /// Clamps values the engine cannot work with.
    ///
    /// Zero-length durations and a zero long-break cadence are raised to 1.
    pub fn normalize(&mut self) {
        self.pomodoro_minutes = self.pomodoro_minutes.max(1);
        self.short_break_minutes = self.short_break_minutes.max(1);
        self.long_break_minutes = self.long_break_minutes.max(1);
        self.pomodoros_before_long_break = self.pomodoros_before_long_break.max(1);
    }

    /// Returns a normalized copy.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }
}

/// Partial settings update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pomodoro_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_break_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_break_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pomodoros_before_long_break: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_start_breaks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_start_pomodoros: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget_visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget_size: Option<u32>,
}

impl SettingsPatch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &SettingsPatch::default()
    }

    /// Builds a patch that overwrites every field with `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            pomodoro_minutes: Some(settings.pomodoro_minutes),
            short_break_minutes: Some(settings.short_break_minutes),
            long_break_minutes: Some(settings.long_break_minutes),
            pomodoros_before_long_break: Some(settings.pomodoros_before_long_break),
            auto_start_breaks: Some(settings.auto_start_breaks),
            auto_start_pomodoros: Some(settings.auto_start_pomodoros),
            notifications_enabled: Some(settings.notifications_enabled),
            widget_visible: Some(settings.widget_visible),
            widget_size: Some(settings.widget_size),
        }
    }
}

// ============================================================================
// TimerSession
// ============================================================================

/// The authoritative timer record.
///
/// Invariants: `phase == Running` exactly when `deadline_at` is set, and
/// `remaining_seconds <= total_seconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSession {
    /// Current session kind
    pub kind: SessionKind,
    /// Current phase
    pub phase: TimerPhase,
    /// Cached remaining seconds; recomputed from `deadline_at` while running
    pub remaining_seconds: u32,
    /// Duration of the current kind, fixed when the session is (re)loaded
    pub total_seconds: u32,
    /// When the current running stretch began
    pub started_at: Option<DateTime<Utc>>,
    /// Absolute time at which the running session reaches zero
    pub deadline_at: Option<DateTime<Utc>>,
    /// Number of completed focus sessions
    pub completed_focus_count: u32,
    /// Time of the last accepted mutation (local or remote)
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl TimerSession {
    /// Creates an idle session of `kind` with its full duration loaded.
    pub fn new(kind: SessionKind, settings: &Settings) -> Self {
        let total = settings.duration_for(kind);
        Self {
            kind,
            phase: TimerPhase::Idle,
            remaining_seconds: total,
            total_seconds: total,
            started_at: None,
            deadline_at: None,
            completed_focus_count: 0,
            updated_at: DateTime::<Utc>::default(),
        }
    }

    /// Returns true if the session is counting down.
    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    /// Remaining whole seconds at `now`, rounded up and clamped to
    /// `0..=total_seconds`.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u32 {
        match (self.phase, self.deadline_at) {
            (TimerPhase::Running, Some(deadline)) => {
                let millis = (deadline - now).num_milliseconds();
                if millis <= 0 {
                    return 0;
                }
                let secs = (millis + 999) / 1000;
                u32::try_from(secs)
                    .unwrap_or(u32::MAX)
                    .min(self.total_seconds)
            }
            _ => self.remaining_seconds.min(self.total_seconds),
        }
    }

    /// Returns true if the deadline of a running session has been reached.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(
            (self.phase, self.deadline_at),
            (TimerPhase::Running, Some(deadline)) if now >= deadline
        )
    }

    /// Loads a fresh idle session of `kind`, keeping the focus counter and
    /// the update watermark.
    pub fn reload(&mut self, kind: SessionKind, total_seconds: u32) {
        self.kind = kind;
        self.phase = TimerPhase::Idle;
        self.total_seconds = total_seconds;
        self.remaining_seconds = total_seconds;
        self.started_at = None;
        self.deadline_at = None;
    }

    /// Marks the session as running from `now`.
    pub fn run_from(&mut self, now: DateTime<Utc>) {
        self.phase = TimerPhase::Running;
        self.started_at = Some(now);
        self.deadline_at = Some(now + Duration::seconds(i64::from(self.remaining_seconds)));
    }

    /// Checks the record invariants.
    pub fn holds_invariants(&self) -> bool {
        let running_matches_deadline = self.is_running() == self.deadline_at.is_some();
        running_matches_deadline && self.remaining_seconds <= self.total_seconds
    }

    /// Repairs a record received from outside (remote store, old state file)
    /// so that the invariants hold.
    pub fn normalize(&mut self) {
        if self.total_seconds == 0 {
            self.total_seconds = 60;
        }
        self.remaining_seconds = self.remaining_seconds.min(self.total_seconds);
        match (self.phase, self.deadline_at) {
            (TimerPhase::Running, None) => {
                self.phase = TimerPhase::Paused;
                self.started_at = None;
            }
            (TimerPhase::Running, Some(_)) => {}
            (_, _) => {
                self.deadline_at = None;
                self.started_at = None;
            }
        }
    }
}

impl Default for TimerSession {
    fn default() -> Self {
        Self::new(SessionKind::Focus, &Settings::default())
    }
}

// ============================================================================
// CompletedSessionEntry
// ============================================================================

/// Append-only log entry for a finished or interrupted focus session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSessionEntry {
    /// Always `Focus`
    pub kind: SessionKind,
    /// Start of the counted time
    pub started_at: DateTime<Utc>,
    /// When the session ended
    pub ended_at: DateTime<Utc>,
    /// Counted time, rounded to whole minutes
    pub duration_minutes: u32,
    /// False when the session was skipped or reset before its deadline
    pub completed: bool,
}

impl CompletedSessionEntry {
    /// Creates a focus entry that ended at `ended_at` after `elapsed_seconds`.
    pub fn focus(ended_at: DateTime<Utc>, elapsed_seconds: u32, completed: bool) -> Self {
        Self {
            kind: SessionKind::Focus,
            started_at: ended_at - Duration::seconds(i64::from(elapsed_seconds)),
            ended_at,
            duration_minutes: elapsed_seconds.saturating_add(30) / 60,
            completed,
        }
    }
}

// ============================================================================
// Identity
// ============================================================================

/// An authenticated identity for the remote store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Remote user id (owner of the sync record)
    pub user_id: String,
    /// Bearer credential attached to every remote request
    pub access_token: String,
    /// Display email, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Read-only view of the timer handed to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub kind: SessionKind,
    pub phase: TimerPhase,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub completed_focus_count: u32,
    pub settings: Settings,
    /// Whether an identity is attached and remote sync is active
    pub authenticated: bool,
    /// Milliseconds since the epoch; strictly increasing per publisher
    pub timestamp: i64,
}

impl Snapshot {
    /// Builds a snapshot of `session` as seen at `now`.
    pub fn capture(session: &TimerSession, settings: &Settings, now: DateTime<Utc>) -> Self {
        Self {
            kind: session.kind,
            phase: session.phase,
            remaining_seconds: session.remaining_at(now),
            total_seconds: session.total_seconds,
            started_at: session.started_at,
            deadline_at: session.deadline_at,
            completed_focus_count: session.completed_focus_count,
            settings: settings.clone(),
            authenticated: false,
            timestamp: now.timestamp_millis(),
        }
    }
}

// ============================================================================
// PersistedState
// ============================================================================

/// Local state written after every mutation and read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub session: TimerSession,
    #[serde(default)]
    pub identity: Option<Identity>,
    /// Random id of this coordinator, stamped on pushed records
    #[serde(default = "new_device_id")]
    pub device_id: String,
}

fn new_device_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            session: TimerSession::default(),
            identity: None,
            device_id: new_device_id(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
