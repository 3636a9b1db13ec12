//! Rows exchanged with the remote store.
//!
//! The remote side uses snake_case column names, so these projections are
//! kept apart from the camelCase types used on the IPC channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Settings, SessionKind, TimerPhase, TimerSession};

/// Remote projection of a [`TimerSession`], one row per owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Remote owner id
    pub user_id: String,
    pub kind: SessionKind,
    pub phase: TimerPhase,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub completed_focus_count: u32,
    /// Last-writer-wins timestamp
    pub updated_at: DateTime<Utc>,
    /// Device id of the coordinator that wrote the row
    #[serde(default)]
    pub origin: Option<String>,
}

impl SyncRecord {
    /// Projects a local session for `user_id`, stamped with `origin`.
    pub fn from_session(user_id: &str, session: &TimerSession, origin: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind: session.kind,
            phase: session.phase,
            remaining_seconds: session.remaining_seconds,
            total_seconds: session.total_seconds,
            started_at: session.started_at,
            deadline_at: session.deadline_at,
            completed_focus_count: session.completed_focus_count,
            updated_at: session.updated_at,
            origin: Some(origin.to_string()),
        }
    }

    /// Converts the row back into a session, repairing invariants a foreign
    /// writer may have broken.
    pub fn to_session(&self) -> TimerSession {
        let mut session = TimerSession {
            kind: self.kind,
            phase: self.phase,
            remaining_seconds: self.remaining_seconds,
            total_seconds: self.total_seconds,
            started_at: self.started_at,
            deadline_at: self.deadline_at,
            completed_focus_count: self.completed_focus_count,
            updated_at: self.updated_at,
        };
        session.normalize();
        session
    }
}

/// Remote projection of [`Settings`], one row per owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettingsRecord {
    pub user_id: String,
    pub pomodoro_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub pomodoros_before_long_break: u32,
    pub auto_start_breaks: bool,
    pub auto_start_pomodoros: bool,
    pub notifications_enabled: bool,
    #[serde(default = "default_true")]
    pub widget_visible: bool,
    #[serde(default = "default_widget_size")]
    pub widget_size: u32,
}

fn default_true() -> bool {
    true
}

fn default_widget_size() -> u32 {
    Settings::default().widget_size
}

impl UserSettingsRecord {
    /// Projects local settings for `user_id`.
    pub fn from_settings(user_id: &str, settings: &Settings) -> Self {
        Self {
            user_id: user_id.to_string(),
            pomodoro_minutes: settings.pomodoro_minutes,
            short_break_minutes: settings.short_break_minutes,
            long_break_minutes: settings.long_break_minutes,
            pomodoros_before_long_break: settings.pomodoros_before_long_break,
            auto_start_breaks: settings.auto_start_breaks,
            auto_start_pomodoros: settings.auto_start_pomodoros,
            notifications_enabled: settings.notifications_enabled,
            widget_visible: settings.widget_visible,
            widget_size: settings.widget_size,
        }
    }

    /// Converts the row into normalized settings.
    pub fn to_settings(&self) -> Settings {
        Settings {
            pomodoro_minutes: self.pomodoro_minutes,
            short_break_minutes: self.short_break_minutes,
            long_break_minutes: self.long_break_minutes,
            pomodoros_before_long_break: self.pomodoros_before_long_break,
            auto_start_breaks: self.auto_start_breaks,
            auto_start_pomodoros: self.auto_start_pomodoros,
            notifications_enabled: self.notifications_enabled,
            widget_visible: self.widget_visible,
            widget_size: self.widget_size,
        }
        .normalized()
    }
}
