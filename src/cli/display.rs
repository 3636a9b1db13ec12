//! Display utilities for the FocusDot CLI.
//!
//! This module provides formatted output for:
//! - Request acknowledgements
//! - Error messages
//! - Status display
//! - Streamed updates

use crate::types::{IpcResponse, SessionKind, Snapshot};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows the message of a successful request and the resulting state.
    pub fn show_ack(response: &IpcResponse) {
        println!("* {}", response.message);
        if let Some(snapshot) = &response.data {
            println!("  {}", Self::summary_line(snapshot));
        }
    }

    /// Shows the full timer status.
    pub fn show_snapshot(snapshot: &Snapshot) {
        println!("FocusDot status");
        println!("─────────────────────────────");
        println!("Session:   {}", snapshot.kind.label());
        println!("State:     {}", snapshot.phase.as_str());
        println!("Remaining: {}", Self::format_clock(snapshot.remaining_seconds));
        println!(
            "Focus sessions completed: {} (long break every {})",
            snapshot.completed_focus_count, snapshot.settings.pomodoros_before_long_break
        );
        if let Some(deadline) = snapshot.deadline_at {
            println!("Ends at:   {}", deadline.with_timezone(&chrono::Local).format("%H:%M:%S"));
        }
        println!(
            "Sync:      {}",
            if snapshot.authenticated { "signed in" } else { "local only" }
        );
    }

    /// Shows one streamed update on a single line.
    pub fn show_update(snapshot: &Snapshot) {
        println!("{}", Self::summary_line(snapshot));
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("Error: {}", message);
    }

    fn summary_line(snapshot: &Snapshot) -> String {
        format!(
            "{} {} {}",
            Self::kind_marker(snapshot.kind),
            Self::format_clock(snapshot.remaining_seconds),
            snapshot.phase.as_str()
        )
    }

    fn kind_marker(kind: SessionKind) -> &'static str {
        match kind {
            SessionKind::Focus => "[focus]",
            SessionKind::ShortBreak => "[short break]",
            SessionKind::LongBreak => "[long break]",
        }
    }

    /// Formats seconds as `MM:SS`.
    fn format_clock(total_seconds: u32) -> String {
        let (minutes, seconds) = Self::format_time(total_seconds);
        format!("{:02}:{:02}", minutes, seconds)
    }

    /// Formats remaining seconds as (minutes, seconds).
    fn format_time(total_seconds: u32) -> (u32, u32) {
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        (minutes, seconds)
    }
}

// ============================================================================
// Tests
// ============================================================================
