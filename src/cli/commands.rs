//! Command definitions for the FocusDot CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::SettingsPatch;

// ============================================================================
// CLI Structure
// ============================================================================

/// FocusDot - focus/break timer with synced widgets
#[derive(Parser, Debug)]
#[command(
    name = "focusdot",
    version,
    about = "Focus/break timer daemon and control panel",
    long_about = "A focus/break timer. The daemon owns the timer and keeps every attached \
                  panel, overlay widget and the remote store in sync.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Daemon socket path (overrides the config file)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Config file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show current timer status
    Status,

    /// Start or resume the current session
    Start,

    /// Pause the running session
    Pause,

    /// Reload the current session at full duration
    Reset,

    /// End the current session and move to the next one
    Skip,

    /// Change timer settings
    Settings(SettingsArgs),

    /// Stream timer updates until interrupted
    Watch,

    /// Attach an identity and sync with the remote store
    Login(LoginArgs),

    /// Detach the identity and stop syncing
    Logout,

    /// Run the timer daemon in the foreground
    Daemon,

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Settings Command Arguments
// ============================================================================

/// Arguments for the settings command. Omitted flags are left unchanged.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Focus duration in minutes (1-120)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=120))]
    pub focus: Option<u32>,

    /// Short break duration in minutes (1-60)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=60))]
    pub short_break: Option<u32>,

    /// Long break duration in minutes (1-60)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=60))]
    pub long_break: Option<u32>,

    /// Focus sessions per long break
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub long_break_every: Option<u32>,

    /// Start breaks automatically
    #[arg(long)]
    pub auto_start_breaks: Option<bool>,

    /// Start focus sessions automatically after a break
    #[arg(long)]
    pub auto_start_focus: Option<bool>,

    /// Show completion notifications
    #[arg(long)]
    pub notifications: Option<bool>,

    /// Show overlay widgets
    #[arg(long)]
    pub widget_visible: Option<bool>,

    /// Overlay widget size in pixels
    #[arg(long, value_parser = clap::value_parser!(u32).range(16..=256))]
    pub widget_size: Option<u32>,
}

impl SettingsArgs {
    /// Converts the flags into a partial settings update.
    pub fn to_patch(&self) -> SettingsPatch {
        SettingsPatch {
            pomodoro_minutes: self.focus,
            short_break_minutes: self.short_break,
            long_break_minutes: self.long_break,
            pomodoros_before_long_break: self.long_break_every,
            auto_start_breaks: self.auto_start_breaks,
            auto_start_pomodoros: self.auto_start_focus,
            notifications_enabled: self.notifications,
            widget_visible: self.widget_visible,
            widget_size: self.widget_size,
        }
    }
}

// ============================================================================
// Login Command Arguments
// ============================================================================

/// Arguments for the login command
#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Remote user id
    #[arg(long)]
    pub user_id: String,

    /// Access token for the remote store
    #[arg(long)]
    pub access_token: String,

    /// Account email, shown in status output
    #[arg(long)]
    pub email: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
