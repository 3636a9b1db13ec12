//! CLI module for FocusDot.
//!
//! This module provides the command-line interface:
//! - `commands`: Command definitions using clap derive
//! - `client`: IPC client for daemon communication
//! - `display`: Output formatting and display logic

pub mod client;
pub mod commands;
pub mod display;

pub use client::{IpcClient, UpdateStream};
pub use commands::{Cli, Commands, LoginArgs, SettingsArgs};
pub use display::Display;
