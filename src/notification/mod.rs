//! Desktop notification support.
//!
//! The coordinator fires a notification when a session completes, if
//! notifications are enabled in the settings. Delivery is fire-and-forget:
//! the call never blocks and failures are only logged.
//!
//! Implementations:
//! - [`LogNotifier`]: writes the notification to the log
//! - [`CommandNotifier`]: runs `notify-send` (Linux) or `osascript` (macOS)
//! - [`MockNotifier`]: records notifications for tests

pub mod content;
pub mod error;

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

pub use self::content::NotificationContent;
pub use self::error::NotificationError;

/// Default timeout for the notification command in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

// ============================================================================
// Notifier
// ============================================================================

/// Shows a user-visible notification.
pub trait Notifier: Send + Sync {
    /// Shows a notification. Must not block.
    fn notify(&self, title: &str, message: &str);
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!("{}: {}", title, message);
    }
}

// ============================================================================
// CommandNotifier
// ============================================================================

/// Notifier that shells out to the platform notification command.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    timeout_seconds: u64,
}

impl Default for CommandNotifier {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl CommandNotifier {
    /// Creates a notifier with the default timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the notification command and waits for it.
    pub async fn send(&self, title: &str, message: &str) -> Result<(), NotificationError> {
        let (program, args) = command_for(title, message)?;

        let result = timeout(Duration::from_secs(self.timeout_seconds), {
            let program = program.to_string();
            tokio::task::spawn_blocking(move || Command::new(&program).args(&args).output())
        })
        .await;

        let output = match result {
            Ok(Ok(Ok(output))) => output,
            Ok(Ok(Err(e))) => {
                return Err(NotificationError::SpawnFailed(program.to_string(), e.to_string()))
            }
            Ok(Err(e)) => {
                return Err(NotificationError::SpawnFailed(program.to_string(), e.to_string()))
            }
            Err(_) => {
                return Err(NotificationError::Timeout(
                    program.to_string(),
                    self.timeout_seconds,
                ))
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(NotificationError::CommandFailed(
                program.to_string(),
                stderr.trim().to_string(),
            ))
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, title: &str, message: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Notification dropped: no runtime");
            return;
        };

        let notifier = self.clone();
        let title = title.to_string();
        let message = message.to_string();
        runtime.spawn(async move {
            match notifier.send(&title, &message).await {
                Ok(()) => debug!("Notification shown: {}", title),
                Err(e) => warn!("Notification failed: {}", e),
            }
        });
    }
}

/// Returns the program and arguments that show a notification here.
fn command_for(
    title: &str,
    message: &str,
) -> Result<(&'static str, Vec<String>), NotificationError> {
    if cfg!(target_os = "macos") {
        let script = format!(
            "display notification \"{}\" with title \"{}\"",
            escape_applescript(message),
            escape_applescript(title)
        );
        Ok(("osascript", vec!["-e".to_string(), script]))
    } else if cfg!(target_os = "linux") {
        Ok((
            "notify-send",
            vec![
                "--app-name=FocusDot".to_string(),
                title.to_string(),
                message.to_string(),
            ],
        ))
    } else {
        Err(NotificationError::Unsupported)
    }
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

// ============================================================================
// MockNotifier
// ============================================================================

/// Recording notifier for tests.
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<NotificationContent>>,
    muted: AtomicBool,
}

impl MockNotifier {
    /// Creates a new mock notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every notification shown so far.
    pub fn sent(&self) -> Vec<NotificationContent> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drops notifications instead of recording them.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, title: &str, message: &str) {
        if self.muted.load(Ordering::SeqCst) {
            return;
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(NotificationContent {
                title: title.to_string(),
                message: message.to_string(),
            });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_notifier_records() {
        let notifier = MockNotifier::new();
        notifier.notify("Break Complete!", "Time to focus again!");

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Break Complete!");
    }

    #[test]
    fn test_mock_notifier_muted() {
        let notifier = MockNotifier::new();
        notifier.set_muted(true);
        notifier.notify("a", "b");
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn test_log_notifier_does_not_panic() {
        LogNotifier.notify("Focus Session Complete!", "Time for a short break.");
    }

    #[test]
    fn test_command_notifier_outside_runtime_is_dropped() {
        CommandNotifier::new().notify("title", "message");
    }

    #[test]
    fn test_escape_applescript() {
        assert_eq!(escape_applescript(r#"say "hi""#), r#"say \"hi\""#);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_command_for_linux() {
        let (program, args) = command_for("Title", "Body").unwrap();
        assert_eq!(program, "notify-send");
        assert_eq!(args[1], "Title");
        assert_eq!(args[2], "Body");
    }
}
