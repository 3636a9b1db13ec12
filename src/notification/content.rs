//! Notification texts for session transitions.

use crate::types::SessionKind;

/// Title and body of a completion notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    pub title: String,
    pub message: String,
}

impl NotificationContent {
    /// Builds the notification shown when `ended` completes and `next` is
    /// loaded.
    pub fn for_transition(ended: SessionKind, next: SessionKind) -> Self {
        match ended {
            SessionKind::Focus => {
                let message = if next == SessionKind::LongBreak {
                    "Time for a long break."
                } else {
                    "Time for a short break."
                };
                Self {
                    title: "Focus Session Complete!".to_string(),
                    message: message.to_string(),
                }
            }
            SessionKind::ShortBreak | SessionKind::LongBreak => Self {
                title: "Break Complete!".to_string(),
                message: "Time to focus again!".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_to_short_break() {
        let content = NotificationContent::for_transition(SessionKind::Focus, SessionKind::ShortBreak);
        assert_eq!(content.title, "Focus Session Complete!");
        assert_eq!(content.message, "Time for a short break.");
    }

    #[test]
    fn test_focus_to_long_break() {
        let content = NotificationContent::for_transition(SessionKind::Focus, SessionKind::LongBreak);
        assert_eq!(content.message, "Time for a long break.");
    }

    #[test]
    fn test_break_complete() {
        for ended in [SessionKind::ShortBreak, SessionKind::LongBreak] {
            let content = NotificationContent::for_transition(ended, SessionKind::Focus);
            assert_eq!(content.title, "Break Complete!");
            assert_eq!(content.message, "Time to focus again!");
        }
    }
}
