//! Failure notifications
//!
//! Scheduling is fire-and-forget: a notification that cannot be scheduled
//! is logged by the caller and dropped.

use crate::state::ErrorStateReason;
use tracing::info;

/// Local user notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Notification shown when the tunnel goes down because of `reason`
    pub fn tunnel_failure(title: &str, reason: ErrorStateReason) -> Self {
        let mut body = String::from("Connection failed: ");
        body.push_str(reason.description());
        Self::new(title, body)
    }
}

/// OS notification service
pub trait FailureNotifier: Send + Sync {
    /// Schedule a notification for display
    fn schedule(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notification scheduling errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification service unavailable")]
    Unavailable,

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Notifier that only writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl FailureNotifier for LogNotifier {
    fn schedule(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!("[notification] {}: {}", notification.title, notification.body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_notification_text() {
        let notification = Notification::tunnel_failure("VPN", ErrorStateReason::Dns);

        assert_eq!(notification.title, "VPN");
        assert_eq!(notification.body, "Connection failed: DNS could not be configured");
    }

    #[test]
    fn test_log_notifier_accepts() {
        let notification = Notification::new("VPN", "Disconnected");
        assert!(LogNotifier.schedule(&notification).is_ok());
    }
}
