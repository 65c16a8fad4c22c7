// Notification error types and constants

use crate::error::ErrorCode;
use log::warn;
use std::fmt;

/// Notification error code constants
///
/// Error code range: 3001-3002
pub struct NotificationErrorCodes {}

impl NotificationErrorCodes {
    /// The notification service rejected a schedule request
    pub const SCHEDULE_FAILED: i32 = 3001;

    /// Notifications are not authorized
    pub const PERMISSION_DENIED: i32 = 3002;
}

/// Log a notification error
///
/// Notification failures never affect metering, so they are logged at warn
/// level rather than error.
pub fn log_notification_error(err: &NotificationError, context: &str) {
    warn!(
        "Notification error in {}: code={}, component=AlertManager, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors reported by a notification service
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationError {
    /// Schedule request failed
    ScheduleFailed { reason: String },

    /// User has not authorized notifications
    PermissionDenied,
}

impl ErrorCode for NotificationError {
    fn code(&self) -> i32 {
        match self {
            NotificationError::ScheduleFailed { .. } => NotificationErrorCodes::SCHEDULE_FAILED,
            NotificationError::PermissionDenied => NotificationErrorCodes::PERMISSION_DENIED,
        }
    }

    fn message(&self) -> String {
        match self {
            NotificationError::ScheduleFailed { reason } => {
                format!("Failed to schedule notification: {}", reason)
            }
            NotificationError::PermissionDenied => "Notification permission denied".to_string(),
        }
    }
}

impl fmt::Display for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NotificationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for NotificationError {}
