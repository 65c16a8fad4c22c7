// Error types for the noise metering engine
//
// This module defines custom error types for metering, calibration and
// notification operations, providing structured error handling with numeric
// error codes that presentation layers can map to user-facing messages.

mod calibration;
mod metering;
mod notification;

pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use metering::{log_metering_error, MeteringError, MeteringErrorCodes};
pub use notification::{log_notification_error, NotificationError, NotificationErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the collaborator boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
