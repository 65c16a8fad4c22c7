// Metering error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Metering error code constants
///
/// Single source of truth for the numeric codes surfaced to the
/// orchestrating layer.
///
/// Error code range: 1001-1008
pub struct MeteringErrorCodes {}

impl MeteringErrorCodes {
    /// Capture device could not be configured
    pub const SESSION_CONFIG: i32 = 1001;

    /// Capture device failed to start or deliver readings
    pub const CAPTURE_FAILED: i32 = 1002;

    /// Metering is already running
    pub const ALREADY_RUNNING: i32 = 1003;

    /// Metering is not running
    pub const NOT_RUNNING: i32 = 1004;

    /// Calibration currently owns the capture device
    pub const CALIBRATION_IN_PROGRESS: i32 = 1005;

    /// Baseline loudness is zero, the ratio is undefined
    pub const ZERO_BASELINE_LOUDNESS: i32 = 1006;

    /// Mutex was poisoned
    pub const LOCK_POISONED: i32 = 1007;

    /// No Tokio runtime available to spawn the scheduler
    pub const NO_RUNTIME: i32 = 1008;
}

/// Log a metering error with structured context
///
/// This function logs metering errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_metering_error(err: &MeteringError, context: &str) {
    error!(
        "Metering error in {}: code={}, component=MeteringController, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Metering-related errors
///
/// These errors cover the metering controller including capture device
/// configuration, session lifecycle and loudness computation.
#[derive(Debug, Clone, PartialEq)]
pub enum MeteringError {
    /// Capture device cannot be configured; fatal to this attempt
    SessionConfig { reason: String },

    /// Capture device failed to start
    CaptureFailed { reason: String },

    /// Metering is already active
    AlreadyRunning,

    /// Metering is not active
    NotRunning,

    /// Calibration is using the capture device
    CalibrationInProgress,

    /// Background loudness evaluated to zero
    ZeroBaselineLoudness,

    /// Mutex was poisoned
    LockPoisoned { component: String },

    /// `start` was called outside a Tokio runtime
    NoRuntime,
}

impl ErrorCode for MeteringError {
    fn code(&self) -> i32 {
        match self {
            MeteringError::SessionConfig { .. } => MeteringErrorCodes::SESSION_CONFIG,
            MeteringError::CaptureFailed { .. } => MeteringErrorCodes::CAPTURE_FAILED,
            MeteringError::AlreadyRunning => MeteringErrorCodes::ALREADY_RUNNING,
            MeteringError::NotRunning => MeteringErrorCodes::NOT_RUNNING,
            MeteringError::CalibrationInProgress => MeteringErrorCodes::CALIBRATION_IN_PROGRESS,
            MeteringError::ZeroBaselineLoudness => MeteringErrorCodes::ZERO_BASELINE_LOUDNESS,
            MeteringError::LockPoisoned { .. } => MeteringErrorCodes::LOCK_POISONED,
            MeteringError::NoRuntime => MeteringErrorCodes::NO_RUNTIME,
        }
    }

    fn message(&self) -> String {
        match self {
            MeteringError::SessionConfig { reason } => {
                format!("Failed to configure capture session: {}", reason)
            }
            MeteringError::CaptureFailed { reason } => {
                format!("Capture device failed: {}", reason)
            }
            MeteringError::AlreadyRunning => {
                "Metering already running. Call pause() or stop() first.".to_string()
            }
            MeteringError::NotRunning => {
                "Metering not running. Call start() first.".to_string()
            }
            MeteringError::CalibrationInProgress => {
                "Calibration in progress. Wait for it to finish before metering.".to_string()
            }
            MeteringError::ZeroBaselineLoudness => {
                "Background loudness is zero; loudness ratio is undefined".to_string()
            }
            MeteringError::LockPoisoned { component } => {
                format!("Lock poisoned for component: {}", component)
            }
            MeteringError::NoRuntime => {
                "Metering must be started from within a Tokio runtime".to_string()
            }
        }
    }
}

impl fmt::Display for MeteringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MeteringError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for MeteringError {}

/// Convert from std::io::Error to MeteringError
impl From<std::io::Error> for MeteringError {
    fn from(err: std::io::Error) -> Self {
        MeteringError::CaptureFailed {
            reason: err.to_string(),
        }
    }
}
