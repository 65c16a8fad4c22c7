// Calibration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration error code constants
///
/// Error code range: 2001-2008
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// Capture device could not be configured
    pub const SESSION_CONFIG: i32 = 2001;

    /// Not enough ambient samples were collected
    pub const INSUFFICIENT_SAMPLES: i32 = 2002;

    /// Baseline rejected by the plausibility policy
    pub const INVALID_BASELINE: i32 = 2003;

    /// Calibration already in progress
    pub const ALREADY_IN_PROGRESS: i32 = 2004;

    /// Metering currently owns the capture device
    pub const METERING_ACTIVE: i32 = 2005;

    /// Calibration was cancelled by stop()
    pub const CANCELLED: i32 = 2006;

    /// Session state lock was poisoned
    pub const STATE_POISONED: i32 = 2007;

    /// Capture device failed to start
    pub const CAPTURE_FAILED: i32 = 2008;
}

/// Log a calibration error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationController, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
///
/// These errors cover background-noise calibration: device setup, sample
/// collection and the caller-side plausibility policy.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Capture device cannot be configured
    SessionConfig { reason: String },

    /// Insufficient samples collected for a baseline
    InsufficientSamples { required: usize, collected: usize },

    /// Baseline is louder than the plausibility ceiling
    InvalidBaseline { decibel: f32, max_plausible: f32 },

    /// Calibration already in progress
    AlreadyInProgress,

    /// Metering is active
    MeteringActive,

    /// Session was stopped while calibrating
    Cancelled,

    /// Session state lock was poisoned
    StatePoisoned,

    /// Capture device failed to start
    CaptureFailed { reason: String },
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::SessionConfig { .. } => CalibrationErrorCodes::SESSION_CONFIG,
            CalibrationError::InsufficientSamples { .. } => {
                CalibrationErrorCodes::INSUFFICIENT_SAMPLES
            }
            CalibrationError::InvalidBaseline { .. } => CalibrationErrorCodes::INVALID_BASELINE,
            CalibrationError::AlreadyInProgress => CalibrationErrorCodes::ALREADY_IN_PROGRESS,
            CalibrationError::MeteringActive => CalibrationErrorCodes::METERING_ACTIVE,
            CalibrationError::Cancelled => CalibrationErrorCodes::CANCELLED,
            CalibrationError::StatePoisoned => CalibrationErrorCodes::STATE_POISONED,
            CalibrationError::CaptureFailed { .. } => CalibrationErrorCodes::CAPTURE_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::SessionConfig { reason } => {
                format!("Failed to configure capture session: {}", reason)
            }
            CalibrationError::InsufficientSamples {
                required,
                collected,
            } => {
                format!("Insufficient samples: need {}, got {}", required, collected)
            }
            CalibrationError::InvalidBaseline {
                decibel,
                max_plausible,
            } => format!(
                "Background noise too loud: {:.1} dB exceeds {:.1} dB. Move somewhere quieter and retry.",
                decibel, max_plausible
            ),
            CalibrationError::AlreadyInProgress => "Calibration already in progress".to_string(),
            CalibrationError::MeteringActive => {
                "Metering is active. Pause or stop it before calibrating.".to_string()
            }
            CalibrationError::Cancelled => "Calibration cancelled".to_string(),
            CalibrationError::StatePoisoned => "Session state lock poisoned".to_string(),
            CalibrationError::CaptureFailed { reason } => {
                format!("Capture device failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}
