//! Collaborator abstractions for the metering engine.
//!
//! The engine never reaches for global services: capture, permissions,
//! notifications, the live-status display and the clock are all injected at
//! construction through these traits.

use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::alerts::NotificationIntent;
use crate::error::{MeteringError, NotificationError};

/// Exclusively-owned input device delivering power readings.
///
/// Only the metering controller touches the device; calibration and active
/// metering never use it at the same time.
pub trait CaptureDevice: Send {
    /// Prepare the underlying session. Failures are `SessionConfig` errors.
    fn configure(&mut self) -> Result<(), MeteringError>;
    fn start(&mut self) -> Result<(), MeteringError>;
    /// Release the device. Must be safe to call when not started.
    fn stop(&mut self);
    /// Latest average power in device-native units (dBFS).
    fn current_power(&mut self) -> f32;
}

/// Microphone permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// Grants access to the microphone.
pub trait PermissionService: Send + Sync {
    fn status(&self) -> PermissionStatus;
    /// Show the permission prompt; resolves to whether access was granted.
    fn request(&self) -> BoxFuture<'_, bool>;
}

/// Delivers notification intents to the user.
pub trait NotificationService: Send + Sync {
    fn schedule(
        &self,
        intent: &NotificationIntent,
        delay: Duration,
        repeats: bool,
    ) -> Result<(), NotificationError>;
    fn cancel_all(&self);
}

/// Lock-screen / companion display mirroring the metering state.
pub trait LiveStatusDisplay: Send + Sync {
    fn on_start(&self, is_first_start: bool);
    fn on_update(&self, is_active: bool);
    fn on_stop(&self);
}

/// Trait representing a monotonic time source used for escalation timing.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by Tokio's clock.
///
/// Under `tokio::time::pause()` this becomes a virtual clock, which is how
/// the escalation timeline is tested without real time passing.
#[derive(Default)]
pub struct TokioTimeSource {
    _unit: (),
}

impl TimeSource for TokioTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use cpal::CpalCapture;

mod desktop;
pub use desktop::{CaptureProbe, GrantedPermissions, LoggingDisplay, LoggingNotifier, ScriptedCapture};

mod wav;
pub use wav::WavReplayCapture;
