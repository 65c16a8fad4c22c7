//! `TestRig`: an `EngineHandle` wired to recording fakes.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::backend::{CaptureProbe, ScriptedCapture, TimeSource, TokioTimeSource};
use crate::engine::{Collaborators, EngineHandle};
use crate::testing::fakes::{RecordingDisplay, RecordingNotifier, ScriptedPermissions};

/// SPL 40 dB in device units
pub const QUIET_ROOM_POWER: f32 = -60.0;
/// SPL 55 dB in device units
pub const RAISED_VOICE_POWER: f32 = -45.0;

pub struct TestRig {
    pub engine: EngineHandle,
    pub notifier: Arc<RecordingNotifier>,
    pub display: Arc<RecordingDisplay>,
    pub permissions: Arc<ScriptedPermissions>,
    pub probe: Arc<CaptureProbe>,
}

impl TestRig {
    pub fn builder() -> TestRigBuilder {
        TestRigBuilder::default()
    }
}

pub struct TestRigBuilder {
    config: AppConfig,
    capture: ScriptedCapture,
    permissions: ScriptedPermissions,
}

impl Default for TestRigBuilder {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            capture: ScriptedCapture::constant(QUIET_ROOM_POWER),
            permissions: ScriptedPermissions::granted(),
        }
    }
}

impl TestRigBuilder {
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn capture(mut self, capture: ScriptedCapture) -> Self {
        self.capture = capture;
        self
    }

    pub fn permissions(mut self, permissions: ScriptedPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Quiet room for one calibration window, then `power` forever
    pub fn calibrate_quiet_then(mut self, power: f32) -> Self {
        let samples = self.config.calibration.sample_count();
        self.capture = ScriptedCapture::from_readings(Vec::new())
            .then_repeat(QUIET_ROOM_POWER, samples)
            .then_hold(power);
        self
    }

    pub fn build(self) -> TestRig {
        let notifier = Arc::new(RecordingNotifier::default());
        let display = Arc::new(RecordingDisplay::default());
        let permissions = Arc::new(self.permissions);
        let probe = self.capture.probe();
        let time_source: Arc<dyn TimeSource> = Arc::new(TokioTimeSource::default());

        let engine = EngineHandle::new(
            self.config,
            Box::new(self.capture),
            Collaborators {
                permissions: permissions.clone(),
                notifications: notifier.clone(),
                display: display.clone(),
                time_source,
            },
        );

        TestRig {
            engine,
            notifier,
            display,
            permissions,
            probe,
        }
    }
}
