use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alerts::NotificationIntent;
use crate::analysis::decibel::DEVICE_POWER_FLOOR;
use crate::error::{MeteringError, NotificationError};

use super::{CaptureDevice, LiveStatusDisplay, NotificationService, PermissionService, PermissionStatus};

/// Lifecycle counters shared between a [`ScriptedCapture`] and its owner.
#[derive(Debug, Default)]
pub struct CaptureProbe {
    configures: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    readings: AtomicUsize,
    running: AtomicBool,
}

impl CaptureProbe {
    pub fn configures(&self) -> usize {
        self.configures.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn readings(&self) -> usize {
        self.readings.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Deterministic capture device used for tests and CLI simulation.
///
/// Replays a queue of power readings and then holds a fallback level.
/// Optional jitter adds uniform noise to every reading.
pub struct ScriptedCapture {
    readings: VecDeque<f32>,
    hold: f32,
    jitter_db: f32,
    rng: StdRng,
    configure_failure: Option<String>,
    start_failure: Option<String>,
    probe: Arc<CaptureProbe>,
}

impl ScriptedCapture {
    /// Device that reports the same power forever
    pub fn constant(power: f32) -> Self {
        Self::from_readings(Vec::new()).then_hold(power)
    }

    /// Device that replays `readings` and then reports silence
    pub fn from_readings(readings: Vec<f32>) -> Self {
        Self {
            readings: readings.into(),
            hold: DEVICE_POWER_FLOOR,
            jitter_db: 0.0,
            rng: StdRng::seed_from_u64(0x5eed),
            configure_failure: None,
            start_failure: None,
            probe: Arc::new(CaptureProbe::default()),
        }
    }

    /// Level reported once the scripted readings run out
    pub fn then_hold(mut self, power: f32) -> Self {
        self.hold = power;
        self
    }

    /// Append `count` copies of `power` to the script
    pub fn then_repeat(mut self, power: f32, count: usize) -> Self {
        self.readings.extend(std::iter::repeat(power).take(count));
        self
    }

    pub fn with_jitter(mut self, jitter_db: f32, seed: u64) -> Self {
        self.jitter_db = jitter_db.abs();
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn failing_configure(mut self, reason: impl Into<String>) -> Self {
        self.configure_failure = Some(reason.into());
        self
    }

    pub fn failing_start(mut self, reason: impl Into<String>) -> Self {
        self.start_failure = Some(reason.into());
        self
    }

    pub fn probe(&self) -> Arc<CaptureProbe> {
        Arc::clone(&self.probe)
    }
}

impl CaptureDevice for ScriptedCapture {
    fn configure(&mut self) -> Result<(), MeteringError> {
        self.probe.configures.fetch_add(1, Ordering::SeqCst);
        match &self.configure_failure {
            Some(reason) => Err(MeteringError::SessionConfig {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn start(&mut self) -> Result<(), MeteringError> {
        if let Some(reason) = &self.start_failure {
            return Err(MeteringError::CaptureFailed {
                reason: reason.clone(),
            });
        }
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        self.probe.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        if self.probe.running.swap(false, Ordering::SeqCst) {
            self.probe.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn current_power(&mut self) -> f32 {
        self.probe.readings.fetch_add(1, Ordering::SeqCst);
        let base = self.readings.pop_front().unwrap_or(self.hold);
        if self.jitter_db > 0.0 {
            base + self.rng.gen_range(-self.jitter_db..=self.jitter_db)
        } else {
            base
        }
    }
}

/// Permission service for desktop hosts, where the OS prompt happens
/// outside the process.
#[derive(Default)]
pub struct GrantedPermissions {
    _unit: (),
}

impl PermissionService for GrantedPermissions {
    fn status(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn request(&self) -> BoxFuture<'_, bool> {
        Box::pin(future::ready(true))
    }
}

/// Notification service that writes intents to the log.
#[derive(Default)]
pub struct LoggingNotifier {
    _unit: (),
}

impl NotificationService for LoggingNotifier {
    fn schedule(
        &self,
        intent: &NotificationIntent,
        delay: Duration,
        repeats: bool,
    ) -> Result<(), NotificationError> {
        info!(
            "[Notify] {} | {} (delay={:?}, repeats={})",
            intent.subtitle(),
            intent.body(),
            delay,
            repeats
        );
        Ok(())
    }

    fn cancel_all(&self) {
        info!("[Notify] cancelled all pending notifications");
    }
}

/// Live-status display that writes transitions to the log.
#[derive(Default)]
pub struct LoggingDisplay {
    _unit: (),
}

impl LiveStatusDisplay for LoggingDisplay {
    fn on_start(&self, is_first_start: bool) {
        info!("[LiveStatus] start (first_start={})", is_first_start);
    }

    fn on_update(&self, is_active: bool) {
        info!("[LiveStatus] update (active={})", is_active);
    }

    fn on_stop(&self) {
        info!("[LiveStatus] stop");
    }
}
