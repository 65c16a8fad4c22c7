//! EngineHandle: the metering controller.
//!
//! Owns the capture device, the session phase and the single periodic tick
//! task, and wires calibration, the alert dispatcher and the published state
//! together. Every collaborator is injected at construction.
//!
//! Locking: the session core sits behind one `std::sync::Mutex` that is never
//! held across an `.await`. The tick task publishes each snapshot while
//! holding it, and `pause()` / `stop()` cancel the tick task under it, so no
//! tick lands after either returns. Lock order is core, then alerts, then
//! the calibration procedure. Injected collaborators are only called after
//! the core lock is released.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;

use crate::alerts::NotificationKind;
use crate::analysis::decibel::to_spl;
use crate::analysis::NoiseStatus;
use crate::calibration::{BackgroundBaseline, CalibrationProgress};
use crate::config::AppConfig;
use crate::engine::backend::{
    CaptureDevice, GrantedPermissions, LiveStatusDisplay, LoggingDisplay, LoggingNotifier,
    NotificationService, PermissionService, PermissionStatus, TimeSource, TokioTimeSource,
};
use crate::engine::session::MeteringSession;
use crate::engine::task::{CancelToken, ScheduledTask};
use crate::error::{log_calibration_error, log_metering_error, CalibrationError, MeteringError};
use crate::managers::{AlertManager, BroadcastChannelManager, CalibrationManager, MeteringSnapshot};

/// Lifecycle phase of the metering controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Calibrating,
    Active,
    Paused,
    Stopped,
}

/// Result of `EngineHandle::start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Metering is running. `first_start` is false when resuming from pause.
    Started { first_start: bool },
    /// Microphone access was not granted yet; the prompt has been shown.
    /// Call `start` again once `granted` is true.
    PermissionRequired {
        status: PermissionStatus,
        granted: bool,
    },
}

/// Result of `EngineHandle::calibrate`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationOutcome {
    Completed(BackgroundBaseline),
    PermissionRequired {
        status: PermissionStatus,
        granted: bool,
    },
}

/// Telemetry event emitted by the engine core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp_ms: u64,
    pub kind: TelemetryEventKind,
    pub detail: Option<String>,
}

/// Types of telemetry events supported by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TelemetryEventKind {
    CalibrationStarted,
    CalibrationCompleted { baseline_db: f32 },
    CalibrationCancelled,
    PermissionRequired { status: PermissionStatus },
    MeteringStarted { first_start: bool },
    MeteringPaused,
    MeteringStopped,
    StatusChanged { status: NoiseStatus, mean_ratio: f32 },
    NotificationScheduled { kind: NotificationKind },
    NotificationFailed { kind: NotificationKind },
    Warning,
}

/// Injected collaborators
#[derive(Clone)]
pub struct Collaborators {
    pub permissions: Arc<dyn PermissionService>,
    pub notifications: Arc<dyn NotificationService>,
    pub display: Arc<dyn LiveStatusDisplay>,
    pub time_source: Arc<dyn TimeSource>,
}

impl Collaborators {
    /// Desktop defaults: permission always granted, notifications and the
    /// live-status display go to the log.
    pub fn desktop() -> Self {
        Self {
            permissions: Arc::new(GrantedPermissions::default()),
            notifications: Arc::new(LoggingNotifier::default()),
            display: Arc::new(LoggingDisplay::default()),
            time_source: Arc::new(TokioTimeSource::default()),
        }
    }
}

struct SessionCore {
    phase: SessionPhase,
    has_started: bool,
    capture: Box<dyn CaptureDevice>,
    session: Option<MeteringSession>,
    tick_task: Option<ScheduledTask>,
    calibration: Option<CancelToken>,
}

impl SessionCore {
    /// Cancel the tick task and release the device. Caller holds the lock.
    fn halt_metering(&mut self) {
        if let Some(task) = self.tick_task.take() {
            task.cancel();
        }
        self.capture.stop();
    }
}

/// Ends a calibration exactly once, on completion or when `calibrate()` is
/// dropped mid-flight.
struct CalibrationGuard<'a> {
    engine: &'a EngineHandle,
    token: CancelToken,
    previous: SessionPhase,
    finished: bool,
}

impl CalibrationGuard<'_> {
    fn finish(mut self) -> Result<CancelToken, CalibrationError> {
        self.finished = true;
        self.engine.end_calibration(&self.token, self.previous)?;
        Ok(self.token.clone())
    }
}

impl Drop for CalibrationGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        log::info!("[EngineHandle] Calibration dropped before completion");
        if let Err(err) = self.engine.end_calibration(&self.token, self.previous) {
            log_calibration_error(&err, "calibrate_dropped");
        }
        self.token.cancel();
    }
}

/// EngineHandle orchestrates calibration, metering and alerting.
pub struct EngineHandle {
    config: AppConfig,
    core: Arc<Mutex<SessionCore>>,
    permissions: Arc<dyn PermissionService>,
    display: Arc<dyn LiveStatusDisplay>,
    calibration: CalibrationManager,
    alerts: AlertManager,
    pub(crate) broadcasts: BroadcastChannelManager,
}

impl EngineHandle {
    pub fn new(config: AppConfig, capture: Box<dyn CaptureDevice>, collaborators: Collaborators) -> Self {
        let broadcasts = BroadcastChannelManager::new(Arc::clone(&collaborators.time_source));
        let calibration = CalibrationManager::new(config.calibration.clone(), broadcasts.clone());
        let alerts = AlertManager::new(
            &config.alerts,
            collaborators.notifications,
            collaborators.time_source,
            broadcasts.clone(),
        );

        Self {
            config,
            core: Arc::new(Mutex::new(SessionCore {
                phase: SessionPhase::Idle,
                has_started: false,
                capture,
                session: None,
                tick_task: None,
                calibration: None,
            })),
            permissions: collaborators.permissions,
            display: collaborators.display,
            calibration,
            alerts,
            broadcasts,
        }
    }

    /// Engine with the desktop collaborators
    pub fn desktop(config: AppConfig, capture: Box<dyn CaptureDevice>) -> Self {
        Self::new(config, capture, Collaborators::desktop())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // ========================================================================
    // CALIBRATION
    // ========================================================================

    /// Sample the ambient level and produce a baseline
    ///
    /// Allowed from Idle, Paused and Stopped; the previous phase is restored
    /// afterwards, also when the returned future is dropped early. Stopping
    /// the engine while this runs releases the device and fails the call with
    /// `Cancelled`.
    pub async fn calibrate(&self) -> Result<CalibrationOutcome, CalibrationError> {
        let (token, previous) = self.begin_calibration().inspect_err(|err| {
            log_calibration_error(err, "calibrate");
        })?;
        let guard = CalibrationGuard {
            engine: self,
            token,
            previous,
            finished: false,
        };
        self.broadcasts
            .emit_event(TelemetryEventKind::CalibrationStarted, None);

        let status = self.permissions.status();
        if status != PermissionStatus::Granted {
            let granted = self.permissions.request().await;
            log::info!(
                "[EngineHandle] Microphone permission {:?}, prompt granted={}",
                status,
                granted
            );
            let token = guard.finish()?;
            if token.is_cancelled() {
                self.broadcasts
                    .emit_event(TelemetryEventKind::CalibrationCancelled, None);
                return Err(CalibrationError::Cancelled);
            }
            self.broadcasts
                .emit_event(TelemetryEventKind::PermissionRequired { status }, None);
            return Ok(CalibrationOutcome::PermissionRequired { status, granted });
        }

        if let Err(err) = self.start_calibration_capture(&guard.token) {
            guard.finish()?;
            log_calibration_error(&err, "calibrate");
            return Err(err);
        }

        let result = self
            .calibration
            .collect(&guard.token, || self.read_calibration_sample(&guard.token))
            .await;
        guard.finish()?;

        match result {
            Ok(baseline) => {
                self.broadcasts.emit_event(
                    TelemetryEventKind::CalibrationCompleted {
                        baseline_db: baseline.decibel(),
                    },
                    None,
                );
                Ok(CalibrationOutcome::Completed(baseline))
            }
            Err(err) => {
                if err == CalibrationError::Cancelled {
                    self.broadcasts
                        .emit_event(TelemetryEventKind::CalibrationCancelled, None);
                }
                log_calibration_error(&err, "calibrate");
                Err(err)
            }
        }
    }

    fn begin_calibration(&self) -> Result<(CancelToken, SessionPhase), CalibrationError> {
        let mut core = self.lock_core().map_err(|_| CalibrationError::StatePoisoned)?;
        match core.phase {
            SessionPhase::Calibrating => return Err(CalibrationError::AlreadyInProgress),
            SessionPhase::Active => return Err(CalibrationError::MeteringActive),
            SessionPhase::Idle | SessionPhase::Paused | SessionPhase::Stopped => {}
        }

        core.capture
            .configure()
            .map_err(|err| CalibrationError::SessionConfig {
                reason: err.to_string(),
            })?;
        let token = CancelToken::new();
        self.calibration.begin(&token)?;

        let previous = core.phase;
        core.phase = SessionPhase::Calibrating;
        core.calibration = Some(token.clone());
        log::info!("[EngineHandle] Calibration started from {:?}", previous);
        Ok((token, previous))
    }

    fn start_calibration_capture(&self, token: &CancelToken) -> Result<(), CalibrationError> {
        let mut core = self.lock_core().map_err(|_| CalibrationError::StatePoisoned)?;
        if token.is_cancelled() {
            return Err(CalibrationError::Cancelled);
        }
        core.capture.start().map_err(|err| {
            core.capture.stop();
            CalibrationError::CaptureFailed {
                reason: err.to_string(),
            }
        })
    }

    fn read_calibration_sample(&self, token: &CancelToken) -> Result<f32, CalibrationError> {
        let mut core = self.lock_core().map_err(|_| CalibrationError::StatePoisoned)?;
        if token.is_cancelled() {
            return Err(CalibrationError::Cancelled);
        }
        Ok(to_spl(core.capture.current_power()))
    }

    /// Release the device and restore the previous phase, unless `stop()`
    /// already took over the session.
    fn end_calibration(&self, token: &CancelToken, previous: SessionPhase) -> Result<(), CalibrationError> {
        let mut core = match self.core.lock() {
            Ok(core) => core,
            Err(_) => {
                self.calibration.abandon(token);
                return Err(CalibrationError::StatePoisoned);
            }
        };
        self.calibration.abandon(token);
        if token.is_cancelled() {
            return Ok(());
        }
        core.capture.stop();
        core.calibration = None;
        core.phase = previous;
        Ok(())
    }

    // ========================================================================
    // METERING
    // ========================================================================

    /// Start (or resume) metering against `baseline`
    ///
    /// # Errors
    /// - `AlreadyRunning` / `CalibrationInProgress` for the wrong phase
    /// - `SessionConfig` / `CaptureFailed` when the device cannot start; it
    ///   is released before returning
    /// - `NoRuntime` outside a Tokio runtime
    pub async fn start(&self, baseline: BackgroundBaseline) -> Result<StartOutcome, MeteringError> {
        self.check_can_start()?;

        let status = self.permissions.status();
        if status != PermissionStatus::Granted {
            let granted = self.permissions.request().await;
            log::info!(
                "[EngineHandle] Microphone permission {:?}, prompt granted={}",
                status,
                granted
            );
            self.broadcasts
                .emit_event(TelemetryEventKind::PermissionRequired { status }, None);
            return Ok(StartOutcome::PermissionRequired { status, granted });
        }

        let first_start = self.start_metering(baseline).inspect_err(|err| {
            log_metering_error(err, "start");
        })?;
        self.broadcasts
            .emit_event(TelemetryEventKind::MeteringStarted { first_start }, None);
        Ok(StartOutcome::Started { first_start })
    }

    fn check_can_start(&self) -> Result<(), MeteringError> {
        match self.lock_core()?.phase {
            SessionPhase::Active => Err(MeteringError::AlreadyRunning),
            SessionPhase::Calibrating => Err(MeteringError::CalibrationInProgress),
            SessionPhase::Idle | SessionPhase::Paused | SessionPhase::Stopped => Ok(()),
        }
    }

    fn start_metering(&self, baseline: BackgroundBaseline) -> Result<bool, MeteringError> {
        let mut guard = self.lock_core()?;
        // The phase may have moved while the permission prompt was up
        match guard.phase {
            SessionPhase::Active => return Err(MeteringError::AlreadyRunning),
            SessionPhase::Calibrating => return Err(MeteringError::CalibrationInProgress),
            SessionPhase::Idle | SessionPhase::Paused | SessionPhase::Stopped => {}
        }

        let core = &mut *guard;
        if let Err(err) = core.capture.configure().and_then(|_| core.capture.start()) {
            core.capture.stop();
            return Err(err);
        }

        let session = MeteringSession::new(baseline, &self.config.metering);
        let snapshot = session.snapshot(true);
        core.session = Some(session);

        let period = self.config.metering.sample_interval();
        let core_arc = Arc::clone(&self.core);
        let broadcasts = self.broadcasts.clone();
        let tick_task = ScheduledTask::spawn(move |token| {
            run_ticks(core_arc, broadcasts, token, period)
        });
        let tick_task = match tick_task {
            Ok(task) => task,
            Err(err) => {
                core.session = None;
                core.capture.stop();
                return Err(err);
            }
        };

        if let Err(err) = self.alerts.arm(self.broadcasts.subscribe_snapshots()) {
            tick_task.cancel();
            core.session = None;
            core.capture.stop();
            return Err(err);
        }

        let first_start = !core.has_started;
        core.tick_task = Some(tick_task);
        core.has_started = true;
        core.phase = SessionPhase::Active;
        core.calibration = None;

        self.broadcasts.publish_snapshot(snapshot);
        drop(guard);

        if first_start {
            self.display.on_start(true);
        } else {
            self.display.on_update(true);
        }

        log::info!(
            "[EngineHandle] Metering {} against baseline {:.1} dB",
            if first_start { "started" } else { "resumed" },
            baseline.decibel()
        );
        Ok(first_start)
    }

    /// Suspend metering, keeping the "has started" flag
    ///
    /// # Errors
    /// `NotRunning` unless metering is active.
    pub fn pause(&self) -> Result<(), MeteringError> {
        let mut core = self.lock_core()?;
        if core.phase != SessionPhase::Active {
            let err = MeteringError::NotRunning;
            log_metering_error(&err, "pause");
            return Err(err);
        }

        core.halt_metering();
        if let Some(session) = core.session.as_mut() {
            session.reset();
        }
        core.phase = SessionPhase::Paused;

        self.broadcasts.publish_snapshot(MeteringSnapshot::inactive());
        if let Err(err) = self.alerts.halt() {
            log_metering_error(&err, "pause");
        }
        drop(core);

        self.alerts.cancel_pending();
        self.display.on_update(false);

        log::info!("[EngineHandle] Metering paused");
        self.broadcasts
            .emit_event(TelemetryEventKind::MeteringPaused, None);
        Ok(())
    }

    /// Tear the session down from any phase. Idempotent.
    ///
    /// A running calibration is cancelled and its procedure discarded before
    /// this returns, so `calibrate()` can be called again right away.
    pub fn stop(&self) -> Result<(), MeteringError> {
        let mut core = self.lock_core()?;
        match core.phase {
            SessionPhase::Idle | SessionPhase::Stopped => return Ok(()),
            SessionPhase::Calibrating => {
                if let Some(token) = core.calibration.take() {
                    token.cancel();
                    self.calibration.abandon(&token);
                }
                core.capture.stop();
            }
            SessionPhase::Active | SessionPhase::Paused => core.halt_metering(),
        }

        let was_started = core.has_started;
        core.session = None;
        core.has_started = false;
        core.phase = SessionPhase::Stopped;

        self.broadcasts.publish_snapshot(MeteringSnapshot::inactive());
        if let Err(err) = self.alerts.halt() {
            log_metering_error(&err, "stop");
        }
        drop(core);

        self.alerts.cancel_pending();
        if was_started {
            self.display.on_stop();
        }

        log::info!("[EngineHandle] Metering stopped");
        self.broadcasts
            .emit_event(TelemetryEventKind::MeteringStopped, None);
        Ok(())
    }

    // ========================================================================
    // PUBLISHED STATE
    // ========================================================================

    pub fn phase(&self) -> Result<SessionPhase, MeteringError> {
        Ok(self.lock_core()?.phase)
    }

    pub fn snapshot(&self) -> MeteringSnapshot {
        self.broadcasts.snapshot()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<MeteringSnapshot> {
        self.broadcasts.subscribe_snapshots()
    }

    pub fn snapshot_stream(&self) -> WatchStream<MeteringSnapshot> {
        self.broadcasts.snapshot_stream()
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.broadcasts.subscribe_telemetry()
    }

    pub fn subscribe_calibration(&self) -> broadcast::Receiver<CalibrationProgress> {
        self.broadcasts.subscribe_calibration()
    }

    pub fn calibration_progress(&self) -> Result<Option<CalibrationProgress>, CalibrationError> {
        self.calibration.progress()
    }

    /// Safely acquire lock on the session core
    fn lock_core(&self) -> Result<MutexGuard<'_, SessionCore>, MeteringError> {
        self.core.lock().map_err(|_| MeteringError::LockPoisoned {
            component: "session_core".to_string(),
        })
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log_metering_error(&err, "drop");
        }
    }
}

async fn run_ticks(
    core: Arc<Mutex<SessionCore>>,
    broadcasts: BroadcastChannelManager,
    token: CancelToken,
    period: Duration,
) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if !tick_once(&core, &broadcasts, &token) {
            break;
        }
    }
}

/// One sampling tick. Returns false once the task should end.
fn tick_once(core: &Mutex<SessionCore>, broadcasts: &BroadcastChannelManager, token: &CancelToken) -> bool {
    let mut guard = match core.lock() {
        Ok(guard) => guard,
        Err(_) => {
            log::error!("[EngineHandle] Session core poisoned, ending tick task");
            return false;
        }
    };
    if token.is_cancelled() {
        return false;
    }

    let core = &mut *guard;
    let Some(session) = core.session.as_mut() else {
        return false;
    };

    let power = core.capture.current_power();
    match session.tick(power) {
        Ok(outcome) => {
            broadcasts.publish_snapshot(session.snapshot(true));
            if let Some(classification) = outcome.classification.filter(|_| outcome.status_changed) {
                log::info!(
                    "[EngineHandle] Status {} (mean ratio {:.2})",
                    classification.status.display_name(),
                    classification.mean_ratio
                );
                broadcasts.emit_event(
                    TelemetryEventKind::StatusChanged {
                        status: classification.status,
                        mean_ratio: classification.mean_ratio,
                    },
                    None,
                );
            }
        }
        Err(err) => {
            log_metering_error(&err, "tick");
            broadcasts.emit_event(TelemetryEventKind::Warning, Some(err.to_string()));
        }
    }
    true
}

// ========================================================================
// TEST HELPERS
// ========================================================================
