// CalibrationManager: Focused manager for the ambient sampling window
//
// Single Responsibility: calibration cadence, procedure state and progress
// broadcasting. Device ownership and phase bookkeeping stay with the
// metering controller, which hands in a reader for the next SPL sample.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::calibration::{BackgroundBaseline, BackgroundNoiseProcedure, CalibrationProgress};
use crate::config::CalibrationConfig;
use crate::engine::task::CancelToken;
use crate::error::{log_calibration_error, CalibrationError};
use crate::managers::BroadcastChannelManager;

/// Installed procedure and the token of the calibration that owns it
struct ActiveProcedure {
    owner: CancelToken,
    procedure: BackgroundNoiseProcedure,
}

/// Manages the background-noise calibration workflow
///
/// This manager handles:
/// - Installing a fresh `BackgroundNoiseProcedure` per calibration
/// - Sampling at the configured cadence until the window is full
/// - Broadcasting progress after every sample
/// - Thread-safe lock management
///
/// Every call after `begin` names the owning token. A calibration that was
/// cancelled or superseded can neither feed nor discard its successor.
///
/// # Example
/// ```ignore
/// manager.begin(&token)?;
/// let baseline = manager.collect(&token, || read_next_decibel()).await?;
/// ```
pub struct CalibrationManager {
    config: CalibrationConfig,
    procedure: Arc<Mutex<Option<ActiveProcedure>>>,
    broadcasts: BroadcastChannelManager,
}

impl CalibrationManager {
    pub fn new(config: CalibrationConfig, broadcasts: BroadcastChannelManager) -> Self {
        Self {
            config,
            procedure: Arc::new(Mutex::new(None)),
            broadcasts,
        }
    }

    /// Install a fresh procedure owned by `owner` and announce 0% progress
    ///
    /// # Errors
    /// - `AlreadyInProgress` if a procedure is installed
    /// - `StatePoisoned` on lock poisoning
    pub fn begin(&self, owner: &CancelToken) -> Result<(), CalibrationError> {
        let progress = {
            let mut procedure_guard = self.lock_procedure()?;
            if procedure_guard.is_some() {
                let err = CalibrationError::AlreadyInProgress;
                log_calibration_error(&err, "begin_calibration");
                return Err(err);
            }
            let procedure = BackgroundNoiseProcedure::from_config(&self.config);
            let progress = procedure.progress();
            *procedure_guard = Some(ActiveProcedure {
                owner: owner.clone(),
                procedure,
            });
            progress
        };

        log::info!(
            "[CalibrationManager] Sampling {} readings every {:?}",
            progress.samples_needed,
            self.config.sample_interval()
        );
        self.broadcasts.publish_calibration(progress);
        Ok(())
    }

    /// Sample until the window is full and produce the baseline
    ///
    /// `read_decibel` is called once per cadence tick, starting one interval
    /// after the call. Any error it returns aborts calibration and discards
    /// the procedure.
    pub async fn collect<F>(
        &self,
        owner: &CancelToken,
        mut read_decibel: F,
    ) -> Result<BackgroundBaseline, CalibrationError>
    where
        F: FnMut() -> Result<f32, CalibrationError>,
    {
        let period = self.config.sample_interval();
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let decibel = match read_decibel() {
                Ok(decibel) => decibel,
                Err(err) => {
                    self.abandon(owner);
                    return Err(err);
                }
            };

            let progress = self.record(owner, decibel)?;
            self.broadcasts.publish_calibration(progress);
            if progress.is_complete() {
                break;
            }
        }

        self.finish(owner)
    }

    /// Discard the procedure installed by `owner`, if it is still installed
    pub fn abandon(&self, owner: &CancelToken) {
        let mut guard = match self.procedure.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.as_ref().is_some_and(|active| active.owner.same_as(owner)) {
            *guard = None;
        }
    }

    /// Progress of the running calibration, `None` when idle
    pub fn progress(&self) -> Result<Option<CalibrationProgress>, CalibrationError> {
        Ok(self
            .lock_procedure()?
            .as_ref()
            .map(|active| active.procedure.progress()))
    }

    pub fn is_running(&self) -> bool {
        matches!(self.progress(), Ok(Some(_)))
    }

    // ========================================================================
    // HELPER METHODS - Lock management
    // ========================================================================

    fn record(&self, owner: &CancelToken, decibel: f32) -> Result<CalibrationProgress, CalibrationError> {
        let mut guard = self.lock_procedure()?;
        let active = guard
            .as_mut()
            .filter(|active| active.owner.same_as(owner) && !owner.is_cancelled())
            .ok_or(CalibrationError::Cancelled)?;
        Ok(active.procedure.add_sample(decibel))
    }

    fn finish(&self, owner: &CancelToken) -> Result<BackgroundBaseline, CalibrationError> {
        let procedure = {
            let mut guard = self.lock_procedure()?;
            if !guard.as_ref().is_some_and(|active| active.owner.same_as(owner)) {
                return Err(CalibrationError::Cancelled);
            }
            guard
                .take()
                .map(|active| active.procedure)
                .ok_or(CalibrationError::Cancelled)?
        };
        let baseline = procedure.finalize().inspect_err(|err| {
            log_calibration_error(err, "finish_calibration");
        })?;
        log::info!(
            "[CalibrationManager] Baseline {:.1} dB over {} samples",
            baseline.decibel(),
            baseline.sample_count()
        );
        Ok(baseline)
    }

    /// Safely acquire lock on calibration procedure
    fn lock_procedure(&self) -> Result<MutexGuard<'_, Option<ActiveProcedure>>, CalibrationError> {
        self.procedure
            .lock()
            .map_err(|_| CalibrationError::StatePoisoned)
    }
}
