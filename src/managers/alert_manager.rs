// AlertManager: timer-driven notification dispatcher
//
// Single Responsibility: feed published snapshots and escalation deadlines
// into the pure `AlertEscalation` policy and carry out the resulting actions
// against the injected notification service.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use crate::alerts::{AlertAction, AlertEscalation, AlertPolicy, EscalationTier};
use crate::config::AlertConfig;
use crate::engine::backend::{NotificationService, TimeSource};
use crate::engine::core::TelemetryEventKind;
use crate::engine::task::{CancelToken, ScheduledTask};
use crate::error::{log_notification_error, MeteringError};
use crate::managers::{BroadcastChannelManager, MeteringSnapshot};

struct AlertState {
    escalation: AlertEscalation,
    task: Option<ScheduledTask>,
}

/// Owns the escalation state and the dispatcher task of the active session
///
/// The escalation state and every notification call happen under one lock,
/// and `halt()` cancels the dispatcher under that same lock, so no intent
/// is delivered once `halt()` has returned.
#[derive(Clone)]
pub struct AlertManager {
    state: Arc<Mutex<AlertState>>,
    notifications: Arc<dyn NotificationService>,
    time_source: Arc<dyn TimeSource>,
    broadcasts: BroadcastChannelManager,
    delivery_delay: Duration,
}

impl AlertManager {
    pub fn new(
        config: &AlertConfig,
        notifications: Arc<dyn NotificationService>,
        time_source: Arc<dyn TimeSource>,
        broadcasts: BroadcastChannelManager,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(AlertState {
                escalation: AlertEscalation::new(AlertPolicy::from_config(config)),
                task: None,
            })),
            notifications,
            time_source,
            broadcasts,
            delivery_delay: config.delivery_delay(),
        }
    }

    /// Start dispatching for a new active session
    ///
    /// Replaces any previous dispatcher and starts from a clean escalation.
    pub fn arm(&self, mut snapshots: watch::Receiver<MeteringSnapshot>) -> Result<(), MeteringError> {
        // Anything published from here on is a change the dispatcher must see
        snapshots.borrow_and_update();

        let mut state = self.lock_state()?;
        if let Some(task) = state.task.take() {
            task.cancel();
        }
        state.escalation.reset();

        let manager = self.clone();
        state.task = Some(ScheduledTask::spawn(move |token| {
            manager.dispatch(snapshots, token)
        })?);
        Ok(())
    }

    /// Stop dispatching, reset the escalation and cancel pending notifications
    pub fn disarm(&self) -> Result<(), MeteringError> {
        self.halt()?;
        self.cancel_pending();
        Ok(())
    }

    /// Stop dispatching and reset the escalation without touching the
    /// notification service. Safe to call while holding engine locks.
    pub fn halt(&self) -> Result<(), MeteringError> {
        let mut state = self.lock_state()?;
        if let Some(task) = state.task.take() {
            task.cancel();
        }
        state.escalation.reset();
        Ok(())
    }

    pub fn cancel_pending(&self) {
        self.notifications.cancel_all();
    }

    pub fn is_armed(&self) -> bool {
        self.lock_state()
            .map(|state| state.task.as_ref().is_some_and(|task| !task.is_finished()))
            .unwrap_or(false)
    }

    pub fn tier(&self) -> Result<EscalationTier, MeteringError> {
        Ok(self.lock_state()?.escalation.tier())
    }

    async fn dispatch(self, mut snapshots: watch::Receiver<MeteringSnapshot>, token: CancelToken) {
        loop {
            let deadline = match self.lock_state() {
                Ok(state) if !token.is_cancelled() => state.escalation.next_deadline(),
                _ => return,
            };

            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let snapshot = *snapshots.borrow_and_update();
                    if snapshot.is_active {
                        self.apply(&token, |escalation, now| escalation.observe(snapshot.status, now));
                    }
                }
                _ = wait_until(deadline) => {
                    self.apply(&token, |escalation, now| escalation.poll(now));
                }
            }
        }
    }

    fn apply<F>(&self, token: &CancelToken, step: F)
    where
        F: FnOnce(&mut AlertEscalation, Instant) -> Vec<AlertAction>,
    {
        let Ok(mut state) = self.lock_state() else {
            return;
        };
        if token.is_cancelled() {
            return;
        }

        let now = self.time_source.now();
        for action in step(&mut state.escalation, now) {
            self.execute(action);
        }
    }

    fn execute(&self, action: AlertAction) {
        match action {
            AlertAction::Notify(intent) => {
                match self
                    .notifications
                    .schedule(&intent, self.delivery_delay, false)
                {
                    Ok(()) => {
                        log::info!(
                            "[AlertManager] Scheduled {:?} after {}s in caution",
                            intent.kind,
                            intent.caution_elapsed.as_secs()
                        );
                        self.broadcasts.emit_event(
                            TelemetryEventKind::NotificationScheduled { kind: intent.kind },
                            None,
                        );
                    }
                    Err(err) => {
                        log_notification_error(&err, "schedule_notification");
                        self.broadcasts.emit_event(
                            TelemetryEventKind::NotificationFailed { kind: intent.kind },
                            Some(err.to_string()),
                        );
                    }
                }
            }
            AlertAction::CancelAll => {
                log::info!("[AlertManager] Status back to safe, cancelling notifications");
                self.notifications.cancel_all();
            }
        }
    }

    /// Safely acquire lock on the escalation state
    fn lock_state(&self) -> Result<MutexGuard<'_, AlertState>, MeteringError> {
        self.state.lock().map_err(|_| MeteringError::LockPoisoned {
            component: "alert_manager".to_string(),
        })
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
