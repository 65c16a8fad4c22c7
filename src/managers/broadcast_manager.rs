// BroadcastChannelManager: Published State and engine event channels
// Single Responsibility: channel lifecycle and subscription

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;

use crate::analysis::NoiseStatus;
use crate::calibration::CalibrationProgress;
use crate::engine::backend::TimeSource;
use crate::engine::core::{TelemetryEvent, TelemetryEventKind};

/// Atomic view of the metering state for observers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeteringSnapshot {
    pub decibel: f32,
    pub status: NoiseStatus,
    pub ratio: f32,
    pub is_active: bool,
}

impl MeteringSnapshot {
    /// Snapshot published whenever metering is paused or stopped
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Manages the engine's observer channels
///
/// # Channel Types
/// - Snapshots: latest `MeteringSnapshot` (watch, replaced atomically per tick)
/// - Calibration: per-sample progress while calibrating
/// - Telemetry: timestamped lifecycle events for diagnostics
///
/// Cloning the manager shares the same channels.
#[derive(Clone)]
pub struct BroadcastChannelManager {
    snapshots: watch::Sender<MeteringSnapshot>,
    calibration: broadcast::Sender<CalibrationProgress>,
    telemetry: broadcast::Sender<TelemetryEvent>,
    time_source: Arc<dyn TimeSource>,
    start_instant: Instant,
}

impl BroadcastChannelManager {
    pub fn new(time_source: Arc<dyn TimeSource>) -> Self {
        let (snapshots, _) = watch::channel(MeteringSnapshot::inactive());
        // 30 progress updates per calibration, with margin
        let (calibration, _) = broadcast::channel(50);
        let (telemetry, _) = broadcast::channel(128);
        let start_instant = time_source.now();
        Self {
            snapshots,
            calibration,
            telemetry,
            time_source,
            start_instant,
        }
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    /// Replace the published snapshot
    ///
    /// Subscribers are only woken when the value actually changed.
    pub fn publish_snapshot(&self, snapshot: MeteringSnapshot) {
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    pub fn snapshot(&self) -> MeteringSnapshot {
        *self.snapshots.borrow()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<MeteringSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot_stream(&self) -> WatchStream<MeteringSnapshot> {
        WatchStream::new(self.subscribe_snapshots())
    }

    // ========================================================================
    // CALIBRATION CHANNEL
    // ========================================================================

    pub fn publish_calibration(&self, progress: CalibrationProgress) {
        // No subscribers is not an error
        let _ = self.calibration.send(progress);
    }

    pub fn subscribe_calibration(&self) -> broadcast::Receiver<CalibrationProgress> {
        self.calibration.subscribe()
    }

    // ========================================================================
    // TELEMETRY CHANNEL
    // ========================================================================

    pub fn emit_event(&self, kind: TelemetryEventKind, detail: Option<String>) {
        let timestamp_ms = self
            .time_source
            .now()
            .saturating_duration_since(self.start_instant)
            .as_millis() as u64;
        let _ = self.telemetry.send(TelemetryEvent {
            timestamp_ms,
            kind,
            detail,
        });
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.telemetry.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::TokioTimeSource;
    use std::time::Duration;

    fn manager() -> BroadcastChannelManager {
        BroadcastChannelManager::new(Arc::new(TokioTimeSource::default()))
    }

    #[test]
    fn test_initial_snapshot_is_inactive() {
        let manager = manager();
        assert_eq!(manager.snapshot(), MeteringSnapshot::inactive());
        assert!(!manager.snapshot().is_active);
    }

    #[test]
    fn test_unchanged_snapshot_does_not_wake_subscribers() {
        let manager = manager();
        let mut rx = manager.subscribe_snapshots();

        manager.publish_snapshot(MeteringSnapshot::inactive());
        assert!(!rx.has_changed().unwrap());

        let active = MeteringSnapshot {
            decibel: 55.0,
            status: NoiseStatus::Caution,
            ratio: 1.43,
            is_active: true,
        };
        manager.publish_snapshot(active);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), active);
    }

    #[test]
    fn test_calibration_multiple_subscribers() {
        let manager = manager();
        let mut rx1 = manager.subscribe_calibration();
        let mut rx2 = manager.subscribe_calibration();

        manager.publish_calibration(CalibrationProgress::new(3, 30, 41.0));

        assert_eq!(rx1.try_recv().unwrap().samples_collected, 3);
        assert_eq!(rx2.try_recv().unwrap().samples_collected, 3);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let manager = manager();
        manager.publish_calibration(CalibrationProgress::new(1, 30, 40.0));
        manager.emit_event(TelemetryEventKind::MeteringPaused, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_timestamps_follow_clock() {
        let manager = manager();
        let mut rx = manager.subscribe_telemetry();

        tokio::time::advance(Duration::from_millis(1500)).await;
        manager.emit_event(TelemetryEventKind::MeteringStopped, Some("test".to_string()));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.timestamp_ms, 1500);
        assert_eq!(event.detail.as_deref(), Some("test"));
    }
}
