//! Integration tests for the metering lifecycle
//!
//! These tests drive a full `EngineHandle` through the public API with
//! recording collaborators and Tokio's paused clock:
//! - Calibration → start → escalation → pause/resume → stop
//! - Published snapshots as seen by an observer stream
//! - Stop idempotence and resource release
//! - Configurable cadences and escalation timings

use std::time::Duration;

use shh_meter::analysis::decibel::to_spl;
use shh_meter::config::{AlertConfig, AppConfig};
use shh_meter::engine::backend::ScriptedCapture;
use shh_meter::engine::TelemetryEventKind;
use shh_meter::testing::{DisplayCall, TestRig, QUIET_ROOM_POWER, RAISED_VOICE_POWER};
use shh_meter::{
    BackgroundBaseline, CalibrationOutcome, MeteringSnapshot, NoiseStatus, NotificationKind,
    SessionPhase, StartOutcome,
};
use tokio_stream::StreamExt;

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

async fn calibrate(rig: &TestRig) -> BackgroundBaseline {
    match rig.engine.calibrate().await {
        Ok(CalibrationOutcome::Completed(baseline)) => baseline,
        other => panic!("calibration failed: {other:?}"),
    }
}

/// Full session: quiet calibration, raised voice, back to quiet, stop
#[tokio::test(start_paused = true)]
async fn test_full_session_lifecycle() {
    // 3 s of quiet for calibration, 30 s of raised voice, then quiet again
    let capture = ScriptedCapture::from_readings(Vec::new())
        .then_repeat(QUIET_ROOM_POWER, 30)
        .then_repeat(RAISED_VOICE_POWER, 300)
        .then_hold(QUIET_ROOM_POWER);
    let rig = TestRig::builder().capture(capture).build();

    let baseline = calibrate(&rig).await;
    assert!((baseline.decibel() - 40.0).abs() < 1e-4);

    let outcome = rig.engine.start(baseline).await.unwrap();
    assert_eq!(outcome, StartOutcome::Started { first_start: true });

    sleep_ms(25_000).await;
    assert_eq!(rig.engine.snapshot().status, NoiseStatus::Caution);
    assert_eq!(
        rig.notifier.kinds(),
        vec![
            NotificationKind::Caution,
            NotificationKind::Persistent,
            NotificationKind::RecurringAlert,
        ]
    );

    // Voice drops at 30 s; the sliding window needs a few long ticks
    sleep_ms(10_000).await;
    assert_eq!(rig.engine.snapshot().status, NoiseStatus::Safe);
    assert_eq!(rig.notifier.cancellations(), 1);

    rig.engine.stop().unwrap();
    assert_eq!(rig.engine.phase().unwrap(), SessionPhase::Stopped);
    assert!(!rig.probe.is_running());
    assert_eq!(
        rig.display.calls(),
        vec![DisplayCall::Start { is_first_start: true }, DisplayCall::Stop]
    );

    // Nothing further once stopped
    sleep_ms(120_000).await;
    assert_eq!(rig.notifier.kinds().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_observer_sees_complete_snapshots() {
    let rig = TestRig::builder()
        .capture(ScriptedCapture::constant(RAISED_VOICE_POWER))
        .build();
    let mut stream = rig.engine.snapshot_stream();

    // Initial value
    assert_eq!(stream.next().await, Some(MeteringSnapshot::inactive()));

    let baseline = BackgroundBaseline::new(to_spl(QUIET_ROOM_POWER), 30);
    rig.engine.start(baseline).await.unwrap();

    let mut seen = Vec::new();
    while let Some(snapshot) = stream.next().await {
        seen.push(snapshot);
        if snapshot.status == NoiseStatus::Caution {
            break;
        }
    }

    let caution = seen.last().copied().unwrap();
    assert!(caution.is_active);
    assert!((caution.decibel - 55.0).abs() < 1e-3);
    assert!(caution.ratio > 1.5);
    assert!(seen.iter().all(|snapshot| snapshot.is_active));

    rig.engine.pause().unwrap();
    assert_eq!(stream.next().await, Some(MeteringSnapshot::inactive()));
}

#[tokio::test(start_paused = true)]
async fn test_pause_resume_restarts_escalation() {
    let rig = TestRig::builder()
        .capture(ScriptedCapture::constant(RAISED_VOICE_POWER))
        .build();
    let baseline = BackgroundBaseline::new(40.0, 30);

    rig.engine.start(baseline).await.unwrap();
    sleep_ms(10_000).await;
    rig.engine.pause().unwrap();

    let outcome = rig.engine.start(baseline).await.unwrap();
    assert_eq!(outcome, StartOutcome::Started { first_start: false });

    // Caution again 1.6 s after resuming, and a fresh tier-one intent
    sleep_ms(1_650).await;
    assert_eq!(
        rig.notifier.kinds(),
        vec![NotificationKind::Caution, NotificationKind::Caution]
    );

    // Persistent counts from the new caution entry, not the first one
    sleep_ms(15_000).await;
    assert_eq!(rig.notifier.count(NotificationKind::Persistent), 0);
    sleep_ms(5_000).await;
    assert_eq!(rig.notifier.count(NotificationKind::Persistent), 1);
}

#[tokio::test(start_paused = true)]
async fn test_double_stop_matches_single_stop() {
    let single = TestRig::builder().build();
    let double = TestRig::builder().build();
    let baseline = BackgroundBaseline::new(40.0, 30);

    for rig in [&single, &double] {
        rig.engine.start(baseline).await.unwrap();
    }
    sleep_ms(2_000).await;

    single.engine.stop().unwrap();
    double.engine.stop().unwrap();
    double.engine.stop().unwrap();

    assert_eq!(single.engine.phase().unwrap(), double.engine.phase().unwrap());
    assert_eq!(single.engine.snapshot(), double.engine.snapshot());
    assert_eq!(single.probe.stops(), double.probe.stops());
    assert_eq!(single.notifier.cancellations(), double.notifier.cancellations());
    assert_eq!(single.display.calls(), double.display.calls());
}

#[tokio::test(start_paused = true)]
async fn test_custom_alert_timings() {
    let config = AppConfig {
        alerts: AlertConfig {
            persistent_after_secs: 5,
            first_recurring_after_secs: 10,
            recurring_interval_secs: 10,
            delivery_delay_ms: 0,
        },
        ..AppConfig::default()
    };
    let rig = TestRig::builder()
        .config(config)
        .capture(ScriptedCapture::constant(RAISED_VOICE_POWER))
        .build();
    rig.engine
        .start(BackgroundBaseline::new(40.0, 30))
        .await
        .unwrap();

    // Caution at 1.6 s, persistent at 6.6 s, recurring at 11.6 s and 21.6 s
    sleep_ms(22_000).await;
    assert_eq!(
        rig.notifier.kinds(),
        vec![
            NotificationKind::Caution,
            NotificationKind::Persistent,
            NotificationKind::RecurringAlert,
            NotificationKind::RecurringAlert,
        ]
    );
    assert!(rig
        .notifier
        .scheduled()
        .iter()
        .all(|(_, delay, repeats)| delay.is_zero() && !repeats));
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_traces_lifecycle() {
    let rig = TestRig::builder().build();
    let mut telemetry = rig.engine.subscribe_telemetry();

    let baseline = calibrate(&rig).await;
    rig.engine.start(baseline).await.unwrap();
    rig.engine.pause().unwrap();
    rig.engine.stop().unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = telemetry.try_recv() {
        kinds.push(event.kind);
    }

    assert!(matches!(kinds[0], TelemetryEventKind::CalibrationStarted));
    assert!(matches!(
        kinds[1],
        TelemetryEventKind::CalibrationCompleted { .. }
    ));
    assert!(matches!(
        kinds[2],
        TelemetryEventKind::MeteringStarted { first_start: true }
    ));
    assert!(matches!(kinds[3], TelemetryEventKind::MeteringPaused));
    assert!(matches!(kinds[4], TelemetryEventKind::MeteringStopped));
}
