use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shh_meter::engine::backend::{
    CaptureDevice, GrantedPermissions, LoggingDisplay, NotificationService, ScriptedCapture,
    TokioTimeSource, WavReplayCapture,
};
use shh_meter::error::NotificationError;
use shh_meter::{
    AppConfig, BackgroundBaseline, BaselinePolicy, CalibrationOutcome, Collaborators, EngineHandle,
    MeteringSnapshot, NotificationIntent, NotificationKind, StartOutcome,
};
use tokio_stream::StreamExt;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "shh_cli",
    about = "Noise metering harness: calibrate, meter and print published state as JSON lines"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/meter_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Calibration attempts before giving up on a loud room
    #[arg(long, global = true, default_value_t = 3)]
    calibration_attempts: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Meter a synthetic background and user level
    Simulate {
        /// Ambient level during calibration (dBFS)
        #[arg(long, default_value_t = -60.0, allow_hyphen_values = true)]
        background_power: f32,
        /// User level while metering (dBFS)
        #[arg(long, default_value_t = -45.0, allow_hyphen_values = true)]
        user_power: f32,
        #[arg(long, default_value_t = 30)]
        seconds: u64,
        /// Uniform noise added to every reading (dB)
        #[arg(long, default_value_t = 0.0)]
        jitter: f32,
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
    /// Calibrate on the start of a recording and meter the rest
    Replay {
        #[arg(long)]
        wav: PathBuf,
        /// Separate ambient recording to calibrate on
        #[arg(long)]
        calibration_wav: Option<PathBuf>,
    },
    /// Meter the default input device
    #[cfg(not(target_os = "android"))]
    Live {
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum OutputLine {
    Calibration {
        baseline_db: f32,
        sample_count: usize,
        accepted: bool,
    },
    Snapshot(MeteringSnapshot),
    Notification {
        kind: NotificationKind,
        subtitle: String,
        body: String,
        delay_ms: u64,
    },
    NotificationsCancelled,
}

fn emit(line: &OutputLine) {
    match serde_json::to_string(line) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!("failed to serialize output line: {err}"),
    }
}

/// Prints every intent as a JSON line instead of delivering it
struct JsonLinesNotifier;

impl NotificationService for JsonLinesNotifier {
    fn schedule(
        &self,
        intent: &NotificationIntent,
        delay: Duration,
        _repeats: bool,
    ) -> Result<(), NotificationError> {
        emit(&OutputLine::Notification {
            kind: intent.kind,
            subtitle: intent.subtitle(),
            body: intent.body(),
            delay_ms: delay.as_millis() as u64,
        });
        Ok(())
    }

    fn cancel_all(&self) {
        emit(&OutputLine::NotificationsCancelled);
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building Tokio runtime")?;

    let attempts = cli.calibration_attempts.max(1);
    match cli.command {
        Commands::Simulate {
            background_power,
            user_power,
            seconds,
            jitter,
            seed,
        } => {
            let capture = ScriptedCapture::from_readings(Vec::new())
                .then_repeat(background_power, config.calibration.sample_count())
                .then_hold(user_power)
                .with_jitter(jitter, seed);
            runtime.block_on(run_session(
                config,
                Box::new(capture),
                attempts,
                Duration::from_secs(seconds),
            ))
        }
        Commands::Replay {
            wav,
            calibration_wav,
        } => {
            let window = config.metering.sample_interval();
            let mut paths = Vec::new();
            paths.extend(calibration_wav);
            paths.push(wav);
            let capture = WavReplayCapture::open_sequence(&paths, window)?;
            let metering_windows = capture
                .remaining_windows()
                .saturating_sub(config.calibration.sample_count());
            if metering_windows == 0 {
                bail!("recording is too short to meter after calibration");
            }
            let duration = window * metering_windows as u32;
            runtime.block_on(run_session(config, Box::new(capture), attempts, duration))
        }
        #[cfg(not(target_os = "android"))]
        Commands::Live { seconds } => {
            let capture = shh_meter::engine::backend::CpalCapture::new();
            runtime.block_on(run_session(
                config,
                Box::new(capture),
                attempts,
                Duration::from_secs(seconds),
            ))
        }
    }
}

async fn run_session(
    config: AppConfig,
    capture: Box<dyn CaptureDevice>,
    attempts: u32,
    duration: Duration,
) -> Result<()> {
    let policy = BaselinePolicy::from_config(&config.calibration);
    let engine = EngineHandle::new(
        config,
        capture,
        Collaborators {
            permissions: Arc::new(GrantedPermissions::default()),
            notifications: Arc::new(JsonLinesNotifier),
            display: Arc::new(LoggingDisplay::default()),
            time_source: Arc::new(TokioTimeSource::default()),
        },
    );

    let baseline = calibrate_with_policy(&engine, policy, attempts).await?;

    let mut snapshots = engine.snapshot_stream();
    let printer = tokio::spawn(async move {
        while let Some(snapshot) = snapshots.next().await {
            emit(&OutputLine::Snapshot(snapshot));
        }
    });

    match engine.start(baseline).await? {
        StartOutcome::Started { .. } => info!("metering for {:?}", duration),
        StartOutcome::PermissionRequired { status, .. } => {
            printer.abort();
            bail!("microphone permission {:?}", status);
        }
    }

    tokio::time::sleep(duration).await;
    engine.stop()?;
    // Let the printer flush the final inactive snapshot
    tokio::task::yield_now().await;
    printer.abort();
    Ok(())
}

async fn calibrate_with_policy(
    engine: &EngineHandle,
    policy: BaselinePolicy,
    attempts: u32,
) -> Result<BackgroundBaseline> {
    for attempt in 1..=attempts {
        let baseline = match engine.calibrate().await? {
            CalibrationOutcome::Completed(baseline) => baseline,
            CalibrationOutcome::PermissionRequired { status, .. } => {
                bail!("microphone permission {:?}", status)
            }
        };

        let accepted = policy.check(&baseline);
        emit(&OutputLine::Calibration {
            baseline_db: baseline.decibel(),
            sample_count: baseline.sample_count(),
            accepted: accepted.is_ok(),
        });
        match accepted {
            Ok(()) => return Ok(baseline),
            Err(err) => warn!("calibration attempt {attempt}/{attempts} rejected: {err}"),
        }
    }

    Err(anyhow!(
        "background stayed above {:.0} dB for {} calibration attempts",
        policy.max_plausible_db,
        attempts
    ))
}
