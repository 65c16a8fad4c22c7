//! CPAL-based capture device for desktop platforms (Linux, macOS, Windows)
//!
//! `cpal::Stream` is not `Send`, so the stream lives on a dedicated thread
//! for as long as capture is running. The input callback accumulates signal
//! energy into atomics; `current_power()` drains the accumulator and reports
//! the average power since the previous reading in dBFS.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};

use crate::analysis::decibel::DEVICE_POWER_FLOOR;
use crate::error::MeteringError;

use super::CaptureDevice;

/// Lock-free energy accumulator shared with the audio callback
#[derive(Default)]
struct PowerAccumulator {
    sum_squares: AtomicU64,
    frames: AtomicU64,
}

impl PowerAccumulator {
    fn add(&self, sum_squares: f64, frames: u64) {
        let _ = self
            .sum_squares
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + sum_squares).to_bits())
            });
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    fn drain_dbfs(&self) -> f32 {
        let sum_squares = f64::from_bits(self.sum_squares.swap(0f64.to_bits(), Ordering::AcqRel));
        let frames = self.frames.swap(0, Ordering::AcqRel);
        if frames == 0 || sum_squares <= 0.0 {
            return DEVICE_POWER_FLOOR;
        }
        let rms = (sum_squares / frames as f64).sqrt();
        ((20.0 * rms.log10()) as f32).max(DEVICE_POWER_FLOOR)
    }
}

struct RunningStream {
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Live microphone capture through the default CPAL input device
#[derive(Default)]
pub struct CpalCapture {
    accumulator: Arc<PowerAccumulator>,
    running: Option<RunningStream>,
}

impl CpalCapture {
    pub fn new() -> Self {
        Self::default()
    }

    fn default_input() -> Result<(cpal::Device, cpal::SupportedStreamConfig), MeteringError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| MeteringError::SessionConfig {
                reason: "No default input device found".to_string(),
            })?;

        let config = device
            .default_input_config()
            .map_err(|e| MeteringError::SessionConfig {
                reason: format!("Failed to get default input config: {:?}", e),
            })?;

        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(MeteringError::SessionConfig {
                reason: "Only F32 sample format is currently supported for input".to_string(),
            });
        }

        Ok((device, config))
    }

    fn build_stream(
        device: &cpal::Device,
        config: &cpal::SupportedStreamConfig,
        accumulator: Arc<PowerAccumulator>,
    ) -> Result<cpal::Stream, MeteringError> {
        let stream_config: cpal::StreamConfig = config.clone().into();
        let channels_count = (stream_config.channels as usize).max(1);
        let err_fn = |err| error!("Input stream error: {}", err);

        device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // First channel only
                    let mut sum_squares = 0.0f64;
                    let mut frames = 0u64;
                    for frame in data.chunks(channels_count) {
                        let sample = f64::from(frame[0]);
                        sum_squares += sample * sample;
                        frames += 1;
                    }
                    accumulator.add(sum_squares, frames);
                },
                err_fn,
                None,
            )
            .map_err(|e| MeteringError::CaptureFailed {
                reason: format!("{:?}", e),
            })
    }
}

impl CaptureDevice for CpalCapture {
    fn configure(&mut self) -> Result<(), MeteringError> {
        let (device, config) = Self::default_input()?;
        info!(
            "[CpalCapture] input device {:?} at {} Hz, {} channel(s)",
            device.name().unwrap_or_default(),
            config.sample_rate().0,
            config.channels()
        );
        Ok(())
    }

    fn start(&mut self) -> Result<(), MeteringError> {
        if self.running.is_some() {
            return Ok(());
        }

        let accumulator = Arc::clone(&self.accumulator);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), MeteringError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("shh-capture".to_string())
            .spawn(move || {
                let stream = Self::default_input().and_then(|(device, config)| {
                    let stream = Self::build_stream(&device, &config, accumulator)?;
                    stream.play().map_err(|e| MeteringError::CaptureFailed {
                        reason: format!("Input start failed: {}", e),
                    })?;
                    Ok(stream)
                });

                match stream {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Park until stop() or the owner is dropped
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })?;

        let started = ready_rx.recv().map_err(|_| MeteringError::CaptureFailed {
            reason: "capture thread exited before the stream started".to_string(),
        })?;

        match started {
            Ok(()) => {
                self.accumulator.drain_dbfs();
                self.running = Some(RunningStream { stop_tx, thread });
                Ok(())
            }
            Err(err) => {
                let _ = thread.join();
                Err(err)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop_tx.send(());
            if running.thread.join().is_err() {
                error!("[CpalCapture] capture thread panicked");
            }
        }
    }

    fn current_power(&mut self) -> f32 {
        self.accumulator.drain_dbfs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_average_power() {
        let accumulator = PowerAccumulator::default();
        // Full-scale square wave: 0 dBFS
        accumulator.add(4.0, 4);
        assert!(accumulator.drain_dbfs().abs() < 1e-4);
        // Drained: nothing since the last reading
        assert_eq!(accumulator.drain_dbfs(), DEVICE_POWER_FLOOR);
    }

    #[test]
    fn test_accumulator_combines_blocks() {
        let accumulator = PowerAccumulator::default();
        // 0.1 amplitude over two blocks: -20 dBFS
        accumulator.add(0.01 * 16.0, 16);
        accumulator.add(0.01 * 16.0, 16);
        assert!((accumulator.drain_dbfs() + 20.0).abs() < 1e-3);
    }
}
