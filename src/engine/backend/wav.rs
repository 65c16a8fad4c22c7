//! WAV replay capture device.
//!
//! Reads a mono recording up front and hands out one window of samples per
//! `current_power()` call, so a recording made at the metering cadence plays
//! back in real time. Once the recording runs out the device reports the
//! power floor.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::analysis::decibel::{power_dbfs, DEVICE_POWER_FLOOR};
use crate::error::MeteringError;

use super::CaptureDevice;

pub struct WavReplayCapture {
    samples: Vec<f32>,
    sample_rate: u32,
    window: usize,
    position: usize,
    running: bool,
}

impl WavReplayCapture {
    /// Load `path` and replay it in windows of `window` length
    pub fn open(path: &Path, window: Duration) -> Result<Self> {
        let (samples, sample_rate) = read_wav(path)?;
        Ok(Self::from_samples(samples, sample_rate, window))
    }

    /// Load several recordings and replay them back to back
    ///
    /// All recordings must share one sample rate.
    pub fn open_sequence<P: AsRef<Path>>(paths: &[P], window: Duration) -> Result<Self> {
        let mut samples = Vec::new();
        let mut sample_rate = None;
        for path in paths {
            let path = path.as_ref();
            let (chunk, rate) = read_wav(path)?;
            match sample_rate {
                Some(expected) if expected != rate => {
                    return Err(anyhow!(
                        "Recording {} is {} Hz, expected {} Hz",
                        path.display(),
                        rate,
                        expected
                    ))
                }
                _ => sample_rate = Some(rate),
            }
            samples.extend(chunk);
        }
        let sample_rate = sample_rate.ok_or_else(|| anyhow!("No recordings given"))?;
        Ok(Self::from_samples(samples, sample_rate, window))
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, window: Duration) -> Self {
        let window = ((sample_rate as f64 * window.as_secs_f64()).round() as usize).max(1);
        Self {
            samples,
            sample_rate,
            window,
            position: 0,
            running: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of readings left before the recording runs out
    pub fn remaining_windows(&self) -> usize {
        let remaining = self.samples.len().saturating_sub(self.position);
        remaining.div_ceil(self.window)
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.samples.len()
    }
}

impl CaptureDevice for WavReplayCapture {
    fn configure(&mut self) -> Result<(), MeteringError> {
        if self.samples.is_empty() {
            return Err(MeteringError::SessionConfig {
                reason: "recording contains no samples".to_string(),
            });
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), MeteringError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn current_power(&mut self) -> f32 {
        if !self.running || self.is_exhausted() {
            return DEVICE_POWER_FLOOR;
        }
        let end = (self.position + self.window).min(self.samples.len());
        let power = power_dbfs(&self.samples[self.position..end]);
        self.position = end;
        power
    }
}

fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(anyhow!(
            "Recording {} must be mono (found {} channels)",
            path.display(),
            spec.channels
        ));
    }

    let sample_rate = spec.sample_rate;

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| sample.map_err(|err| anyhow!(err)))
            .collect::<Result<Vec<f32>>>()?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) - 1;
            match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|sample| {
                        sample
                            .map(|value| value as f32 / max as f32)
                            .map_err(|err| anyhow!(err))
                    })
                    .collect::<Result<Vec<f32>>>()?,
                24 | 32 => reader
                    .samples::<i32>()
                    .map(|sample| {
                        sample
                            .map(|value| value as f32 / max as f32)
                            .map_err(|err| anyhow!(err))
                    })
                    .collect::<Result<Vec<f32>>>()?,
                other => {
                    return Err(anyhow!(
                        "Unsupported bits per sample {} in {}",
                        other,
                        path.display()
                    ))
                }
            }
        }
    };

    Ok((samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tone(path: &Path, amplitude: f32, seconds: f32, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let total = (seconds * sample_rate as f32) as usize;
        for i in 0..total {
            // Square wave keeps RMS equal to amplitude
            let value = if i % 2 == 0 { amplitude } else { -amplitude };
            writer
                .write_sample((value * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_replay_windows_from_file() {
        let path = std::env::temp_dir().join(format!("shh_wav_replay_{}.wav", std::process::id()));
        write_tone(&path, 0.1, 0.5, 8000);

        let mut capture = WavReplayCapture::open(&path, Duration::from_millis(100)).unwrap();
        assert_eq!(capture.sample_rate(), 8000);
        assert_eq!(capture.remaining_windows(), 5);

        capture.configure().unwrap();
        capture.start().unwrap();
        let power = capture.current_power();
        assert!((power + 20.0).abs() < 0.1, "got {power}");
        assert_eq!(capture.remaining_windows(), 4);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_sequence_concatenates_recordings() {
        let dir = std::env::temp_dir();
        let first = dir.join(format!("shh_wav_seq_a_{}.wav", std::process::id()));
        let second = dir.join(format!("shh_wav_seq_b_{}.wav", std::process::id()));
        write_tone(&first, 0.01, 0.3, 8000);
        write_tone(&second, 0.1, 0.2, 8000);

        let mut capture =
            WavReplayCapture::open_sequence(&[&first, &second], Duration::from_millis(100)).unwrap();
        assert_eq!(capture.remaining_windows(), 5);

        capture.start().unwrap();
        let powers: Vec<f32> = (0..5).map(|_| capture.current_power()).collect();
        assert!((powers[0] + 40.0).abs() < 0.2);
        assert!((powers[4] + 20.0).abs() < 0.1);

        std::fs::remove_file(&first).ok();
        std::fs::remove_file(&second).ok();
    }

    #[test]
    fn test_sequence_rejects_mixed_sample_rates() {
        let dir = std::env::temp_dir();
        let first = dir.join(format!("shh_wav_rate_a_{}.wav", std::process::id()));
        let second = dir.join(format!("shh_wav_rate_b_{}.wav", std::process::id()));
        write_tone(&first, 0.1, 0.1, 8000);
        write_tone(&second, 0.1, 0.1, 16000);

        assert!(WavReplayCapture::open_sequence(&[&first, &second], Duration::from_millis(100)).is_err());

        std::fs::remove_file(&first).ok();
        std::fs::remove_file(&second).ok();
    }

    #[test]
    fn test_exhausted_recording_reports_floor() {
        let mut capture =
            WavReplayCapture::from_samples(vec![0.5; 80], 800, Duration::from_millis(100));
        capture.start().unwrap();
        assert!(capture.current_power() > DEVICE_POWER_FLOOR);
        assert!(capture.is_exhausted());
        assert_eq!(capture.current_power(), DEVICE_POWER_FLOOR);
    }

    #[test]
    fn test_empty_recording_fails_configure() {
        let mut capture = WavReplayCapture::from_samples(Vec::new(), 8000, Duration::from_millis(100));
        assert!(matches!(
            capture.configure(),
            Err(MeteringError::SessionConfig { .. })
        ));
    }

    #[test]
    fn test_stopped_device_reports_floor() {
        let mut capture =
            WavReplayCapture::from_samples(vec![0.5; 800], 800, Duration::from_millis(100));
        assert_eq!(capture.current_power(), DEVICE_POWER_FLOOR);
        assert_eq!(capture.remaining_windows(), 10);
    }
}
