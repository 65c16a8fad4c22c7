// BackgroundNoiseProcedure - ambient sample collection
//
// Accumulates a fixed number of SPL readings into a running mean. The
// procedure is synchronous and clock-free; the calibration manager drives it
// from the capture device at the configured cadence.

use crate::calibration::progress::CalibrationProgress;
use crate::calibration::state::BackgroundBaseline;
use crate::config::CalibrationConfig;
use crate::error::CalibrationError;

#[derive(Debug, Clone)]
pub struct BackgroundNoiseProcedure {
    samples_needed: usize,
    samples_collected: usize,
    decibel_sum: f64,
}

impl BackgroundNoiseProcedure {
    /// Create a new procedure
    ///
    /// # Arguments
    /// * `samples_needed` - Number of readings averaged into the baseline
    pub fn new(samples_needed: usize) -> Self {
        Self {
            samples_needed: samples_needed.max(1),
            samples_collected: 0,
            decibel_sum: 0.0,
        }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(config.sample_count())
    }

    /// Record one SPL reading. Readings past the window are ignored.
    pub fn add_sample(&mut self, decibel: f32) -> CalibrationProgress {
        if !self.is_complete() {
            self.decibel_sum += f64::from(decibel);
            self.samples_collected += 1;
        }
        self.progress()
    }

    pub fn progress(&self) -> CalibrationProgress {
        CalibrationProgress::new(
            self.samples_collected,
            self.samples_needed,
            self.running_mean(),
        )
    }

    pub fn is_complete(&self) -> bool {
        self.samples_collected >= self.samples_needed
    }

    fn running_mean(&self) -> f32 {
        if self.samples_collected == 0 {
            return 0.0;
        }
        (self.decibel_sum / self.samples_collected as f64) as f32
    }

    /// Produce the baseline
    ///
    /// # Errors
    /// `InsufficientSamples` if the window has not been filled.
    pub fn finalize(&self) -> Result<BackgroundBaseline, CalibrationError> {
        if !self.is_complete() {
            return Err(CalibrationError::InsufficientSamples {
                required: self.samples_needed,
                collected: self.samples_collected,
            });
        }
        Ok(BackgroundBaseline::new(
            self.running_mean(),
            self.samples_collected,
        ))
    }
}

impl Default for BackgroundNoiseProcedure {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_needs_thirty_samples() {
        let procedure = BackgroundNoiseProcedure::default();
        assert_eq!(procedure.progress().samples_needed, 30);
        assert!(!procedure.is_complete());
    }

    #[test]
    fn test_mean_of_full_window() {
        let mut procedure = BackgroundNoiseProcedure::new(4);
        for decibel in [38.0, 40.0, 42.0, 40.0] {
            procedure.add_sample(decibel);
        }

        let baseline = procedure.finalize().unwrap();
        assert!((baseline.decibel() - 40.0).abs() < 1e-4);
        assert_eq!(baseline.sample_count(), 4);
    }

    #[test]
    fn test_finalize_before_complete_fails() {
        let mut procedure = BackgroundNoiseProcedure::new(30);
        procedure.add_sample(40.0);

        match procedure.finalize() {
            Err(CalibrationError::InsufficientSamples {
                required,
                collected,
            }) => {
                assert_eq!(required, 30);
                assert_eq!(collected, 1);
            }
            other => panic!("Expected InsufficientSamples, got {:?}", other),
        }
    }

    #[test]
    fn test_samples_past_window_are_ignored() {
        let mut procedure = BackgroundNoiseProcedure::new(2);
        procedure.add_sample(40.0);
        procedure.add_sample(40.0);
        let progress = procedure.add_sample(90.0);

        assert_eq!(progress.samples_collected, 2);
        assert!((procedure.finalize().unwrap().decibel() - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_progress_reports_running_mean() {
        let mut procedure = BackgroundNoiseProcedure::new(3);
        procedure.add_sample(30.0);
        let progress = procedure.add_sample(50.0);
        assert_eq!(progress.samples_collected, 2);
        assert!((progress.running_mean_db - 40.0).abs() < 1e-4);
    }
}
