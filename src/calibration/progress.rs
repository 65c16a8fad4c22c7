// Progress tracking for background-noise calibration

use serde::{Deserialize, Serialize};

/// Progress information for the ambient sampling window
///
/// Broadcast once per collected sample so a loading screen can render a
/// progress bar and the running level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProgress {
    /// Number of samples collected so far
    pub samples_collected: usize,
    /// Total samples needed for a baseline
    pub samples_needed: usize,
    /// Running mean of the samples collected so far
    pub running_mean_db: f32,
}

impl CalibrationProgress {
    pub fn new(samples_collected: usize, samples_needed: usize, running_mean_db: f32) -> Self {
        Self {
            samples_collected,
            samples_needed,
            running_mean_db,
        }
    }

    /// Check if the sampling window is complete
    pub fn is_complete(&self) -> bool {
        self.samples_collected >= self.samples_needed
    }

    /// Get progress percentage (0-100)
    pub fn percentage(&self) -> u8 {
        if self.samples_needed == 0 {
            return 100;
        }
        let pct = self.samples_collected.min(self.samples_needed) * 100 / self.samples_needed;
        pct as u8
    }
}
