// BackgroundBaseline - ambient noise level produced by calibration
//
// Every loudness computation of a metering session compares the user's
// level against this baseline. It is immutable once produced; a new
// calibration yields a new baseline.

use serde::{Deserialize, Serialize};

/// Mean ambient decibel measured during calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundBaseline {
    decibel: f32,
    sample_count: usize,
}

impl BackgroundBaseline {
    /// Create a baseline from an already-averaged decibel value
    ///
    /// # Arguments
    /// * `decibel` - Mean SPL of the ambient readings
    /// * `sample_count` - Number of readings the mean was taken over
    pub fn new(decibel: f32, sample_count: usize) -> Self {
        Self {
            decibel,
            sample_count,
        }
    }

    /// Raw mean, exposed so the orchestrating layer can apply its own
    /// plausibility policy
    pub fn decibel(&self) -> f32 {
        self.decibel
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}
