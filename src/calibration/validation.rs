// Baseline plausibility policy
//
// The engine never rejects a baseline by itself. Orchestrating layers that
// want to refuse abnormally loud rooms call `BaselinePolicy::check` and
// re-run calibration on `InvalidBaseline`.

use crate::calibration::state::BackgroundBaseline;
use crate::config::CalibrationConfig;
use crate::error::CalibrationError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselinePolicy {
    pub max_plausible_db: f32,
}

impl BaselinePolicy {
    pub fn new(max_plausible_db: f32) -> Self {
        Self { max_plausible_db }
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self::new(config.max_plausible_db)
    }

    pub fn check(&self, baseline: &BackgroundBaseline) -> Result<(), CalibrationError> {
        let decibel = baseline.decibel();
        if !decibel.is_finite() || decibel > self.max_plausible_db {
            return Err(CalibrationError::InvalidBaseline {
                decibel,
                max_plausible: self.max_plausible_db,
            });
        }
        Ok(())
    }
}

impl Default for BaselinePolicy {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}
