//! Perceived-noise distance model.
//!
//! Estimates how much louder the room feels to a listener standing a fixed
//! distance away once the user's own sound is added to the background.

use crate::analysis::decibel::{attenuate, combine, ratio, to_loudness};
use crate::config::MeteringConfig;
use crate::error::MeteringError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerceptionModel {
    /// Phone-to-listener distance
    pub listener_distance: f32,
    /// Phone-to-user distance the readings are taken at
    pub reference_distance: f32,
}

impl PerceptionModel {
    pub fn new(listener_distance: f32, reference_distance: f32) -> Self {
        Self {
            listener_distance,
            reference_distance,
        }
    }

    pub fn from_config(config: &MeteringConfig) -> Self {
        Self::new(config.listener_distance_m, config.reference_distance_m)
    }

    pub fn distance_ratio(&self) -> f32 {
        self.listener_distance / self.reference_distance
    }

    /// Loudness ratio of (background + attenuated user sound) over the
    /// background alone.
    pub fn loudness_ratio(&self, background_db: f32, user_db: f32) -> Result<f32, MeteringError> {
        let background_loudness = to_loudness(background_db);
        let perceived_db = attenuate(user_db, self.distance_ratio());
        let combined_db = combine(background_db, perceived_db);
        ratio(background_loudness, to_loudness(combined_db))
    }
}

impl Default for PerceptionModel {
    fn default() -> Self {
        Self::new(1.5, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_distance_ratio() {
        assert!((PerceptionModel::default().distance_ratio() - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_quiet_user_leaves_ratio_near_one() {
        let model = PerceptionModel::default();
        let ratio = model.loudness_ratio(40.0, 0.0).unwrap();
        assert!((ratio - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_loud_user_scenarios() {
        let model = PerceptionModel::default();
        let at_55 = model.loudness_ratio(40.0, 55.0).unwrap();
        let at_70 = model.loudness_ratio(40.0, 70.0).unwrap();

        assert!((at_55 - 1.574).abs() < 1e-2);
        assert!((at_70 - 4.140).abs() < 1e-2);
        assert!(at_70 > at_55);
    }

    #[test]
    fn test_silent_background_is_rejected() {
        let model = PerceptionModel::default();
        // 2^(-inf) underflows to zero loudness
        assert_eq!(
            model.loudness_ratio(f32::NEG_INFINITY, 60.0),
            Err(MeteringError::ZeroBaselineLoudness)
        );
    }
}
