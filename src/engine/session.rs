// MeteringSession - per-session tick pipeline
//
// Owns both rolling buffers, the tick counter and the latest published
// values. Every tick converts one device reading to SPL and feeds the
// decibel buffer; every Mth tick (counted from the first) turns the current
// averaged decibel into a loudness ratio and feeds the status classifier.
// Purely synchronous: the controller drives it from its tick task.

use crate::analysis::decibel::to_spl;
use crate::analysis::{Classification, NoiseStatus, PerceptionModel, SamplingBuffer, StatusClassifier};
use crate::calibration::BackgroundBaseline;
use crate::config::MeteringConfig;
use crate::error::MeteringError;
use crate::managers::MeteringSnapshot;

/// What a single tick changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// Published decibel after this tick
    pub decibel: f32,
    /// Loudness ratio computed on this tick, if it was a long-cadence tick
    pub ratio: Option<f32>,
    /// Classification produced when the ratio window filled
    pub classification: Option<Classification>,
    /// Whether the classification flipped the published status
    pub status_changed: bool,
}

#[derive(Debug, Clone)]
pub struct MeteringSession {
    baseline: BackgroundBaseline,
    perception: PerceptionModel,
    decibels: SamplingBuffer<f32>,
    classifier: StatusClassifier,
    ticks_per_loudness: u64,
    tick_count: u64,
    decibel: f32,
    ratio: f32,
    status: NoiseStatus,
}

impl MeteringSession {
    pub fn new(baseline: BackgroundBaseline, config: &MeteringConfig) -> Self {
        Self {
            baseline,
            perception: PerceptionModel::from_config(config),
            decibels: SamplingBuffer::resetting(config.decibel_buffer_size),
            classifier: StatusClassifier::from_config(config),
            ticks_per_loudness: config.ticks_per_loudness(),
            tick_count: 0,
            decibel: 0.0,
            ratio: 0.0,
            status: NoiseStatus::Safe,
        }
    }

    /// Process one device power reading
    ///
    /// # Errors
    /// `ZeroBaselineLoudness` when the baseline cannot anchor a ratio. The
    /// tick still counts and the decibel buffer keeps the reading.
    pub fn tick(&mut self, device_power: f32) -> Result<TickOutcome, MeteringError> {
        let tick = self.tick_count;
        self.tick_count += 1;

        if let Some(mean) = self.decibels.push(to_spl(device_power)) {
            self.decibel = mean;
        }

        let mut outcome = TickOutcome {
            decibel: self.decibel,
            ratio: None,
            classification: None,
            status_changed: false,
        };

        if tick % self.ticks_per_loudness != 0 {
            return Ok(outcome);
        }

        let ratio = self
            .perception
            .loudness_ratio(self.baseline.decibel(), self.decibel)?;
        self.ratio = ratio;
        outcome.ratio = Some(ratio);

        if let Some(classification) = self.classifier.push(ratio) {
            log::debug!(
                "[MeteringSession] tick {} mean ratio {:.3} -> {}",
                tick,
                classification.mean_ratio,
                classification.status.display_name()
            );
            outcome.status_changed = classification.status != self.status;
            self.status = classification.status;
            outcome.classification = Some(classification);
        }

        Ok(outcome)
    }

    /// Clear buffers and published values; the baseline is kept
    pub fn reset(&mut self) {
        self.decibels.clear();
        self.classifier.reset();
        self.tick_count = 0;
        self.decibel = 0.0;
        self.ratio = 0.0;
        self.status = NoiseStatus::Safe;
    }

    pub fn snapshot(&self, is_active: bool) -> MeteringSnapshot {
        MeteringSnapshot {
            decibel: self.decibel,
            status: self.status,
            ratio: self.ratio,
            is_active,
        }
    }

    pub fn baseline(&self) -> BackgroundBaseline {
        self.baseline
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn decibel(&self) -> f32 {
        self.decibel
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn status(&self) -> NoiseStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 40 dB SPL background, 55 dB SPL user
    const BACKGROUND_POWER: f32 = -60.0;
    const USER_POWER: f32 = -45.0;

    fn session() -> MeteringSession {
        MeteringSession::new(
            BackgroundBaseline::new(to_spl(BACKGROUND_POWER), 30),
            &MeteringConfig::default(),
        )
    }

    #[test]
    fn test_decibel_published_after_five_ticks() {
        let mut session = session();
        for _ in 0..4 {
            session.tick(USER_POWER).unwrap();
            assert_eq!(session.decibel(), 0.0);
        }
        let outcome = session.tick(USER_POWER).unwrap();
        assert!((outcome.decibel - 55.0).abs() < 1e-4);
        assert!((session.decibel() - 55.0).abs() < 1e-4);
    }

    #[test]
    fn test_ratio_on_every_fifth_tick_from_first() {
        let mut session = session();
        let ratio_ticks: Vec<u64> = (0..16)
            .filter_map(|tick| {
                session
                    .tick(USER_POWER)
                    .unwrap()
                    .ratio
                    .map(|_| tick)
            })
            .collect();
        assert_eq!(ratio_ticks, vec![0, 5, 10, 15]);
    }

    #[test]
    fn test_first_ratio_uses_unfilled_decibel() {
        let mut session = session();
        let outcome = session.tick(USER_POWER).unwrap();
        // User level still 0 dB: barely above the background
        let ratio = outcome.ratio.unwrap();
        assert!((ratio - 1.0).abs() < 1e-3, "got {ratio}");
    }

    #[test]
    fn test_fourth_long_tick_classifies_caution() {
        let mut session = session();
        let mut classifications = Vec::new();
        for tick in 0..16 {
            let outcome = session.tick(USER_POWER).unwrap();
            if let Some(classification) = outcome.classification {
                classifications.push((tick, classification, outcome.status_changed));
            }
        }

        assert_eq!(classifications.len(), 1);
        let (tick, classification, changed) = classifications[0];
        assert_eq!(tick, 15);
        assert_eq!(classification.status, NoiseStatus::Caution);
        // (1.0 + 3 * 1.574) / 4
        assert!((classification.mean_ratio - 1.43).abs() < 0.01);
        assert!(changed);
        assert_eq!(session.status(), NoiseStatus::Caution);
    }

    #[test]
    fn test_quiet_user_stays_safe() {
        let mut session = session();
        for _ in 0..40 {
            let outcome = session.tick(BACKGROUND_POWER).unwrap();
            assert!(!outcome.status_changed);
        }
        assert_eq!(session.status(), NoiseStatus::Safe);
        assert!(session.ratio() < 1.3);
    }

    #[test]
    fn test_reset_clears_published_values() {
        let mut session = session();
        for _ in 0..20 {
            session.tick(USER_POWER).unwrap();
        }
        session.reset();

        let snapshot = session.snapshot(false);
        assert_eq!(snapshot.decibel, 0.0);
        assert_eq!(snapshot.ratio, 0.0);
        assert_eq!(snapshot.status, NoiseStatus::Safe);
        assert!(!snapshot.is_active);
        assert_eq!(session.tick_count(), 0);
        assert!((session.baseline().decibel() - 40.0).abs() < 1e-4);
    }
}
