//! Status classifier: smoothed loudness ratio → discrete noise status.
//!
//! Ratios are averaged over a sliding window that drops only half of its
//! entries after each decision, so a status flip needs roughly two long
//! ticks of sustained change.

use serde::{Deserialize, Serialize};

use crate::analysis::sampling_buffer::SamplingBuffer;
use crate::config::MeteringConfig;

/// Ratio above which sustained loudness is flagged as Caution
pub const LOUDNESS_CAUTION_LEVEL: f32 = 1.3;

/// Reserved danger ratio. No danger tier is classified yet.
pub const LOUDNESS_DANGER_LEVEL: f32 = 1.5;

/// How loud the user currently sounds to a nearby listener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseStatus {
    #[default]
    Safe,
    Caution,
}

impl NoiseStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            NoiseStatus::Safe => "Safe",
            NoiseStatus::Caution => "Caution",
        }
    }
}

/// Outcome of one full ratio window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub mean_ratio: f32,
    pub status: NoiseStatus,
}

#[derive(Debug, Clone)]
pub struct StatusClassifier {
    window: SamplingBuffer<f32>,
    caution_ratio: f32,
}

impl StatusClassifier {
    pub fn new(window_size: usize, drain: usize, caution_ratio: f32) -> Self {
        Self {
            window: SamplingBuffer::sliding(window_size, drain),
            caution_ratio,
        }
    }

    pub fn from_config(config: &MeteringConfig) -> Self {
        Self::new(
            config.ratio_buffer_size,
            config.ratio_buffer_drain,
            config.caution_ratio,
        )
    }

    /// Feed one loudness ratio; returns a classification whenever the window
    /// fills.
    pub fn push(&mut self, ratio: f32) -> Option<Classification> {
        let mean_ratio = self.window.push(ratio)?;
        let status = if mean_ratio > self.caution_ratio {
            NoiseStatus::Caution
        } else {
            NoiseStatus::Safe
        };
        Some(Classification { mean_ratio, status })
    }

    pub fn pending(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(4, 2, LOUDNESS_CAUTION_LEVEL)
    }
}
