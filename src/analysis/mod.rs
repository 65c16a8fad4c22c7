// Analysis module - decibel conversion, rolling buffers and status classification
//
// Pipeline: device power → SPL (decibel) → rolling decibel mean →
// perceived loudness ratio at the listener → smoothed status.

pub mod classifier;
pub mod decibel;
pub mod perception;
pub mod sampling_buffer;

pub use classifier::{
    Classification, NoiseStatus, StatusClassifier, LOUDNESS_CAUTION_LEVEL, LOUDNESS_DANGER_LEVEL,
};
pub use perception::PerceptionModel;
pub use sampling_buffer::{DrainPolicy, Sample, SamplingBuffer};
