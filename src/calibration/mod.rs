// Calibration module - background noise measurement
//
// This module provides the synchronous building blocks of calibration:
// 1. BackgroundNoiseProcedure: accumulates ambient readings into a mean
// 2. BackgroundBaseline: the immutable result every session meters against
// 3. BaselinePolicy: optional caller-side plausibility check
//
// The asynchronous sampling loop lives in managers::CalibrationManager.

pub mod procedure;
pub mod progress;
pub mod state;
pub mod validation;

pub use procedure::BackgroundNoiseProcedure;
pub use progress::CalibrationProgress;
pub use state::BackgroundBaseline;
pub use validation::BaselinePolicy;
