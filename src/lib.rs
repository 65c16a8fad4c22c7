// Shh Meter Core - noise estimation and alerting engine
// Calibrates against the background, meters how loud the user sounds to a
// nearby listener and escalates notifications while the risk persists.

// Module declarations
pub mod alerts;
pub mod analysis;
pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod managers;
pub mod testing;

// Re-exports for convenience
pub use alerts::{NotificationIntent, NotificationKind};
pub use analysis::NoiseStatus;
pub use calibration::{BackgroundBaseline, BaselinePolicy, CalibrationProgress};
pub use config::AppConfig;
pub use engine::{CalibrationOutcome, Collaborators, EngineHandle, SessionPhase, StartOutcome};
pub use managers::MeteringSnapshot;
