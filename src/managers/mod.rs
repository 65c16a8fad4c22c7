// Managers Module
//
// Focused managers the EngineHandle delegates to. Each handles one concern:
// - AlertManager: escalation dispatcher and notification delivery
// - BroadcastChannelManager: published snapshots and event channels
// - CalibrationManager: ambient sampling window and progress

pub mod alert_manager;
pub mod broadcast_manager;
pub mod calibration_manager;

pub use alert_manager::AlertManager;
pub use broadcast_manager::{BroadcastChannelManager, MeteringSnapshot};
pub use calibration_manager::CalibrationManager;
