//! Engine module housing the metering controller.
//!
//! This module exposes the collaborator traits and concrete backends
//! (`backend`), the per-session tick pipeline (`session`), cancellable
//! scheduled tasks (`task`) and the `EngineHandle` orchestration layer
//! (`core`).

pub mod backend;
pub mod core;
pub mod session;
pub mod task;

pub use backend::{
    CaptureDevice, LiveStatusDisplay, NotificationService, PermissionService, PermissionStatus,
    TimeSource, TokioTimeSource,
};
pub use core::{
    CalibrationOutcome, Collaborators, EngineHandle, SessionPhase, StartOutcome, TelemetryEvent,
    TelemetryEventKind,
};
pub use session::{MeteringSession, TickOutcome};
pub use task::{CancelToken, ScheduledTask};
