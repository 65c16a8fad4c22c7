//! Test harness utilities.
//!
//! Recording fakes for every injected collaborator plus `TestRig`, which
//! wires them into an `EngineHandle`. Shared by unit tests and the
//! integration tests under `tests/`.

pub mod fakes;
pub mod rig;

pub use fakes::{DisplayCall, RecordingDisplay, RecordingNotifier, ScriptedPermissions};
pub use rig::{TestRig, TestRigBuilder, QUIET_ROOM_POWER, RAISED_VOICE_POWER};
