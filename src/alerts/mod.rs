// Alerts module
// Duration-based escalation of caution notifications

pub mod escalation;

pub use escalation::{
    AlertAction, AlertEscalation, AlertEscalationState, AlertPolicy, EscalationTier,
    NotificationIntent, NotificationKind,
};
