//! Duration-based notification escalation.
//!
//! The policy is a pure state machine over explicit instants: `observe` is
//! fed every published status and `poll` is called whenever
//! `next_deadline()` elapses. Both return the actions the dispatcher must
//! carry out, in order.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::analysis::NoiseStatus;
use crate::config::AlertConfig;

/// Escalation severity, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Tier 1: status just entered Caution
    Caution,
    /// Tier 2: Caution held for the persistent threshold
    Persistent,
    /// Tier 3: Caution still held, repeated on an interval
    RecurringAlert,
}

impl NotificationKind {
    pub fn tier(&self) -> u8 {
        match self {
            NotificationKind::Caution => 1,
            NotificationKind::Persistent => 2,
            NotificationKind::RecurringAlert => 3,
        }
    }
}

/// A notification the engine wants delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub kind: NotificationKind,
    /// Continuous time spent in Caution when the intent was emitted
    pub caution_elapsed: Duration,
}

impl NotificationIntent {
    pub fn new(kind: NotificationKind, caution_elapsed: Duration) -> Self {
        Self {
            kind,
            caution_elapsed,
        }
    }

    pub fn subtitle(&self) -> String {
        match self.kind {
            NotificationKind::Caution => format!("Noise level: {}", NoiseStatus::Caution.display_name()),
            NotificationKind::Persistent | NotificationKind::RecurringAlert => {
                "Persistent noise".to_string()
            }
        }
    }

    pub fn body(&self) -> String {
        match self.kind {
            NotificationKind::Caution => {
                "People nearby can hear you clearly. Try lowering your voice.".to_string()
            }
            NotificationKind::Persistent => format!(
                "Your noise level has stayed at caution for {} seconds!",
                self.caution_elapsed.as_secs()
            ),
            NotificationKind::RecurringAlert => {
                "You are still making noise at a caution level!".to_string()
            }
        }
    }
}

/// What the dispatcher has to do with the notification service
#[derive(Debug, Clone, PartialEq)]
pub enum AlertAction {
    Notify(NotificationIntent),
    CancelAll,
}

/// Highest tier already emitted for the current caution episode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    #[default]
    None,
    CautionFired,
    PersistentFired,
    RecurringActive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlertEscalationState {
    pub caution_since: Option<Instant>,
    pub tier: EscalationTier,
    pub next_recurring_at: Option<Instant>,
}

/// Escalation timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub persistent_after: Duration,
    pub first_recurring_after: Duration,
    pub recurring_interval: Duration,
}

impl AlertPolicy {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            persistent_after: config.persistent_after(),
            // Recurring alerts never start before the persistent one
            first_recurring_after: config.first_recurring_after().max(config.persistent_after()),
            recurring_interval: config.recurring_interval(),
        }
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::from_config(&AlertConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct AlertEscalation {
    policy: AlertPolicy,
    state: AlertEscalationState,
}

impl AlertEscalation {
    pub fn new(policy: AlertPolicy) -> Self {
        Self {
            policy,
            state: AlertEscalationState::default(),
        }
    }

    pub fn state(&self) -> AlertEscalationState {
        self.state
    }

    pub fn tier(&self) -> EscalationTier {
        self.state.tier
    }

    /// React to the latest published status
    pub fn observe(&mut self, status: NoiseStatus, now: Instant) -> Vec<AlertAction> {
        match (status, self.state.caution_since) {
            (NoiseStatus::Caution, None) => {
                self.state.caution_since = Some(now);
                self.state.tier = EscalationTier::CautionFired;
                self.state.next_recurring_at = None;
                vec![AlertAction::Notify(NotificationIntent::new(
                    NotificationKind::Caution,
                    Duration::ZERO,
                ))]
            }
            (NoiseStatus::Caution, Some(_)) => self.poll(now),
            (NoiseStatus::Safe, Some(_)) => {
                self.reset();
                vec![AlertAction::CancelAll]
            }
            (NoiseStatus::Safe, None) => Vec::new(),
        }
    }

    /// Emit every time-based intent that has come due by `now`
    pub fn poll(&mut self, now: Instant) -> Vec<AlertAction> {
        let Some(since) = self.state.caution_since else {
            return Vec::new();
        };
        let mut actions = Vec::new();

        let persistent_at = since + self.policy.persistent_after;
        if self.state.tier == EscalationTier::CautionFired && now >= persistent_at {
            self.state.tier = EscalationTier::PersistentFired;
            self.state.next_recurring_at = Some(since + self.policy.first_recurring_after);
            actions.push(AlertAction::Notify(NotificationIntent::new(
                NotificationKind::Persistent,
                self.policy.persistent_after,
            )));
        }

        while let Some(due) = self.state.next_recurring_at {
            if due > now {
                break;
            }
            self.state.tier = EscalationTier::RecurringActive;
            self.state.next_recurring_at = Some(due + self.policy.recurring_interval);
            actions.push(AlertAction::Notify(NotificationIntent::new(
                NotificationKind::RecurringAlert,
                due.saturating_duration_since(since),
            )));
        }

        actions
    }

    /// Instant at which `poll` will next have something to emit
    pub fn next_deadline(&self) -> Option<Instant> {
        let since = self.state.caution_since?;
        match self.state.tier {
            EscalationTier::None => None,
            EscalationTier::CautionFired => Some(since + self.policy.persistent_after),
            EscalationTier::PersistentFired | EscalationTier::RecurringActive => {
                self.state.next_recurring_at
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = AlertEscalationState::default();
    }
}

impl Default for AlertEscalation {
    fn default() -> Self {
        Self::new(AlertPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(actions: &[AlertAction]) -> Vec<NotificationKind> {
        actions
            .iter()
            .filter_map(|action| match action {
                AlertAction::Notify(intent) => Some(intent.kind),
                AlertAction::CancelAll => None,
            })
            .collect()
    }

    /// Hold Caution from `start` for `held`, polling once per second
    fn hold_caution(escalation: &mut AlertEscalation, start: Instant, held: u64) -> Vec<AlertAction> {
        let mut actions = escalation.observe(NoiseStatus::Caution, start);
        for second in 1..=held {
            actions.extend(escalation.poll(start + Duration::from_secs(second)));
        }
        actions
    }

    #[test]
    fn test_entering_caution_fires_tier_one_only() {
        let mut escalation = AlertEscalation::default();
        let actions = hold_caution(&mut escalation, Instant::now(), 0);

        assert_eq!(kinds(&actions), vec![NotificationKind::Caution]);
        assert_eq!(escalation.tier(), EscalationTier::CautionFired);
    }

    #[test]
    fn test_twenty_seconds_adds_persistent_once() {
        let mut escalation = AlertEscalation::default();
        let actions = hold_caution(&mut escalation, Instant::now(), 20);
        let fired = kinds(&actions);

        assert_eq!(
            fired
                .iter()
                .filter(|kind| **kind == NotificationKind::Persistent)
                .count(),
            1
        );
        assert_eq!(fired[0], NotificationKind::Caution);
        assert_eq!(fired[1], NotificationKind::Persistent);
    }

    #[test]
    fn test_eighty_seconds_adds_two_recurring() {
        let mut escalation = AlertEscalation::default();
        let start = Instant::now();
        let actions = hold_caution(&mut escalation, start, 80);

        assert_eq!(
            kinds(&actions),
            vec![
                NotificationKind::Caution,
                NotificationKind::Persistent,
                NotificationKind::RecurringAlert,
                NotificationKind::RecurringAlert,
            ]
        );
        assert_eq!(escalation.tier(), EscalationTier::RecurringActive);
        assert_eq!(
            escalation.next_deadline(),
            Some(start + Duration::from_secs(140))
        );
    }

    #[test]
    fn test_late_poll_catches_up_without_duplicates() {
        let mut escalation = AlertEscalation::default();
        let start = Instant::now();
        escalation.observe(NoiseStatus::Caution, start);

        let actions = escalation.poll(start + Duration::from_secs(81));
        assert_eq!(
            kinds(&actions),
            vec![
                NotificationKind::Persistent,
                NotificationKind::RecurringAlert,
                NotificationKind::RecurringAlert,
            ]
        );
        assert!(escalation.poll(start + Duration::from_secs(81)).is_empty());
    }

    #[test]
    fn test_repeated_caution_does_not_refire_tier_one() {
        let mut escalation = AlertEscalation::default();
        let start = Instant::now();
        escalation.observe(NoiseStatus::Caution, start);
        let actions = escalation.observe(NoiseStatus::Caution, start + Duration::from_secs(2));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_safe_cancels_and_resets() {
        let mut escalation = AlertEscalation::default();
        let start = Instant::now();
        hold_caution(&mut escalation, start, 30);

        let actions = escalation.observe(NoiseStatus::Safe, start + Duration::from_secs(31));
        assert_eq!(actions, vec![AlertAction::CancelAll]);
        assert_eq!(escalation.state(), AlertEscalationState::default());
        assert_eq!(escalation.next_deadline(), None);

        // A new episode starts from tier one again
        let actions = escalation.observe(NoiseStatus::Caution, start + Duration::from_secs(32));
        assert_eq!(kinds(&actions), vec![NotificationKind::Caution]);
    }

    #[test]
    fn test_safe_without_episode_is_silent() {
        let mut escalation = AlertEscalation::default();
        assert!(escalation
            .observe(NoiseStatus::Safe, Instant::now())
            .is_empty());
    }

    #[test]
    fn test_custom_first_recurring_offset() {
        let policy = AlertPolicy {
            persistent_after: Duration::from_secs(20),
            first_recurring_after: Duration::from_secs(80),
            recurring_interval: Duration::from_secs(60),
        };
        let mut escalation = AlertEscalation::new(policy);
        let actions = hold_caution(&mut escalation, Instant::now(), 80);
        assert_eq!(
            kinds(&actions),
            vec![
                NotificationKind::Caution,
                NotificationKind::Persistent,
                NotificationKind::RecurringAlert,
            ]
        );
    }

    #[test]
    fn test_intent_text() {
        let intent = NotificationIntent::new(NotificationKind::Persistent, Duration::from_secs(20));
        assert!(intent.body().contains("20 seconds"));
        assert_eq!(intent.kind.tier(), 2);
        assert!(NotificationKind::Caution < NotificationKind::RecurringAlert);
    }
}
