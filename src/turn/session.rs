//! Session state owned by the orchestrator
//!
//! Mutated only by [`SessionOrchestrator`](crate::orchestrator::SessionOrchestrator);
//! everything else sees it as a read-only snapshot.

use std::collections::VecDeque;
use std::time::Instant;

use crate::policy::PolicyDecision;
use crate::turn::Intent;

/// Maximum dialogue turns kept as rolling context
pub const DIALOGUE_CONTEXT_TURNS: usize = 10;

/// One completed turn in the rolling dialogue context
#[derive(Debug, Clone)]
pub struct DialogueTurn {
    /// What the user said
    pub transcript: String,
    /// Resolved intent, if the turn got that far
    pub intent: Option<Intent>,
    /// Policy decision, if one was made
    pub decision: Option<PolicyDecision>,
    /// Outcome label ("executed", "denied", ...)
    pub outcome: String,
}

/// An intent parked while waiting for a spoken yes/no
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    /// The intent awaiting confirmation
    pub intent: Intent,
    /// The question that was asked
    pub prompt: String,
    /// Hard deadline; expiry resolves to a denial
    pub deadline: Instant,
}

/// Per-session mutable state
///
/// Lives for the process lifetime; never destroyed mid-turn.
#[derive(Debug, Default)]
pub struct SessionState {
    turn_counter: u64,
    context: VecDeque<DialogueTurn>,
    pending: Option<PendingConfirmation>,
    cooldown_until: Option<Instant>,
}

impl SessionState {
    /// Fresh session state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new turn, returning its sequence number
    pub const fn begin_turn(&mut self) -> u64 {
        self.turn_counter += 1;
        self.turn_counter
    }

    /// Number of turns started so far
    #[must_use]
    pub const fn turn_counter(&self) -> u64 {
        self.turn_counter
    }

    /// Append a completed turn to the rolling context
    pub fn record_turn(&mut self, turn: DialogueTurn) {
        if self.context.len() == DIALOGUE_CONTEXT_TURNS {
            self.context.pop_front();
        }
        self.context.push_back(turn);
    }

    /// The rolling dialogue context, oldest first
    #[must_use]
    pub const fn context(&self) -> &VecDeque<DialogueTurn> {
        &self.context
    }

    /// Render recent turns as plain lines for the resolver prompt
    #[must_use]
    pub fn context_lines(&self) -> Vec<String> {
        self.context
            .iter()
            .map(|t| {
                let intent = t
                    .intent
                    .as_ref()
                    .map_or_else(|| "-".to_string(), Intent::summary);
                format!("user: {} | intent: {} | outcome: {}", t.transcript, intent, t.outcome)
            })
            .collect()
    }

    /// Park an intent awaiting confirmation
    ///
    /// At most one confirmation is pending at a time; arming while one is
    /// pending replaces it (the caller audits the abandonment).
    pub fn arm_confirmation(&mut self, intent: Intent, prompt: String, deadline: Instant) {
        self.pending = Some(PendingConfirmation {
            intent,
            prompt,
            deadline,
        });
    }

    /// The pending confirmation, if any
    #[must_use]
    pub const fn pending_confirmation(&self) -> Option<&PendingConfirmation> {
        self.pending.as_ref()
    }

    /// Take the pending confirmation if its deadline has not passed
    pub fn take_live_confirmation(&mut self, now: Instant) -> Option<PendingConfirmation> {
        match &self.pending {
            Some(p) if now < p.deadline => self.pending.take(),
            _ => None,
        }
    }

    /// Take the pending confirmation if its deadline has passed
    pub fn take_expired_confirmation(&mut self, now: Instant) -> Option<PendingConfirmation> {
        match &self.pending {
            Some(p) if now >= p.deadline => self.pending.take(),
            _ => None,
        }
    }

    /// Drop the pending confirmation, returning it for auditing
    pub fn clear_confirmation(&mut self) -> Option<PendingConfirmation> {
        self.pending.take()
    }

    /// Suppress triggers until `until`
    pub const fn set_cooldown(&mut self, until: Instant) {
        self.cooldown_until = Some(until);
    }

    /// Whether triggers are currently suppressed
    #[must_use]
    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::turn::ActionKind;

    fn turn(text: &str) -> DialogueTurn {
        DialogueTurn {
            transcript: text.to_string(),
            intent: None,
            decision: None,
            outcome: "executed".to_string(),
        }
    }

    #[test]
    fn test_context_is_capped() {
        let mut state = SessionState::new();
        for i in 0..15 {
            state.record_turn(turn(&format!("turn {i}")));
        }
        assert_eq!(state.context().len(), DIALOGUE_CONTEXT_TURNS);
        assert_eq!(state.context().front().unwrap().transcript, "turn 5");
        assert_eq!(state.context().back().unwrap().transcript, "turn 14");
    }

    #[test]
    fn test_single_pending_slot() {
        let mut state = SessionState::new();
        let deadline = Instant::now() + Duration::from_secs(10);

        let first = Intent::new(ActionKind::OsAction, []);
        state.arm_confirmation(first, "sure?".to_string(), deadline);

        let second = Intent::new(ActionKind::MessagingAction, []);
        state.arm_confirmation(second, "really?".to_string(), deadline);

        let pending = state.pending_confirmation().unwrap();
        assert_eq!(pending.intent.kind, ActionKind::MessagingAction);
    }

    #[test]
    fn test_confirmation_expiry() {
        let mut state = SessionState::new();
        let now = Instant::now();
        state.arm_confirmation(
            Intent::new(ActionKind::OsAction, []),
            "sure?".to_string(),
            now + Duration::from_millis(50),
        );

        assert!(state.take_expired_confirmation(now).is_none());
        let later = now + Duration::from_millis(100);
        assert!(state.take_live_confirmation(later).is_none());
        assert!(state.take_expired_confirmation(later).is_some());
        assert!(state.pending_confirmation().is_none());
    }

    #[test]
    fn test_cooldown_window() {
        let mut state = SessionState::new();
        let now = Instant::now();
        assert!(!state.in_cooldown(now));

        state.set_cooldown(now + Duration::from_secs(2));
        assert!(state.in_cooldown(now));
        assert!(!state.in_cooldown(now + Duration::from_secs(3)));
    }
}
