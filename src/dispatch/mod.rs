//! Action dispatch
//!
//! Routes an allowed intent to exactly one actuator by action kind.
//! Coverage is checked at startup against the loaded ruleset; a missing
//! actuator at dispatch time is an invariant violation, not a user error.
//! Failures are reported, never retried silently — a retry is a new,
//! user-confirmed intent.

pub mod adapters;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::policy::RuleSet;
use crate::turn::{ActionKind, ActionResult, Intent};
use crate::{Error, Result};

pub use adapters::{LogActuator, OsCommandActuator};

/// An external component that performs a real-world side effect
///
/// One implementation per action kind; each owns its own automation
/// mechanics.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Actuator name for logs
    fn name(&self) -> &'static str;

    /// Execute an intent's parameters
    ///
    /// # Errors
    ///
    /// Returns error on actuator-internal failure; an action that ran but
    /// did not succeed is a `success = false` result instead.
    async fn execute(&self, intent: &Intent) -> Result<ActionResult>;
}

/// Shared actuator handle
pub type SharedActuator = Arc<dyn Actuator>;

/// Routes allowed intents to their actuators
pub struct ActionDispatcher {
    actuators: HashMap<ActionKind, SharedActuator>,
}

impl ActionDispatcher {
    /// Empty dispatcher; register actuators before validating
    #[must_use]
    pub fn new() -> Self {
        Self {
            actuators: HashMap::new(),
        }
    }

    /// Register the actuator for an action kind, replacing any previous one
    #[must_use]
    pub fn with_actuator(mut self, kind: ActionKind, actuator: SharedActuator) -> Self {
        self.actuators.insert(kind, actuator);
        self
    }

    /// Check that every kind the ruleset can route here has an actuator
    ///
    /// Called once at startup; failure is fatal before the engine enters
    /// its idle state.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first uncovered kind
    pub fn validate_coverage(&self, rules: &RuleSet) -> Result<()> {
        for kind in rules.dispatchable_kinds() {
            if !self.actuators.contains_key(&kind) {
                return Err(Error::Config(format!(
                    "ruleset can allow {kind} but no actuator is registered for it"
                )));
            }
        }
        Ok(())
    }

    /// Dispatch an allowed intent to its actuator
    ///
    /// # Errors
    ///
    /// `Error::Internal` if no actuator is registered for the kind (the
    /// startup check should have caught this); otherwise the actuator's
    /// own error.
    pub async fn dispatch(&self, intent: &Intent) -> Result<ActionResult> {
        let actuator = self.actuators.get(&intent.kind).ok_or_else(|| {
            Error::Internal(format!("no actuator registered for {}", intent.kind))
        })?;

        tracing::info!(
            actuator = actuator.name(),
            intent = %intent.summary(),
            "dispatching"
        );

        let result = actuator.execute(intent).await?;
        if result.success {
            tracing::info!(actuator = actuator.name(), "action completed");
        } else {
            tracing::warn!(
                actuator = actuator.name(),
                detail = %result.detail,
                "action failed"
            );
        }
        Ok(result)
    }
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
