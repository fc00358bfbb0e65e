//! Safety policy engine
//!
//! Arbitrates whether a resolved intent may reach an actuator. The ruleset
//! is an ordered allow-list loaded once at startup; evaluation is
//! first-match-wins with default deny. Predicates see only the intent's
//! structured parameters — transcript phrasing can never flip a verdict.
//!
//! The engine is pure with respect to actuators. Its only side effect is
//! appending one record to the audit sink per evaluation, Allow and Deny
//! alike.

pub mod audit;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use audit::{AuditRecord, AuditSink, FileAuditLog, MemoryAuditLog, SharedAuditSink};

use crate::turn::{ActionKind, Intent, ParamValue, SessionState};
use crate::{Error, Result};

/// Rule id recorded when no rule matched
pub const NO_MATCH_RULE_ID: &str = "no-match-default-deny";

/// Reason recorded when no rule matched
pub const NO_MATCH_REASON: &str = "no matching allow rule";

/// Synthetic rule id for an affirmative confirmation answer
pub const CONFIRMATION_GRANTED_RULE_ID: &str = "confirmation-granted";

/// Synthetic rule id for a negative confirmation answer
pub const CONFIRMATION_DECLINED_RULE_ID: &str = "confirmation-declined";

/// Synthetic rule id for a confirmation that expired unanswered
pub const CONFIRMATION_TIMEOUT_RULE_ID: &str = "confirmation-timeout";

/// Synthetic rule id for a confirmation abandoned by a new request
pub const CONFIRMATION_SUPERSEDED_RULE_ID: &str = "confirmation-superseded";

/// Decision verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The intent may be dispatched
    Allow,
    /// The intent is blocked
    Deny,
    /// The intent may be dispatched only after a spoken yes
    NeedsConfirmation,
}

/// Predicate over one intent parameter
///
/// In the rules file a matcher is either a single string or a list of
/// acceptable strings. Text comparison is case-insensitive; numbers and
/// flags compare against their canonical rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamMatcher {
    /// Parameter must equal this value
    Equals(String),
    /// Parameter must equal one of these values
    AnyOf(Vec<String>),
}

impl ParamMatcher {
    /// Whether `value` satisfies this matcher
    #[must_use]
    pub fn matches(&self, value: &ParamValue) -> bool {
        let rendered = match value {
            ParamValue::Text(s) => s.clone(),
            ParamValue::Number(n) => n.to_string(),
            ParamValue::Flag(b) => b.to_string(),
        };
        match self {
            Self::Equals(expected) => expected.eq_ignore_ascii_case(&rendered),
            Self::AnyOf(options) => options.iter().any(|o| o.eq_ignore_ascii_case(&rendered)),
        }
    }
}

/// One entry in the ordered ruleset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Stable identifier, unique within the ruleset
    pub id: String,
    /// Action kind this rule applies to
    pub kind: ActionKind,
    /// Parameter predicates; all must hold for the rule to match.
    /// A matcher on an absent parameter fails the rule.
    #[serde(default, rename = "match")]
    pub matchers: BTreeMap<String, ParamMatcher>,
    /// Verdict when the rule matches
    pub verdict: Verdict,
    /// Human-readable reason, spoken on deny
    pub reason: String,
}

impl PolicyRule {
    /// Whether this rule matches `intent`
    #[must_use]
    pub fn matches(&self, intent: &Intent) -> bool {
        self.kind == intent.kind
            && self
                .matchers
                .iter()
                .all(|(key, matcher)| intent.params.get(key).is_some_and(|v| matcher.matches(v)))
    }
}

/// Ordered ruleset, fixed for the process lifetime
///
/// Loaded once at startup; reload requires a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Rules in evaluation order
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl RuleSet {
    /// Load a ruleset from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, does not parse, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read rules file {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse a ruleset from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if the text does not parse or fails validation
    pub fn from_toml(raw: &str) -> Result<Self> {
        let set: Self = toml::from_str(raw)?;
        set.validate()?;
        Ok(set)
    }

    /// Validate rule ids and reasons
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on duplicate or reserved rule ids, or an
    /// empty reason string.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                return Err(Error::Config("rule with empty id".to_string()));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(Error::Config(format!("duplicate rule id: {}", rule.id)));
            }
            if rule.id.starts_with("confirmation-") || rule.id == NO_MATCH_RULE_ID {
                return Err(Error::Config(format!("reserved rule id: {}", rule.id)));
            }
            if rule.reason.trim().is_empty() {
                return Err(Error::Config(format!("rule {} has no reason", rule.id)));
            }
        }
        Ok(())
    }

    /// Action kinds that any allow or confirmation rule can route to the
    /// dispatcher. Used at startup to check actuator coverage.
    #[must_use]
    pub fn dispatchable_kinds(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<ActionKind> = self
            .rules
            .iter()
            .filter(|r| {
                matches!(r.verdict, Verdict::Allow | Verdict::NeedsConfirmation)
                    && r.kind != ActionKind::None
            })
            .map(|r| r.kind)
            .collect();
        kinds.sort_unstable();
        kinds.dedup();
        kinds
    }
}

/// Outcome of one policy evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Verdict
    pub verdict: Verdict,
    /// Human-readable reason
    pub reason: String,
    /// Matched rule id, or [`NO_MATCH_RULE_ID`]
    pub rule_id: String,
    /// Confirmation question, set iff verdict is `NeedsConfirmation`
    pub confirm_prompt: Option<String>,
}

/// The safety policy engine
///
/// `evaluate` is deterministic for a fixed `(intent, ruleset, state)` and
/// never invokes actuators itself.
pub struct PolicyEngine {
    rules: RuleSet,
    audit: SharedAuditSink,
}

impl PolicyEngine {
    /// Build an engine over a validated ruleset and an audit sink
    #[must_use]
    pub fn new(rules: RuleSet, audit: SharedAuditSink) -> Self {
        Self { rules, audit }
    }

    /// The loaded ruleset
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Shared handle to the audit sink
    #[must_use]
    pub fn audit_sink(&self) -> SharedAuditSink {
        Arc::clone(&self.audit)
    }

    /// Evaluate an intent against the ruleset
    ///
    /// First matching rule wins; no match is a deny. Appends exactly one
    /// audit record and fails closed if the append fails.
    ///
    /// # Errors
    ///
    /// Returns error only if the audit append fails.
    pub fn evaluate(&self, intent: &Intent, state: &SessionState) -> Result<PolicyDecision> {
        let decision = self.rules.rules.iter().find(|r| r.matches(intent)).map_or_else(
            || PolicyDecision {
                verdict: Verdict::Deny,
                reason: NO_MATCH_REASON.to_string(),
                rule_id: NO_MATCH_RULE_ID.to_string(),
                confirm_prompt: None,
            },
            |rule| PolicyDecision {
                verdict: rule.verdict,
                reason: rule.reason.clone(),
                rule_id: rule.id.clone(),
                confirm_prompt: (rule.verdict == Verdict::NeedsConfirmation)
                    .then(|| confirmation_phrase(intent)),
            },
        );

        self.record(state.turn_counter(), intent, &decision)?;
        Ok(decision)
    }

    /// Evaluate a confirmation answer against the synthetic confirmation
    /// rule, distinct from the loaded ruleset
    ///
    /// `answer` is the follow-up intent; `pending` is the intent awaiting
    /// confirmation. An answer that is not a yes/no is treated as declining.
    ///
    /// # Errors
    ///
    /// Returns error only if the audit append fails.
    pub fn evaluate_confirmation(
        &self,
        answer: &Intent,
        pending: &Intent,
        state: &SessionState,
    ) -> Result<PolicyDecision> {
        let decision = match answer.confirmation_answer() {
            Some(true) => PolicyDecision {
                verdict: Verdict::Allow,
                reason: "confirmed by user".to_string(),
                rule_id: CONFIRMATION_GRANTED_RULE_ID.to_string(),
                confirm_prompt: None,
            },
            Some(false) | None => PolicyDecision {
                verdict: Verdict::Deny,
                reason: "confirmation declined".to_string(),
                rule_id: CONFIRMATION_DECLINED_RULE_ID.to_string(),
                confirm_prompt: None,
            },
        };

        self.record(state.turn_counter(), pending, &decision)?;
        Ok(decision)
    }

    /// Record expiry of an unanswered confirmation as a deny
    ///
    /// # Errors
    ///
    /// Returns error only if the audit append fails.
    pub fn expire_confirmation(
        &self,
        pending: &Intent,
        state: &SessionState,
    ) -> Result<PolicyDecision> {
        let decision = PolicyDecision {
            verdict: Verdict::Deny,
            reason: "confirmation timeout".to_string(),
            rule_id: CONFIRMATION_TIMEOUT_RULE_ID.to_string(),
            confirm_prompt: None,
        };
        self.record(state.turn_counter(), pending, &decision)?;
        Ok(decision)
    }

    /// Record abandonment of a pending confirmation superseded by a new
    /// request
    ///
    /// # Errors
    ///
    /// Returns error only if the audit append fails.
    pub fn supersede_confirmation(&self, pending: &Intent, state: &SessionState) -> Result<()> {
        let decision = PolicyDecision {
            verdict: Verdict::Deny,
            reason: "confirmation superseded by a new request".to_string(),
            rule_id: CONFIRMATION_SUPERSEDED_RULE_ID.to_string(),
            confirm_prompt: None,
        };
        self.record(state.turn_counter(), pending, &decision)
    }

    fn record(&self, turn: u64, intent: &Intent, decision: &PolicyDecision) -> Result<()> {
        tracing::info!(
            turn,
            intent = %intent.summary(),
            verdict = ?decision.verdict,
            rule = %decision.rule_id,
            "policy decision"
        );
        self.audit.append(&AuditRecord::new(
            turn,
            intent,
            decision.verdict,
            decision.reason.clone(),
            decision.rule_id.clone(),
        ))
    }
}

/// Build the spoken confirmation question for an intent
fn confirmation_phrase(intent: &Intent) -> String {
    let description = match intent.kind {
        ActionKind::MessagingAction => intent.text_param("recipient").map_or_else(
            || "send that message".to_string(),
            |r| format!("send that message to {r}"),
        ),
        ActionKind::OsAction => match (intent.text_param("action"), intent.text_param("target")) {
            (Some(action), Some(target)) => format!("{} {target}", action.replace('_', " ")),
            (Some(action), None) => action.replace('_', " "),
            _ => "run that system action".to_string(),
        },
        ActionKind::BrowserAction => "run that browser action".to_string(),
        ActionKind::Query | ActionKind::None => "do that".to_string(),
    };
    format!("This action needs confirmation. Should I {description}? Say yes or no.")
}
