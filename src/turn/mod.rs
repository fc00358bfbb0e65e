//! Turn data model
//!
//! Immutable artifacts produced over the course of one conversational turn:
//! transcript, intent, and the turn's final outcome. Each completed turn
//! produces exactly one of each; none are shared across turns.

pub mod session;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use session::{DialogueTurn, PendingConfirmation, SessionState};

/// Text produced by the STT capability for one utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Recognized text
    pub text: String,
    /// Recognition confidence in `[0, 1]`
    pub confidence: f32,
    /// BCP-47 language tag (e.g. "en")
    pub language: String,
}

impl Transcript {
    /// Create a transcript with the default language tag
    #[must_use]
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            language: "en".to_string(),
        }
    }
}

/// Category of device action an intent maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// OS-level control (launch/close apps, volume, shutdown)
    OsAction,
    /// Browser automation (search, open URL)
    BrowserAction,
    /// Messaging automation (send a message to a contact)
    MessagingAction,
    /// Informational question, no device side effect
    Query,
    /// Nothing to do (acknowledgments, confirmations)
    None,
}

impl ActionKind {
    /// Kinds that route to an actuator when allowed
    pub const DISPATCHABLE: [Self; 4] = [
        Self::OsAction,
        Self::BrowserAction,
        Self::MessagingAction,
        Self::Query,
    ];

    /// Stable name used in rules files and audit records
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OsAction => "os_action",
            Self::BrowserAction => "browser_action",
            Self::MessagingAction => "messaging_action",
            Self::Query => "query",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed intent parameter value
///
/// Parameters are always structured; raw transcript text never flows into
/// policy predicates or actuators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Free text (app name, recipient, message body)
    Text(String),
    /// Numeric value (volume level, percentage)
    Number(f64),
    /// Boolean flag (confirmation answers)
    Flag(bool),
}

impl ParamValue {
    /// Text content, if this is a text parameter
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) | Self::Flag(_) => None,
        }
    }

    /// Flag value, if this is a boolean parameter
    #[must_use]
    pub const fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            Self::Text(_) | Self::Number(_) => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Structured representation of what the user asked for
///
/// Immutable once produced by the resolver. The `transcript` field is the
/// raw phrasing the intent came from; it is carried for audit context only
/// and is never consulted by policy predicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    /// Action category
    pub kind: ActionKind,
    /// Typed parameters, ordered by key for deterministic serialization
    pub params: BTreeMap<String, ParamValue>,
    /// Resolver confidence in `[0, 1]`
    pub confidence: f32,
    /// Raw transcript the intent was resolved from
    pub transcript: String,
}

impl Intent {
    /// Build an intent from a kind and `(key, value)` pairs
    #[must_use]
    pub fn new(kind: ActionKind, params: impl IntoIterator<Item = (&'static str, ParamValue)>) -> Self {
        Self {
            kind,
            params: params
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            confidence: 1.0,
            transcript: String::new(),
        }
    }

    /// Attach the source transcript
    #[must_use]
    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = transcript.into();
        self
    }

    /// Text parameter by key
    #[must_use]
    pub fn text_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(ParamValue::as_text)
    }

    /// One-line summary for logs and audit records
    #[must_use]
    pub fn summary(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| match v {
                ParamValue::Text(s) => format!("{k}={s}"),
                ParamValue::Number(n) => format!("{k}={n}"),
                ParamValue::Flag(b) => format!("{k}={b}"),
            })
            .collect();
        format!("{}({})", self.kind, params.join(", "))
    }

    /// Whether this intent is a yes/no answer to a pending confirmation
    #[must_use]
    pub fn confirmation_answer(&self) -> Option<bool> {
        if self.kind == ActionKind::None {
            self.params.get("confirm").and_then(ParamValue::as_flag)
        } else {
            None
        }
    }
}

/// Output of the intent-resolution capability
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A structured intent was extracted
    Intent(Intent),
    /// The request was ambiguous; speak this question and end the turn
    Clarification(String),
}

/// Report from an actuator after executing an intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// Whether the action completed
    pub success: bool,
    /// Human-readable detail (spoken on failure)
    pub detail: String,
}

impl ActionResult {
    /// Successful result with detail
    #[must_use]
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    /// Failed result with detail
    #[must_use]
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// Final disposition of one turn, consumed by the response stage
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// Action dispatched; carries the actuator report
    Executed(ActionResult),
    /// Policy denied the intent
    Denied(String),
    /// Policy requires a spoken yes/no; carries the confirmation prompt
    AwaitingConfirmation(String),
    /// Resolver asked a clarification question
    Clarification(String),
    /// Transcript was empty or below the confidence floor
    NotUnderstood,
    /// User cancelled the turn before dispatch
    Cancelled,
    /// A perception stage failed or timed out
    StageFailed(String),
    /// Nothing to do (acknowledgment)
    Acknowledged,
}

impl TurnOutcome {
    /// The line spoken to the user for this outcome
    #[must_use]
    pub fn spoken_line(&self) -> String {
        match self {
            Self::Executed(result) => {
                if result.success {
                    "Done.".to_string()
                } else {
                    format!("I couldn't finish that. {}", result.detail)
                }
            }
            Self::Denied(reason) => format!("I'm sorry, I can't do that. {reason}"),
            Self::AwaitingConfirmation(prompt) | Self::Clarification(prompt) => prompt.clone(),
            Self::NotUnderstood => "Sorry, I didn't catch that.".to_string(),
            Self::Cancelled => "Okay, never mind.".to_string(),
            Self::StageFailed(_) => {
                "Something went wrong while processing your request.".to_string()
            }
            Self::Acknowledged => "Okay.".to_string(),
        }
    }

    /// Short label stored in the dialogue context
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Executed(_) => "executed",
            Self::Denied(_) => "denied",
            Self::AwaitingConfirmation(_) => "awaiting_confirmation",
            Self::Clarification(_) => "clarification",
            Self::NotUnderstood => "not_understood",
            Self::Cancelled => "cancelled",
            Self::StageFailed(_) => "stage_failed",
            Self::Acknowledged => "acknowledged",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_summary() {
        let intent = Intent::new(
            ActionKind::MessagingAction,
            [
                ("recipient", ParamValue::from("Mom")),
                ("message", ParamValue::from("on my way")),
            ],
        );
        assert_eq!(
            intent.summary(),
            "messaging_action(message=on my way, recipient=Mom)"
        );
    }

    #[test]
    fn test_confirmation_answer() {
        let yes = Intent::new(ActionKind::None, [("confirm", ParamValue::Flag(true))]);
        assert_eq!(yes.confirmation_answer(), Some(true));

        let unrelated = Intent::new(ActionKind::Query, [("question", ParamValue::from("time"))]);
        assert_eq!(unrelated.confirmation_answer(), None);
    }

    #[test]
    fn test_action_kind_roundtrip() {
        let kind: ActionKind = serde_json::from_str("\"messaging_action\"").unwrap();
        assert_eq!(kind, ActionKind::MessagingAction);
        assert_eq!(kind.to_string(), "messaging_action");
    }
}
