//! Error types for the Aura turn engine

use thiserror::Error;

/// Result type alias for Aura operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the turn engine
///
/// Perception-stage failures (`WakeWord`, `Stt`, `Resolver`, `Tts`) are
/// recovered inside a turn and never escape the orchestrator. `Config` is
/// fatal at startup. `Internal` marks a broken invariant and indicates a bug.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (malformed ruleset, missing actuator, bad paths)
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or encoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Wake word detection error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(#[from] SttError),

    /// Intent resolution error
    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Actuator-reported failure during dispatch
    #[error("actuator error: {0}")]
    Actuator(String),

    /// Audit log append failure
    #[error("audit error: {0}")]
    Audit(String),

    /// A stage exceeded its configured deadline
    #[error("{stage} timed out after {millis}ms")]
    StageTimeout {
        /// Name of the stage that timed out
        stage: &'static str,
        /// Configured deadline in milliseconds
        millis: u64,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broken internal invariant
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure modes of the speech-to-text capability
#[derive(Debug, Error)]
pub enum SttError {
    /// The utterance contained no recognizable speech
    #[error("no speech detected")]
    NoSpeechDetected,

    /// The STT model is not loaded or not reachable
    #[error("STT model unavailable: {0}")]
    ModelUnavailable(String),
}

/// Failure modes of the intent-resolution capability
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The language model is not loaded or not reachable
    #[error("resolver model unavailable: {0}")]
    ModelUnavailable(String),

    /// Model output did not parse into the intent schema
    ///
    /// Never coerced into an intent; the orchestrator treats this as a
    /// clarification request.
    #[error("malformed resolver output: {0}")]
    MalformedOutput(String),
}

impl Error {
    /// Whether this error is recoverable inside a turn (spoken apology)
    /// rather than fatal to the process.
    #[must_use]
    pub const fn is_perception_failure(&self) -> bool {
        matches!(
            self,
            Self::WakeWord(_)
                | Self::Stt(_)
                | Self::Resolver(_)
                | Self::Tts(_)
                | Self::StageTimeout { .. }
        )
    }
}
