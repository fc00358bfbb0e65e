//! External capability interfaces
//!
//! The engine drives perception and synthesis through these narrow traits;
//! the models behind them (wake detector, STT engine, language model, TTS
//! voice) are external collaborators whose internals are out of scope.
//! Every call site wraps these in a bounded timeout.

pub mod builtin;

use async_trait::async_trait;

use crate::error::{ResolverError, SttError};
use crate::turn::{Resolution, Transcript};
use crate::Result;

/// Acoustic wake-word capability
///
/// Scores a rolling window of recent samples; the gate turns scores into
/// debounced triggers.
#[async_trait]
pub trait WakeWordModel: Send + Sync {
    /// Detection confidence in `[0, 1]` for the given sample window
    async fn detect(&self, window: &[f32]) -> Result<f32>;
}

/// Speech-to-text capability
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe WAV-encoded audio
    ///
    /// # Errors
    ///
    /// [`SttError::NoSpeechDetected`] if the audio holds no recognizable
    /// speech, [`SttError::ModelUnavailable`] if the engine is not usable.
    async fn transcribe(&self, wav: &[u8]) -> std::result::Result<Transcript, SttError>;
}

/// Intent-resolution capability (local language model)
#[async_trait]
pub trait IntentResolver: Send + Sync {
    /// Resolve transcript text into a structured intent or a clarification
    /// question, given recent dialogue context lines
    ///
    /// # Errors
    ///
    /// [`ResolverError::MalformedOutput`] must be returned when model output
    /// does not parse into the intent schema; callers treat it as a
    /// clarification, never coercing it into an intent.
    async fn resolve(
        &self,
        text: &str,
        context: &[String],
    ) -> std::result::Result<Resolution, ResolverError>;
}

/// Text-to-speech capability
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize spoken audio for `text`
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Audio output device
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Play synthesized audio to completion
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    async fn play(&self, audio: &[u8]) -> Result<()>;
}
