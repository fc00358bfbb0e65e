//! Built-in offline capability adapters
//!
//! Zero-model fallbacks that keep the engine runnable with no external
//! inference runtime: an energy-based wake model and a deterministic
//! keyword resolver. Real deployments swap these for model-backed
//! implementations of the same traits.

use async_trait::async_trait;

use crate::error::{ResolverError, SttError};
use crate::stages::{AudioOutput, IntentResolver, SpeechSynthesizer, SpeechToText, WakeWordModel};
use crate::turn::{ActionKind, Intent, ParamValue, Resolution, Transcript};
use crate::Result;

/// RMS energy treated as full confidence
const FULL_CONFIDENCE_ENERGY: f32 = 0.1;

/// Wake model scoring raw signal energy
///
/// Stands in for an acoustic keyword model: any sustained speech energy
/// scores high. Useful for push-to-talk-style setups and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnergyWakeModel;

#[async_trait]
impl WakeWordModel for EnergyWakeModel {
    async fn detect(&self, window: &[f32]) -> Result<f32> {
        Ok((rms(window) / FULL_CONFIDENCE_ENERGY).min(1.0))
    }
}

/// RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Phrases accepted as an affirmative confirmation answer
const YES_PHRASES: [&str; 8] = [
    "yes", "yeah", "yep", "sure", "go ahead", "confirm", "do it", "affirmative",
];

/// Phrases accepted as a negative confirmation answer
const NO_PHRASES: [&str; 6] = ["no", "nope", "don't", "do not", "negative", "cancel that"];

/// Deterministic keyword-based intent resolver
///
/// Parses a fixed command grammar (open/close apps, browser search,
/// messaging, volume, shutdown, questions) into structured intents.
/// Anything outside the grammar becomes a clarification request.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordResolver;

impl KeywordResolver {
    fn parse(text: &str) -> Resolution {
        let normalized = text
            .trim()
            .trim_end_matches(['.', '!', '?'])
            .to_lowercase();

        if let Some(answer) = parse_confirmation(&normalized) {
            return Resolution::Intent(
                Intent::new(ActionKind::None, [("confirm", ParamValue::Flag(answer))])
                    .with_transcript(text),
            );
        }

        if let Some(target) = strip_any(&normalized, &["open ", "launch ", "start "]) {
            return app_intent("open_app", target, text);
        }
        if let Some(target) = strip_any(&normalized, &["close ", "quit ", "exit "]) {
            return app_intent("close_app", target, text);
        }

        if normalized.contains("volume") {
            let direction = if normalized.contains("down") || normalized.contains("lower") {
                "down"
            } else {
                "up"
            };
            return Resolution::Intent(
                Intent::new(
                    ActionKind::OsAction,
                    [
                        ("action", ParamValue::from("volume_control")),
                        ("direction", ParamValue::from(direction)),
                    ],
                )
                .with_transcript(text),
            );
        }

        if normalized.contains("shut down") || normalized.contains("shutdown") {
            return Resolution::Intent(
                Intent::new(
                    ActionKind::OsAction,
                    [("action", ParamValue::from("system_shutdown"))],
                )
                .with_transcript(text),
            );
        }

        if let Some(query) = strip_any(&normalized, &["search for ", "search ", "look up "]) {
            return Resolution::Intent(
                Intent::new(
                    ActionKind::BrowserAction,
                    [
                        ("action", ParamValue::from("search_browser")),
                        ("query", ParamValue::from(query)),
                    ],
                )
                .with_transcript(text),
            );
        }

        if let Some(intent) = parse_message(&normalized, text) {
            return Resolution::Intent(intent);
        }

        if ["what", "who", "when", "where", "why", "how"]
            .iter()
            .any(|q| normalized.starts_with(q))
        {
            return Resolution::Intent(
                Intent::new(
                    ActionKind::Query,
                    [("question", ParamValue::Text(normalized.clone()))],
                )
                .with_transcript(text),
            );
        }

        Resolution::Clarification(
            "I'm not sure what you'd like me to do. Could you rephrase that?".to_string(),
        )
    }
}

#[async_trait]
impl IntentResolver for KeywordResolver {
    async fn resolve(
        &self,
        text: &str,
        _context: &[String],
    ) -> std::result::Result<Resolution, ResolverError> {
        if text.trim().is_empty() {
            return Err(ResolverError::MalformedOutput("empty input".to_string()));
        }
        Ok(Self::parse(text))
    }
}

fn parse_confirmation(normalized: &str) -> Option<bool> {
    if YES_PHRASES.contains(&normalized) {
        return Some(true);
    }
    if NO_PHRASES.contains(&normalized) {
        return Some(false);
    }
    None
}

fn strip_any<'a>(text: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|p| {
        text.strip_prefix(p)
            .map(str::trim)
            .filter(|rest| !rest.is_empty())
    })
}

fn app_intent(action: &'static str, target: &str, transcript: &str) -> Resolution {
    Resolution::Intent(
        Intent::new(
            ActionKind::OsAction,
            [
                ("action", ParamValue::from(action)),
                ("target", ParamValue::from(target)),
            ],
        )
        .with_transcript(transcript),
    )
}

/// Parse messaging phrasing: "send a message to NAME saying TEXT",
/// "message NAME saying TEXT", "tell NAME that TEXT"
fn parse_message(normalized: &str, transcript: &str) -> Option<Intent> {
    let rest = strip_any(
        normalized,
        &["send a message to ", "send message to ", "message ", "tell "],
    )?;

    let (recipient, message) = [" saying ", " that ", " to say "]
        .iter()
        .find_map(|sep| rest.split_once(sep))?;

    let recipient = recipient.trim();
    let message = message.trim();
    if recipient.is_empty() || message.is_empty() {
        return None;
    }

    Some(
        Intent::new(
            ActionKind::MessagingAction,
            [
                ("action", ParamValue::from("send_message")),
                ("recipient", ParamValue::from(recipient)),
                ("message", ParamValue::from(message)),
            ],
        )
        .with_transcript(transcript),
    )
}

/// STT placeholder for builds without a speech model
///
/// Always reports the model as unavailable; the orchestrator turns that
/// into a spoken apology rather than a crash.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStt;

#[async_trait]
impl SpeechToText for UnavailableStt {
    async fn transcribe(&self, _wav: &[u8]) -> std::result::Result<Transcript, SttError> {
        Err(SttError::ModelUnavailable(
            "no STT model configured".to_string(),
        ))
    }
}

/// Synthesizer that produces no audio, logging the line instead
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSynthesizer;

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::info!(text, "tts (silent)");
        Ok(Vec::new())
    }
}

/// Output device that discards audio
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

#[async_trait]
impl AudioOutput for NullOutput {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        tracing::debug!(bytes = audio.len(), "discarding audio (null output)");
        Ok(())
    }
}
