//! Session orchestrator
//!
//! Owns the turn state machine and every piece of per-session state.
//! Exactly one turn is in flight at a time; capability calls run under
//! per-stage deadlines so a wedged model fails the turn instead of the
//! engine. A stage failure ends the turn with a spoken apology; the engine
//! returns to idle and keeps listening.
//!
//! Cancellation is honored up to the policy check. Once dispatch has
//! started the action runs to completion; a half-performed side effect is
//! worse than an unwanted one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::frames::{AudioFrame, FrameQueue, Utterance};
use crate::audio::wake::{Trigger, WakeGate};
use crate::audio::{SAMPLE_RATE, samples_to_wav};
use crate::config::Config;
use crate::dispatch::ActionDispatcher;
use crate::error::{ResolverError, SttError};
use crate::policy::{PolicyDecision, PolicyEngine, Verdict};
use crate::stages::builtin::rms;
use crate::stages::{AudioOutput, IntentResolver, SpeechSynthesizer, SpeechToText};
use crate::turn::session::DialogueTurn;
use crate::turn::{ActionKind, Intent, Resolution, SessionState, Transcript, TurnOutcome};
use crate::{Error, Result};

/// Frame length in milliseconds, fixed by the capture format
const FRAME_MILLIS: u64 = 100;

/// How long the run loop waits for a frame before polling timers
const LOOP_TICK: Duration = Duration::from_millis(250);

/// Phrases that cancel the current request
const CANCEL_PHRASES: [&str; 6] = [
    "cancel",
    "cancel that",
    "stop",
    "never mind",
    "nevermind",
    "forget it",
];

/// Where the current turn is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// No turn in flight
    Idle,
    /// Capturing the utterance
    Listening,
    /// Waiting on the STT capability
    Transcribing,
    /// Waiting on the intent resolver
    Resolving,
    /// Evaluating the safety policy
    PolicyCheck,
    /// An actuator is executing; cancellation no longer applies
    Dispatching,
    /// Policy refused the intent; a denial is being phrased
    Denying,
    /// Idle with a confirmation question outstanding
    AwaitingConfirmation,
    /// Speaking the turn's response
    Responding,
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Transcribing => "transcribing",
            Self::Resolving => "resolving",
            Self::PolicyCheck => "policy_check",
            Self::Dispatching => "dispatching",
            Self::Denying => "denying",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Responding => "responding",
        };
        f.write_str(name)
    }
}

/// The perception and synthesis capabilities a session runs on
pub struct Capabilities {
    /// Speech-to-text engine
    pub stt: Arc<dyn SpeechToText>,
    /// Intent resolver
    pub resolver: Arc<dyn IntentResolver>,
    /// Speech synthesizer
    pub tts: Arc<dyn SpeechSynthesizer>,
    /// Playback device
    pub output: Arc<dyn AudioOutput>,
}

/// Supervises one voice session from trigger to response
pub struct SessionOrchestrator {
    config: Config,
    state: SessionState,
    policy: PolicyEngine,
    dispatcher: ActionDispatcher,
    capabilities: Capabilities,
    phase: TurnPhase,
}

impl SessionOrchestrator {
    /// Build an orchestrator, checking actuator coverage against the
    /// loaded ruleset
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if some kind the ruleset can allow has no
    /// registered actuator
    pub fn new(
        config: Config,
        policy: PolicyEngine,
        dispatcher: ActionDispatcher,
        capabilities: Capabilities,
    ) -> Result<Self> {
        dispatcher.validate_coverage(policy.rules())?;
        Ok(Self {
            config,
            state: SessionState::new(),
            policy,
            dispatcher,
            capabilities,
            phase: TurnPhase::Idle,
        })
    }

    /// Current phase of the turn state machine
    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        if self.phase == TurnPhase::Idle && self.state.pending_confirmation().is_some() {
            TurnPhase::AwaitingConfirmation
        } else {
            self.phase
        }
    }

    /// Session state snapshot
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Main engine loop: wake gating, turn handling, confirmation expiry
    ///
    /// Runs until the frame source ends or a fatal error occurs. Stage
    /// failures are absorbed into their turns and do not end the loop;
    /// wake failures are logged and the frame skipped.
    ///
    /// # Errors
    ///
    /// Returns error on audit failure, a broken internal invariant, or a
    /// non-perception wake failure
    pub async fn run(&mut self, queue: &FrameQueue, gate: &mut WakeGate) -> Result<()> {
        loop {
            self.expire_pending().await?;

            let Ok(frame) = tokio::time::timeout(LOOP_TICK, queue.pop()).await else {
                continue;
            };

            let trigger = if self.fast_path_open(&frame) {
                Some(Trigger {
                    at: frame.at,
                    confidence: 1.0,
                })
            } else if self.state.in_cooldown(Instant::now()) {
                None
            } else {
                match gate.feed(&frame).await {
                    Ok(trigger) => trigger,
                    Err(e) if e.is_perception_failure() => {
                        tracing::warn!(error = %e, "wake detection failed, skipping frame");
                        None
                    }
                    Err(e) => return Err(e),
                }
            };

            if let Some(trigger) = trigger {
                let outcome = self.handle_trigger(trigger, queue).await?;
                tracing::info!(outcome = outcome.label(), "turn complete");
                gate.reset();
                self.state
                    .set_cooldown(Instant::now() + self.config.voice.wake_cooldown);
            }
        }
    }

    /// Whether a pending confirmation lets this frame open a turn without
    /// wake re-validation
    fn fast_path_open(&self, frame: &AudioFrame) -> bool {
        self.config.confirmation.fast_path
            && self.state.pending_confirmation().is_some()
            && rms(&frame.samples) >= self.config.voice.silence_threshold
    }

    /// Run one full voice turn from a wake trigger
    ///
    /// # Errors
    ///
    /// Returns error on audit failure or a broken internal invariant;
    /// perception failures resolve the turn instead of erroring
    pub async fn handle_trigger(
        &mut self,
        trigger: Trigger,
        queue: &FrameQueue,
    ) -> Result<TurnOutcome> {
        tracing::debug!(confidence = trigger.confidence, "turn opened");

        self.set_phase(TurnPhase::Listening);
        let utterance = self.capture_utterance(queue).await;

        self.set_phase(TurnPhase::Transcribing);
        let transcript = match self.transcribe(utterance).await {
            Ok(t) => t,
            Err(outcome) => return self.finish_turn(String::new(), None, None, outcome).await,
        };

        self.run_text_turn(transcript).await
    }

    /// Run one turn starting from an already-transcribed utterance
    ///
    /// Entry point for text-mode operation and the voice path after STT.
    ///
    /// # Errors
    ///
    /// Returns error on audit failure or a broken internal invariant
    pub async fn run_text_turn(&mut self, transcript: Transcript) -> Result<TurnOutcome> {
        self.state.begin_turn();
        let text = transcript.text.clone();

        if text.trim().is_empty()
            || transcript.confidence < self.config.voice.min_transcript_confidence
        {
            tracing::debug!(
                confidence = transcript.confidence,
                "transcript below confidence floor"
            );
            return self
                .finish_turn(text, None, None, TurnOutcome::NotUnderstood)
                .await;
        }

        let now = Instant::now();
        if let Some(pending) = self.state.take_expired_confirmation(now) {
            // Expired unanswered; this utterance starts a fresh request.
            self.policy.expire_confirmation(&pending.intent, &self.state)?;
        }

        if is_cancel_phrase(&text) {
            if let Some(pending) = self.state.clear_confirmation() {
                let answer = Intent::new(ActionKind::None, []).with_transcript(text.as_str());
                self.policy
                    .evaluate_confirmation(&answer, &pending.intent, &self.state)?;
            }
            return self
                .finish_turn(text, None, None, TurnOutcome::Cancelled)
                .await;
        }

        self.set_phase(TurnPhase::Resolving);
        let resolution = match self.resolve(&text).await {
            Ok(r) => r,
            Err(outcome) => return self.finish_turn(text, None, None, outcome).await,
        };

        // Re-check liveness; the window may have lapsed mid-resolve.
        if let Some(pending) = self.state.take_live_confirmation(Instant::now()) {
            return self.answer_confirmation(text, resolution, pending.intent).await;
        }

        match resolution {
            Resolution::Clarification(question) => {
                self.finish_turn(text, None, None, TurnOutcome::Clarification(question))
                    .await
            }
            Resolution::Intent(intent) => self.evaluate_and_dispatch(text, intent).await,
        }
    }

    /// Resolve a live confirmation with the follow-up utterance
    async fn answer_confirmation(
        &mut self,
        text: String,
        resolution: Resolution,
        pending: Intent,
    ) -> Result<TurnOutcome> {
        self.set_phase(TurnPhase::PolicyCheck);

        // A follow-up that is itself a new request abandons the pending
        // intent; it can only be re-proposed by policy, never auto-run.
        if let Resolution::Intent(intent) = &resolution {
            if intent.confirmation_answer().is_none() && intent.kind != ActionKind::None {
                self.policy.supersede_confirmation(&pending, &self.state)?;
                let intent = intent.clone();
                return self.evaluate_and_dispatch(text, intent).await;
            }
        }

        // Anything that is not a clear yes declines.
        let answer = match resolution {
            Resolution::Intent(intent) => intent,
            Resolution::Clarification(_) => {
                Intent::new(ActionKind::None, []).with_transcript(text.as_str())
            }
        };

        let decision = self
            .policy
            .evaluate_confirmation(&answer, &pending, &self.state)?;

        if decision.verdict == Verdict::Allow {
            let outcome = self.dispatch(&pending).await?;
            self.finish_turn(text, Some(pending), Some(decision), outcome)
                .await
        } else {
            self.set_phase(TurnPhase::Denying);
            let outcome = TurnOutcome::Denied(decision.reason.clone());
            self.finish_turn(text, Some(pending), Some(decision), outcome)
                .await
        }
    }

    /// Policy-check a fresh intent and dispatch it if allowed
    async fn evaluate_and_dispatch(&mut self, text: String, intent: Intent) -> Result<TurnOutcome> {
        // Nothing to do; acknowledgments and stray yes/no answers end here.
        if intent.kind == ActionKind::None {
            return self
                .finish_turn(text, Some(intent), None, TurnOutcome::Acknowledged)
                .await;
        }

        self.set_phase(TurnPhase::PolicyCheck);
        let decision = self.policy.evaluate(&intent, &self.state)?;

        let outcome = match decision.verdict {
            Verdict::Allow => self.dispatch(&intent).await?,
            Verdict::Deny => {
                self.set_phase(TurnPhase::Denying);
                TurnOutcome::Denied(decision.reason.clone())
            }
            Verdict::NeedsConfirmation => {
                let prompt = decision
                    .confirm_prompt
                    .clone()
                    .ok_or_else(|| Error::Internal("confirmation verdict without prompt".into()))?;
                let deadline = Instant::now() + self.config.confirmation.window;

                if let Some(old) = self.state.clear_confirmation() {
                    self.policy.supersede_confirmation(&old.intent, &self.state)?;
                }
                self.state.arm_confirmation(intent.clone(), prompt.clone(), deadline);
                TurnOutcome::AwaitingConfirmation(prompt)
            }
        };

        self.finish_turn(text, Some(intent), Some(decision), outcome).await
    }

    /// Dispatch an allowed intent under the actuator deadline
    async fn dispatch(&mut self, intent: &Intent) -> Result<TurnOutcome> {
        self.set_phase(TurnPhase::Dispatching);

        let limit = self.config.timeouts.actuator;
        match with_deadline("actuator", limit, self.dispatcher.dispatch(intent)).await {
            Ok(result) => Ok(TurnOutcome::Executed(result)),
            Err(e @ Error::StageTimeout { .. }) => {
                tracing::warn!(error = %e, "dispatch timed out");
                Ok(TurnOutcome::StageFailed(e.to_string()))
            }
            Err(e @ Error::Internal(_)) => Err(e),
            Err(e) => Ok(TurnOutcome::Executed(crate::turn::ActionResult::failed(
                e.to_string(),
            ))),
        }
    }

    /// Speak the outcome, record the turn, and return to idle
    async fn finish_turn(
        &mut self,
        transcript: String,
        intent: Option<Intent>,
        decision: Option<PolicyDecision>,
        outcome: TurnOutcome,
    ) -> Result<TurnOutcome> {
        self.set_phase(TurnPhase::Responding);
        self.speak(&outcome.spoken_line()).await;

        self.state.record_turn(DialogueTurn {
            transcript,
            intent,
            decision,
            outcome: outcome.label().to_string(),
        });
        self.set_phase(TurnPhase::Idle);
        Ok(outcome)
    }

    /// Synthesize and play a line; response failures end the turn silently
    async fn speak(&self, line: &str) {
        tracing::info!(line, "responding");

        let tts_limit = self.config.timeouts.tts;
        let audio = match with_deadline(
            "tts",
            tts_limit,
            self.capabilities.tts.synthesize(line),
        )
        .await
        {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, "synthesis failed, dropping response");
                return;
            }
        };

        if audio.is_empty() {
            return;
        }
        if let Err(e) = self.capabilities.output.play(&audio).await {
            tracing::warn!(error = %e, "playback failed");
        }
    }

    /// Resolve a pending confirmation that has outlived its window
    async fn expire_pending(&mut self) -> Result<()> {
        let Some(pending) = self.state.take_expired_confirmation(Instant::now()) else {
            return Ok(());
        };

        let decision = self.policy.expire_confirmation(&pending.intent, &self.state)?;
        tracing::info!(intent = %pending.intent.summary(), "confirmation expired");

        self.speak(&TurnOutcome::Denied(decision.reason.clone()).spoken_line())
            .await;
        self.state.record_turn(DialogueTurn {
            transcript: String::new(),
            intent: Some(pending.intent),
            decision: Some(decision),
            outcome: "denied".to_string(),
        });
        Ok(())
    }

    /// Capture one utterance from the frame queue
    ///
    /// Ends on sustained trailing silence, on the utterance length cap, or
    /// when the capture side stalls.
    async fn capture_utterance(&self, queue: &FrameQueue) -> Utterance {
        // Frames buffered before the trigger belong to the wake phrase.
        queue.clear();

        let voice = &self.config.voice;
        let silence_frames_needed = usize::try_from(
            voice.silence_window.as_millis() / u128::from(FRAME_MILLIS),
        )
        .unwrap_or(1)
        .max(1);

        let mut utterance: Option<Utterance> = None;
        let mut silent_streak = 0usize;

        loop {
            let Ok(frame) = tokio::time::timeout(voice.silence_window, queue.pop()).await else {
                tracing::debug!("capture stalled, closing utterance");
                break;
            };

            let voiced = rms(&frame.samples) >= voice.silence_threshold;
            silent_streak = if voiced { 0 } else { silent_streak + 1 };

            let current = match utterance.as_mut() {
                Some(u) => {
                    u.push(&frame);
                    u
                }
                None => utterance.insert(Utterance::begin(&frame)),
            };

            if silent_streak >= silence_frames_needed {
                break;
            }
            if f64::from(current.seconds()) >= voice.utterance_max.as_secs_f64() {
                tracing::debug!("utterance length cap reached");
                break;
            }
        }

        utterance.unwrap_or_else(|| {
            Utterance::begin(&AudioFrame {
                samples: Vec::new(),
                at: Instant::now(),
            })
        })
    }

    /// Transcribe an utterance, mapping failures to turn outcomes
    async fn transcribe(&self, utterance: Utterance) -> std::result::Result<Transcript, TurnOutcome> {
        let wav = match samples_to_wav(&utterance.samples, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode utterance");
                return Err(TurnOutcome::StageFailed(e.to_string()));
            }
        };

        let limit = self.config.timeouts.stt;
        let result = tokio::time::timeout(limit, self.capabilities.stt.transcribe(&wav)).await;

        match result {
            Ok(Ok(transcript)) => {
                tracing::info!(text = %transcript.text, confidence = transcript.confidence, "transcribed");
                Ok(transcript)
            }
            Ok(Err(SttError::NoSpeechDetected)) => Err(TurnOutcome::NotUnderstood),
            Ok(Err(e @ SttError::ModelUnavailable(_))) => {
                tracing::warn!(error = %e, "stt unavailable");
                Err(TurnOutcome::StageFailed(e.to_string()))
            }
            Err(_) => {
                let e = deadline_error("stt", limit);
                tracing::warn!(error = %e, "stt timed out");
                Err(TurnOutcome::StageFailed(e.to_string()))
            }
        }
    }

    /// Resolve transcript text, mapping failures to turn outcomes
    async fn resolve(&self, text: &str) -> std::result::Result<Resolution, TurnOutcome> {
        let context = self.state.context_lines();
        let limit = self.config.timeouts.resolver;
        let result =
            tokio::time::timeout(limit, self.capabilities.resolver.resolve(text, &context)).await;

        match result {
            Ok(Ok(resolution)) => Ok(resolution),
            Ok(Err(ResolverError::MalformedOutput(detail))) => {
                // Unparseable model output is never coerced into an intent.
                tracing::warn!(detail, "resolver output rejected");
                Err(TurnOutcome::Clarification(
                    "I'm not sure what you'd like me to do. Could you rephrase that?".to_string(),
                ))
            }
            Ok(Err(e @ ResolverError::ModelUnavailable(_))) => {
                tracing::warn!(error = %e, "resolver unavailable");
                Err(TurnOutcome::StageFailed(e.to_string()))
            }
            Err(_) => {
                let e = deadline_error("resolver", limit);
                tracing::warn!(error = %e, "resolver timed out");
                Err(TurnOutcome::StageFailed(e.to_string()))
            }
        }
    }

    fn set_phase(&mut self, phase: TurnPhase) {
        if self.phase != phase {
            tracing::debug!(from = %self.phase, to = %phase, "phase");
            self.phase = phase;
        }
    }
}

/// Whether `text` is a bare cancellation phrase
fn is_cancel_phrase(text: &str) -> bool {
    let normalized = text.trim().trim_end_matches(['.', '!', '?']).to_lowercase();
    CANCEL_PHRASES.contains(&normalized.as_str())
}

/// Run a capability call under a stage deadline
async fn with_deadline<T, F>(stage: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(deadline_error(stage, limit)),
    }
}

/// The error recorded when a stage blows its deadline
fn deadline_error(stage: &'static str, limit: Duration) -> Error {
    Error::StageTimeout {
        stage,
        millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
    }
}
