//! Shared test utilities

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use aura_engine::config::{Config, ConfirmationConfig, TimeoutConfig, VoiceConfig};
use aura_engine::dispatch::ActionDispatcher;
use aura_engine::stages::builtin::{KeywordResolver, NullOutput, SilentSynthesizer, UnavailableStt};
use aura_engine::stages::{IntentResolver, SpeechToText};
use aura_engine::{
    ActionKind, ActionResult, Actuator, Capabilities, Intent, MemoryAuditLog, PolicyEngine,
    Resolution, ResolverError, Result, RuleSet, SessionOrchestrator, SttError, Transcript,
};

/// Config that never touches the real filesystem or audio hardware
#[must_use]
pub fn test_config() -> Config {
    let dir = std::env::temp_dir();
    Config {
        data_dir: dir.clone(),
        rules_path: dir.join("aura-test-rules.toml"),
        audit_path: dir.join("aura-test-audit.jsonl"),
        voice: VoiceConfig {
            enabled: false,
            ..VoiceConfig::default()
        },
        timeouts: TimeoutConfig::default(),
        confirmation: ConfirmationConfig {
            window: Duration::from_secs(60),
            fast_path: false,
        },
    }
}

/// Actuator that records every intent it receives
pub struct RecordingActuator {
    calls: Arc<Mutex<Vec<Intent>>>,
    succeed: bool,
}

impl RecordingActuator {
    pub fn new(calls: Arc<Mutex<Vec<Intent>>>) -> Self {
        Self {
            calls,
            succeed: true,
        }
    }

    pub fn failing(calls: Arc<Mutex<Vec<Intent>>>) -> Self {
        Self {
            calls,
            succeed: false,
        }
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn execute(&self, intent: &Intent) -> Result<ActionResult> {
        self.calls.lock().expect("calls lock").push(intent.clone());
        if self.succeed {
            Ok(ActionResult::ok("done"))
        } else {
            Ok(ActionResult::failed("the device did not respond"))
        }
    }
}

/// Actuator that takes longer than any test deadline
pub struct SlowActuator {
    pub delay: Duration,
}

#[async_trait]
impl Actuator for SlowActuator {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn execute(&self, _intent: &Intent) -> Result<ActionResult> {
        tokio::time::sleep(self.delay).await;
        Ok(ActionResult::ok("finally"))
    }
}

/// Resolver wrapper that counts invocations
pub struct CountingResolver {
    inner: KeywordResolver,
    pub calls: Arc<AtomicUsize>,
}

impl CountingResolver {
    pub fn new(calls: Arc<AtomicUsize>) -> Self {
        Self {
            inner: KeywordResolver,
            calls,
        }
    }
}

#[async_trait]
impl IntentResolver for CountingResolver {
    async fn resolve(
        &self,
        text: &str,
        context: &[String],
    ) -> std::result::Result<Resolution, ResolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(text, context).await
    }
}

/// Resolver that answers like the keyword resolver, slowly
pub struct SlowResolver {
    pub delay: Duration,
}

#[async_trait]
impl IntentResolver for SlowResolver {
    async fn resolve(
        &self,
        text: &str,
        context: &[String],
    ) -> std::result::Result<Resolution, ResolverError> {
        tokio::time::sleep(self.delay).await;
        KeywordResolver.resolve(text, context).await
    }
}

/// STT that returns the same transcript for any audio
pub struct FixedStt {
    text: String,
    confidence: f32,
}

impl FixedStt {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

#[async_trait]
impl SpeechToText for FixedStt {
    async fn transcribe(&self, _wav: &[u8]) -> std::result::Result<Transcript, SttError> {
        Ok(Transcript::new(self.text.clone(), self.confidence))
    }
}

/// Resolver whose model is never reachable
pub struct DownResolver;

#[async_trait]
impl IntentResolver for DownResolver {
    async fn resolve(
        &self,
        _text: &str,
        _context: &[String],
    ) -> std::result::Result<Resolution, ResolverError> {
        Err(ResolverError::ModelUnavailable("model offline".to_string()))
    }
}

/// A fully wired engine over in-memory fakes
pub struct Harness {
    pub orchestrator: SessionOrchestrator,
    pub audit: Arc<MemoryAuditLog>,
    pub actuator_calls: Arc<Mutex<Vec<Intent>>>,
}

/// Engine over the keyword resolver and recording actuators
pub fn harness(rules: &str) -> Harness {
    harness_with(rules, test_config(), Arc::new(KeywordResolver))
}

/// Engine with a custom config and resolver
pub fn harness_with(
    rules: &str,
    config: Config,
    resolver: Arc<dyn IntentResolver>,
) -> Harness {
    let audit = Arc::new(MemoryAuditLog::new());
    let calls: Arc<Mutex<Vec<Intent>>> = Arc::new(Mutex::new(Vec::new()));

    let policy = PolicyEngine::new(
        RuleSet::from_toml(rules).expect("test ruleset must parse"),
        audit.clone(),
    );

    let mut dispatcher = ActionDispatcher::new();
    for kind in ActionKind::DISPATCHABLE {
        dispatcher = dispatcher.with_actuator(kind, Arc::new(RecordingActuator::new(calls.clone())));
    }

    let capabilities = Capabilities {
        stt: Arc::new(UnavailableStt),
        resolver,
        tts: Arc::new(SilentSynthesizer),
        output: Arc::new(NullOutput),
    };

    let orchestrator = SessionOrchestrator::new(config, policy, dispatcher, capabilities)
        .expect("harness must assemble");

    Harness {
        orchestrator,
        audit,
        actuator_calls: calls,
    }
}

/// Engine with a custom config and STT capability, for voice-loop tests
pub fn harness_with_stt(rules: &str, config: Config, stt: Arc<dyn SpeechToText>) -> Harness {
    let audit = Arc::new(MemoryAuditLog::new());
    let calls: Arc<Mutex<Vec<Intent>>> = Arc::new(Mutex::new(Vec::new()));

    let policy = PolicyEngine::new(
        RuleSet::from_toml(rules).expect("test ruleset must parse"),
        audit.clone(),
    );

    let mut dispatcher = ActionDispatcher::new();
    for kind in ActionKind::DISPATCHABLE {
        dispatcher = dispatcher.with_actuator(kind, Arc::new(RecordingActuator::new(calls.clone())));
    }

    let capabilities = Capabilities {
        stt,
        resolver: Arc::new(KeywordResolver),
        tts: Arc::new(SilentSynthesizer),
        output: Arc::new(NullOutput),
    };

    let orchestrator = SessionOrchestrator::new(config, policy, dispatcher, capabilities)
        .expect("harness must assemble");

    Harness {
        orchestrator,
        audit,
        actuator_calls: calls,
    }
}

/// Engine with one custom actuator registered for `kind`
pub fn harness_with_actuator(
    rules: &str,
    config: Config,
    kind: ActionKind,
    actuator: Arc<dyn Actuator>,
) -> Harness {
    let audit = Arc::new(MemoryAuditLog::new());
    let calls: Arc<Mutex<Vec<Intent>>> = Arc::new(Mutex::new(Vec::new()));

    let policy = PolicyEngine::new(
        RuleSet::from_toml(rules).expect("test ruleset must parse"),
        audit.clone(),
    );

    let mut dispatcher = ActionDispatcher::new().with_actuator(kind, actuator);
    for other in ActionKind::DISPATCHABLE {
        if other != kind {
            dispatcher =
                dispatcher.with_actuator(other, Arc::new(RecordingActuator::new(calls.clone())));
        }
    }

    let capabilities = Capabilities {
        stt: Arc::new(UnavailableStt),
        resolver: Arc::new(KeywordResolver),
        tts: Arc::new(SilentSynthesizer),
        output: Arc::new(NullOutput),
    };

    let orchestrator = SessionOrchestrator::new(config, policy, dispatcher, capabilities)
        .expect("harness must assemble");

    Harness {
        orchestrator,
        audit,
        actuator_calls: calls,
    }
}
