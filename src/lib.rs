//! Aura Engine - Local, offline voice-assistant turn engine
//!
//! This library provides the core functionality for the Aura engine:
//! - Always-on capture with wake gating and debounce
//! - Transcription and intent resolution behind capability traits
//! - An allow-list safety policy with a tamper-evident audit trail
//! - Action dispatch to per-kind actuators
//!
//! Every resolved intent passes through the policy engine before any
//! actuator runs; the transcript itself never reaches a predicate, so no
//! phrasing can talk the engine past its rules.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Audio Ingest                        │
//! │   Capture  │  Frame Queue  │  Wake Gate             │
//! └────────────────────┬────────────────────────────────┘
//!                      │ trigger
//! ┌────────────────────▼────────────────────────────────┐
//! │              Session Orchestrator                    │
//! │   STT  │  Resolver  │  Policy  │  Dispatch  │  TTS  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ allowed intents
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Actuators                          │
//! │   OS  │  Browser  │  Messaging  │  Query            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod stages;
pub mod turn;

pub use config::Config;
pub use dispatch::{ActionDispatcher, Actuator, LogActuator, OsCommandActuator, SharedActuator};
pub use error::{Error, ResolverError, Result, SttError};
pub use orchestrator::{Capabilities, SessionOrchestrator, TurnPhase};
pub use policy::{
    AuditRecord, AuditSink, FileAuditLog, MemoryAuditLog, PolicyDecision, PolicyEngine,
    PolicyRule, RuleSet, SharedAuditSink, Verdict,
};
pub use turn::{
    ActionKind, ActionResult, Intent, ParamValue, Resolution, SessionState, Transcript,
    TurnOutcome,
};
