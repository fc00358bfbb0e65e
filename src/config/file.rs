//! TOML configuration file loading
//!
//! Supports `~/.config/aura/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of
//! defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct EngineConfigFile {
    /// Filesystem paths
    #[serde(default)]
    pub paths: PathsFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Per-stage deadlines
    #[serde(default)]
    pub timeouts: TimeoutsFileConfig,

    /// Confirmation protocol configuration
    #[serde(default)]
    pub confirmation: ConfirmationFileConfig,
}

/// Filesystem path overrides
#[derive(Debug, Default, Deserialize)]
pub struct PathsFileConfig {
    /// Data directory (rules file and audit log live here by default)
    pub data_dir: Option<PathBuf>,

    /// Policy rules file
    pub rules: Option<PathBuf>,

    /// Audit log file
    pub audit_log: Option<PathBuf>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable audio capture and the wake loop
    pub enabled: Option<bool>,

    /// Wake confidence threshold in `[0, 1]`
    pub wake_threshold: Option<f32>,

    /// Wake cool-down in seconds
    pub wake_cooldown_secs: Option<f64>,

    /// Maximum utterance length in seconds
    pub utterance_max_secs: Option<f64>,

    /// Trailing silence that ends an utterance, in seconds
    pub silence_window_secs: Option<f64>,

    /// RMS energy below which a frame counts as silence
    pub silence_threshold: Option<f32>,

    /// Transcripts below this confidence end the turn unanswered
    pub min_transcript_confidence: Option<f32>,
}

/// Per-stage deadlines in seconds
#[derive(Debug, Default, Deserialize)]
pub struct TimeoutsFileConfig {
    pub stt_secs: Option<f64>,
    pub resolver_secs: Option<f64>,
    pub tts_secs: Option<f64>,
    pub actuator_secs: Option<f64>,
}

/// Confirmation protocol configuration
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmationFileConfig {
    /// Seconds a pending confirmation stays answerable
    pub window_secs: Option<f64>,

    /// Let a trigger during a pending confirmation skip wake re-validation.
    /// Lower latency, weaker guarantee the confirming speaker is present;
    /// off by default.
    pub fast_path: Option<bool>,
}
