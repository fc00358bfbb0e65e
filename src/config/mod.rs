//! Configuration management for the Aura engine

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Aura engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (rules, audit log)
    pub data_dir: PathBuf,

    /// Path to the policy rules file
    pub rules_path: PathBuf,

    /// Path to the append-only audit log
    pub audit_path: PathBuf,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Per-stage deadlines
    pub timeouts: TimeoutConfig,

    /// Confirmation protocol configuration
    pub confirmation: ConfirmationConfig,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable audio capture and the wake loop
    pub enabled: bool,

    /// Wake confidence threshold in `[0, 1]`
    pub wake_threshold: f32,

    /// Cool-down after a handled trigger
    pub wake_cooldown: Duration,

    /// Hard cap on utterance length
    pub utterance_max: Duration,

    /// Trailing silence that ends an utterance
    pub silence_window: Duration,

    /// RMS energy below which a frame counts as silence
    pub silence_threshold: f32,

    /// Transcripts below this confidence end the turn unanswered
    pub min_transcript_confidence: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wake_threshold: 0.5,
            wake_cooldown: Duration::from_secs(2),
            utterance_max: Duration::from_secs(10),
            silence_window: Duration::from_secs(2),
            silence_threshold: 0.015,
            min_transcript_confidence: 0.4,
        }
    }
}

/// Per-stage deadlines
///
/// A stage that blows its deadline fails the turn; it never wedges the
/// engine.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Transcription deadline
    pub stt: Duration,

    /// Intent resolution deadline
    pub resolver: Duration,

    /// Speech synthesis deadline
    pub tts: Duration,

    /// Action execution deadline
    pub actuator: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stt: Duration::from_secs(15),
            resolver: Duration::from_secs(30),
            tts: Duration::from_secs(10),
            actuator: Duration::from_secs(20),
        }
    }
}

/// Confirmation protocol configuration
#[derive(Debug, Clone)]
pub struct ConfirmationConfig {
    /// How long a pending confirmation stays answerable
    pub window: Duration,

    /// Skip wake re-validation for the answer turn (off by default)
    pub fast_path: bool,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15),
            fast_path: false,
        }
    }
}

/// Default config file location: `~/.config/aura/config.toml`
fn default_config_file() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("aura").join("config.toml"))
}

/// Default data directory: `~/.local/share/aura` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("aura"))
}

impl Config {
    /// Load configuration (env > file > default)
    ///
    /// `config_file` overrides the default `~/.config/aura/config.toml`
    /// location; a missing default file is fine, a missing explicit one is
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly named config file cannot be read or
    /// parsed, or if the data directory cannot be created
    pub fn load(config_file: Option<&std::path::Path>) -> Result<Self> {
        let fc = match config_file {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?
            }
            None => Self::load_default_file(),
        };

        Self::from_file(fc)
    }

    /// Load the default config file if present, defaults otherwise
    fn load_default_file() -> file::EngineConfigFile {
        let Some(path) = default_config_file() else {
            return file::EngineConfigFile::default();
        };
        if !path.exists() {
            return file::EngineConfigFile::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(fc) => {
                    tracing::debug!(path = %path.display(), "loaded config file");
                    fc
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to parse config file, using defaults"
                    );
                    file::EngineConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read config file, using defaults"
                );
                file::EngineConfigFile::default()
            }
        }
    }

    /// Materialize a runtime config from a file overlay
    ///
    /// # Errors
    ///
    /// Returns error if the data directory cannot be created
    fn from_file(fc: file::EngineConfigFile) -> Result<Self> {
        let data_dir = std::env::var("AURA_DATA_DIR")
            .map(PathBuf::from)
            .ok()
            .or(fc.paths.data_dir)
            .unwrap_or_else(default_data_dir);

        std::fs::create_dir_all(&data_dir).map_err(|e| {
            Error::Config(format!("cannot create data dir {}: {e}", data_dir.display()))
        })?;

        let rules_path = std::env::var("AURA_RULES")
            .map(PathBuf::from)
            .ok()
            .or(fc.paths.rules)
            .unwrap_or_else(|| data_dir.join("rules.toml"));

        let audit_path = std::env::var("AURA_AUDIT_LOG")
            .map(PathBuf::from)
            .ok()
            .or(fc.paths.audit_log)
            .unwrap_or_else(|| data_dir.join("audit.jsonl"));

        let defaults = VoiceConfig::default();
        let voice = VoiceConfig {
            enabled: std::env::var("AURA_VOICE")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.voice.enabled)
                .unwrap_or(defaults.enabled),
            wake_threshold: fc.voice.wake_threshold.unwrap_or(defaults.wake_threshold),
            wake_cooldown: secs(fc.voice.wake_cooldown_secs, defaults.wake_cooldown),
            utterance_max: secs(fc.voice.utterance_max_secs, defaults.utterance_max),
            silence_window: secs(fc.voice.silence_window_secs, defaults.silence_window),
            silence_threshold: fc
                .voice
                .silence_threshold
                .unwrap_or(defaults.silence_threshold),
            min_transcript_confidence: fc
                .voice
                .min_transcript_confidence
                .unwrap_or(defaults.min_transcript_confidence),
        };

        let default_timeouts = TimeoutConfig::default();
        let timeouts = TimeoutConfig {
            stt: secs(fc.timeouts.stt_secs, default_timeouts.stt),
            resolver: secs(fc.timeouts.resolver_secs, default_timeouts.resolver),
            tts: secs(fc.timeouts.tts_secs, default_timeouts.tts),
            actuator: secs(fc.timeouts.actuator_secs, default_timeouts.actuator),
        };

        let default_confirmation = ConfirmationConfig::default();
        let confirmation = ConfirmationConfig {
            window: secs(fc.confirmation.window_secs, default_confirmation.window),
            fast_path: fc
                .confirmation
                .fast_path
                .unwrap_or(default_confirmation.fast_path),
        };

        if !(0.0..=1.0).contains(&voice.wake_threshold) {
            return Err(Error::Config(format!(
                "wake_threshold must be within [0, 1], got {}",
                voice.wake_threshold
            )));
        }

        Ok(Self {
            data_dir,
            rules_path,
            audit_path,
            voice,
            timeouts,
            confirmation,
        })
    }
}

/// Seconds-as-float override with a default
fn secs(value: Option<f64>, default: Duration) -> Duration {
    value.map_or(default, Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let voice = VoiceConfig::default();
        assert!(voice.wake_threshold > 0.0 && voice.wake_threshold < 1.0);
        assert!(voice.silence_window < voice.utterance_max);

        let confirmation = ConfirmationConfig::default();
        assert!(!confirmation.fast_path);
    }

    #[test]
    fn test_file_overlay_wins_over_defaults() {
        let fc: file::EngineConfigFile = toml::from_str(
            r#"
            [paths]
            data_dir = "/tmp/aura-test-config"

            [voice]
            wake_threshold = 0.8

            [timeouts]
            resolver_secs = 5.0
        "#,
        )
        .unwrap();

        let config = Config::from_file(fc).unwrap();
        assert!((config.voice.wake_threshold - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.timeouts.resolver, Duration::from_secs(5));
        assert_eq!(config.timeouts.stt, TimeoutConfig::default().stt);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let fc: file::EngineConfigFile = toml::from_str(
            r#"
            [paths]
            data_dir = "/tmp/aura-test-config"

            [voice]
            wake_threshold = 1.5
        "#,
        )
        .unwrap();

        assert!(Config::from_file(fc).is_err());
    }
}
