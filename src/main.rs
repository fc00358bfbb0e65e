use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use aura_engine::audio::{
    AudioCapture, DEFAULT_QUEUE_FRAMES, FrameQueue, SpeakerOutput, WakeGate,
};
use aura_engine::dispatch::{ActionDispatcher, LogActuator, OsCommandActuator};
use aura_engine::policy::{FileAuditLog, PolicyEngine, RuleSet};
use aura_engine::stages::builtin::{
    EnergyWakeModel, KeywordResolver, NullOutput, SilentSynthesizer, UnavailableStt, rms,
};
use aura_engine::stages::AudioOutput;
use aura_engine::{ActionKind, Capabilities, Config, SessionOrchestrator, Transcript};

/// Aura - Local, offline voice-assistant turn engine
#[derive(Parser)]
#[command(name = "aura", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/aura/config.toml)
    #[arg(short, long, env = "AURA_CONFIG")]
    config: Option<PathBuf>,

    /// Policy rules file (defaults to rules.toml in the data directory)
    #[arg(short, long, env = "AURA_RULES")]
    rules: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable audio capture and playback (text mode only)
    #[arg(long, env = "AURA_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Validate the policy rules file and show what it allows
    CheckRules,
    /// Run one text turn through the engine, as if it had been spoken
    Say {
        /// The request text
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,aura_engine=info",
        1 => "info,aura_engine=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(mut cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command.take() {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::CheckRules => check_rules(&cli),
            Command::Say { text } => say(&cli, &text).await,
        };
    }

    let config = load_config(&cli)?;
    let rules = load_rules(&config, cli.rules.as_deref())?;

    if !config.voice.enabled || cli.disable_voice {
        tracing::info!("voice disabled; use `aura say` for text turns");
        return Ok(());
    }

    let wake_threshold = config.voice.wake_threshold;
    let mut orchestrator = build_orchestrator(config, rules, true)?;

    let queue = FrameQueue::new(DEFAULT_QUEUE_FRAMES);
    let mut capture = AudioCapture::new(queue.clone())?;
    capture.start()?;

    let mut gate = WakeGate::new(Arc::new(EnergyWakeModel), wake_threshold);

    tracing::info!("aura ready - listening");

    tokio::select! {
        result = orchestrator.run(&queue, &mut gate) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    capture.stop();
    Ok(())
}

/// Load runtime configuration, honoring the CLI config file override
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

/// Load the policy ruleset
///
/// A missing default rules file yields an empty ruleset, which denies
/// everything; an explicitly named file must exist.
fn load_rules(config: &Config, override_path: Option<&std::path::Path>) -> anyhow::Result<RuleSet> {
    let path = override_path.unwrap_or(&config.rules_path);

    if path.exists() {
        let rules = RuleSet::load(path)?;
        tracing::info!(path = %path.display(), count = rules.rules.len(), "loaded policy rules");
        Ok(rules)
    } else if override_path.is_some() {
        anyhow::bail!("rules file not found: {}", path.display());
    } else {
        tracing::warn!(
            path = %path.display(),
            "no rules file found; every action will be denied"
        );
        Ok(RuleSet::default())
    }
}

/// Assemble the engine over the built-in capability adapters
///
/// Model-backed STT, resolution, and TTS slot in behind the same traits;
/// the built-ins keep the engine runnable with no models installed.
fn build_orchestrator(
    config: Config,
    rules: RuleSet,
    voice_enabled: bool,
) -> anyhow::Result<SessionOrchestrator> {
    let audit = Arc::new(FileAuditLog::open(&config.audit_path)?);
    let policy = PolicyEngine::new(rules, audit);

    let dispatcher = ActionDispatcher::new()
        .with_actuator(ActionKind::OsAction, Arc::new(OsCommandActuator))
        .with_actuator(ActionKind::BrowserAction, Arc::new(LogActuator::new("browser")))
        .with_actuator(
            ActionKind::MessagingAction,
            Arc::new(LogActuator::new("messaging")),
        )
        .with_actuator(ActionKind::Query, Arc::new(LogActuator::new("query")));

    let output: Arc<dyn AudioOutput> = if voice_enabled {
        match SpeakerOutput::new() {
            Ok(speaker) => Arc::new(speaker),
            Err(e) => {
                tracing::warn!(error = %e, "no playback device, responses will be logged only");
                Arc::new(NullOutput)
            }
        }
    } else {
        Arc::new(NullOutput)
    };

    let capabilities = Capabilities {
        stt: Arc::new(UnavailableStt),
        resolver: Arc::new(KeywordResolver),
        tts: Arc::new(SilentSynthesizer),
        output,
    };

    Ok(SessionOrchestrator::new(config, policy, dispatcher, capabilities)?)
}

/// Validate the policy rules file and show what it allows
fn check_rules(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let rules = load_rules(&config, cli.rules.as_deref())?;

    println!("{} rule(s), evaluated top to bottom:\n", rules.rules.len());
    for rule in &rules.rules {
        println!("  {:<24} {:<18} {:?}", rule.id, rule.kind.to_string(), rule.verdict);
        println!("      reason: {}", rule.reason);
        for (param, matcher) in &rule.matchers {
            println!("      match:  {param} = {matcher:?}");
        }
    }

    let kinds = rules.dispatchable_kinds();
    if kinds.is_empty() {
        println!("\nNo rule can allow anything; every intent will be denied.");
    } else {
        let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        println!("\nDispatchable kinds: {}", names.join(", "));
    }
    println!("Anything not matched above is denied.");

    Ok(())
}

/// Run one text turn through the full engine
async fn say(cli: &Cli, text: &str) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let rules = load_rules(&config, cli.rules.as_deref())?;
    let mut orchestrator = build_orchestrator(config, rules, false)?;

    let outcome = orchestrator
        .run_text_turn(Transcript::new(text, 1.0))
        .await?;

    println!("{}", outcome.spoken_line());
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let queue = FrameQueue::new(DEFAULT_QUEUE_FRAMES);
    let mut capture = AudioCapture::new(queue.clone())?;
    capture.start()?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut samples = Vec::new();
        while let Ok(frame) = tokio::time::timeout(Duration::from_millis(1), queue.pop()).await {
            samples.extend_from_slice(&frame.samples);
        }

        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}
