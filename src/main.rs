//! serial-scan - Serial number recognition pipeline
//!
//! Replays recorded scan sessions through the recognition core, writes
//! accessory profiles, and checks strings against the serial rules.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use serial_scan::analysis::{CandidateCorrector, FormatValidator};
use serial_scan::capture::load_trace;
use serial_scan::config::{self, AppConfig};
use serial_scan::storage::{self, load_profile, load_profiles_dir, save_profile};
use serial_scan::vision::RawCandidate;
use serial_scan::{AccessoryProfile, Decision, PowerState, ScanEvent, ScanPipeline};

/// serial-scan - Frame-to-decision serial number recognition
#[derive(Parser, Debug)]
#[command(name = "serial-scan")]
#[command(about = "Serial number recognition pipeline with cross-frame consensus")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a recorded trace through the pipeline and print the decision
    Replay {
        /// Trace file (JSON)
        #[arg(short, long)]
        trace: PathBuf,

        /// Accessory profile (JSON); the built-in default when omitted
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Start in power-saving mode
        #[arg(long)]
        power_saving: bool,

        /// Override the trace's capture interval
        #[arg(long)]
        frame_interval_ms: Option<u64>,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write or list accessory profiles
    Profile {
        /// Write the default profile to this path
        #[arg(short, long)]
        write: Option<PathBuf>,

        /// List profiles in the profiles directory
        #[arg(long)]
        list: bool,
    },
    /// Run correction and format validation on text
    Check {
        /// Strings to check
        #[arg(required = true)]
        text: Vec<String>,

        /// Accessory profile (JSON)
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Engine confidence assumed for each string
        #[arg(long, default_value = "0.8")]
        confidence: f32,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (config, config_source) = load_settings(args.config.as_deref())?;
    init_logging(&config.logging.level)?;
    info!("Using configuration from {}", config_source);

    match args.command {
        Command::Replay {
            trace,
            profile,
            power_saving,
            frame_interval_ms,
            json,
        } => run_replay(config, &trace, profile.as_deref(), power_saving, frame_interval_ms, json),
        Command::Profile { write, list } => run_profile(write.as_deref(), list),
        Command::Check {
            text,
            profile,
            confidence,
        } => run_check(&text, profile.as_deref(), confidence),
    }
}

fn init_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Load configuration from an explicit path, the default location, or defaults
fn load_settings(path: Option<&Path>) -> Result<(AppConfig, String)> {
    if let Some(path) = path {
        let config = config::load_config(path)
            .with_context(|| format!("Failed to load configuration {:?}", path))?;
        return Ok((config, format!("{:?}", path)));
    }
    if let Ok(config_path) = config::default_config_path() {
        if config_path.exists() {
            if let Ok(config) = config::load_config(&config_path) {
                return Ok((config, format!("{:?}", config_path)));
            }
        }
    }
    Ok((AppConfig::default(), "defaults".to_string()))
}

fn load_profile_or_default(path: Option<&Path>) -> Result<AccessoryProfile> {
    match path {
        Some(path) => {
            load_profile(path).with_context(|| format!("Failed to load profile {:?}", path))
        }
        None => Ok(AccessoryProfile::default()),
    }
}

fn run_replay(
    config: AppConfig,
    trace_path: &Path,
    profile_path: Option<&Path>,
    power_saving: bool,
    frame_interval_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut trace = load_trace(trace_path)
        .with_context(|| format!("Failed to load trace {:?}", trace_path))?;
    if let Some(ms) = frame_interval_ms {
        trace.frame_interval_ms = ms;
    }
    let base_dir = trace_path.parent().unwrap_or_else(|| Path::new("."));
    let profile = load_profile_or_default(profile_path)?;
    let time_budget = profile.time_budget();

    let recognizer = Arc::new(trace.recognizer());
    let pipeline = ScanPipeline::new(config, profile, recognizer)?;
    let events = pipeline.subscribe();

    if power_saving {
        pipeline.set_power_state(PowerState {
            power_saving: true,
            ..PowerState::default()
        });
    }

    let attempt = pipeline.start_scan()?;
    info!("Replaying {} frames into attempt {}", trace.frames.len(), attempt);

    let started = Instant::now();
    let mut decision = None;
    for (index, recorded) in trace.frames.iter().enumerate() {
        if let Some(power) = recorded.power {
            pipeline.set_power_state(power);
        }

        let captured_at = started + trace.frame_interval() * index as u32;
        if let Some(wait) = captured_at.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }

        let frame = trace.frame(index, base_dir, captured_at)?;
        let outcome = pipeline.submit_frame(frame);
        debug!("Frame {}: {:?}", index, outcome);

        decision = drain_events(&events, Duration::ZERO);
        if decision.is_some() {
            break;
        }
    }

    if decision.is_none() {
        decision = drain_events(&events, time_budget + Duration::from_secs(1));
    }

    let stats = pipeline.stats();
    info!(
        "Frames: {} submitted, {} dispatched, {} dropped, {} deferred, {} engine failures",
        stats.frames_submitted,
        stats.frames_dispatched,
        stats.frames_dropped,
        stats.frames_deferred,
        stats.engine_failures
    );

    let decision = decision.context("Pipeline finished without a decision")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        println!("{}", decision);
    }
    Ok(())
}

/// Log events until a decision arrives or `wait` elapses without one
fn drain_events(
    events: &crossbeam_channel::Receiver<ScanEvent>,
    wait: Duration,
) -> Option<Decision> {
    let deadline = Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = if remaining.is_zero() {
            events.try_recv().ok()?
        } else {
            events.recv_timeout(remaining).ok()?
        };
        match event {
            ScanEvent::Guidance(g) => debug!("Guidance: {}", g),
            ScanEvent::LiveText { text, confidence, .. } => {
                debug!("Live text: {} ({:.2})", text, confidence)
            }
            ScanEvent::Decision { decision, .. } => return Some(decision),
        }
    }
}

fn run_profile(write: Option<&Path>, list: bool) -> Result<()> {
    if let Some(path) = write {
        save_profile(&AccessoryProfile::default(), path)
            .with_context(|| format!("Failed to write profile {:?}", path))?;
        info!("Default profile written to {:?}", path);
    }

    if list {
        let dir = storage::get_profiles_dir()?;
        let profiles = load_profiles_dir(&dir)?;
        if profiles.is_empty() {
            println!("No profiles in {:?}", dir);
        }
        for profile in profiles {
            println!(
                "{} - {} ({} frames / {} ms)",
                profile.id, profile.name, profile.frame_budget, profile.time_budget_ms
            );
        }
    }
    Ok(())
}

fn run_check(texts: &[String], profile_path: Option<&Path>, confidence: f32) -> Result<()> {
    let profile = load_profile_or_default(profile_path)?;
    let corrector = CandidateCorrector::from_profile(&profile);
    let validator = FormatValidator::from_profile(&profile)?;

    for text in texts {
        let corrected = corrector.correct(&RawCandidate::new(text.as_str(), confidence), 0);
        let verdict = validator.validate(&corrected.text);
        let shape = match verdict.pattern {
            Some(p) => format!("well-formed ({:?} #{})", p.kind, p.index),
            None => "malformed".to_string(),
        };
        println!(
            "{:<20} -> {:<14} {:.2}  {}",
            text, corrected.text, corrected.confidence, shape
        );
    }
    Ok(())
}
