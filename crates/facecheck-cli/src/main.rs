use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facecheck_capture::{DirectorySource, ImageSource, StillImageSource};
use facecheck_core::{Outcome, Pipeline, Registry, RustfaceDetector};
use facecheck_store::JsonRegistry;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "facecheck", version, about = "Face verification against an enrolled registry")]
struct Cli {
    /// TOML configuration file (default: $FACECHECK_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Input {
    /// Image file (or, for `check`, a directory of frames)
    path: Option<PathBuf>,

    /// Capture from a V4L2 device instead of a file ("default" uses the configured device)
    #[cfg(feature = "v4l")]
    #[arg(long, num_args = 0..=1, default_missing_value = "default", conflicts_with = "path")]
    camera: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the quality gate and print advisory feedback
    Check {
        /// Gate with the enrollment face size instead of the live one
        #[arg(long)]
        enroll: bool,
        #[command(flatten)]
        input: Input,
    },
    /// Identify the face in an image against enrolled identities
    Verify {
        #[command(flatten)]
        input: Input,
    },
    /// Register (or replace) an identity
    Enroll {
        /// Name of the person
        #[arg(short, long)]
        name: String,
        #[command(flatten)]
        input: Input,
    },
    /// List enrolled identities
    List,
    /// Remove an enrolled identity (case-insensitive)
    Delete {
        name: String,
    },
    /// Show registry and threshold status
    Status,
    /// List V4L2 capture devices
    #[cfg(feature = "v4l")]
    Cameras,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Check { enroll, input } => check(&config, &input, enroll),
        Commands::Verify { input } => verify(&config, &input),
        Commands::Enroll { name, input } => enroll(&config, &name, &input),
        Commands::List => list(&config),
        Commands::Delete { name } => delete(&config, &name),
        Commands::Status => status(&config),
        #[cfg(feature = "v4l")]
        Commands::Cameras => cameras(),
    }
}

fn open_registry(config: &Config) -> Result<JsonRegistry> {
    let preprocessor = facecheck_core::FeaturePreprocessor::new(config.pipeline.enhance.clone());
    JsonRegistry::open(&config.registry.db_path, &config.registry.faces_dir, preprocessor)
        .context("opening registry")
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let detector = RustfaceDetector::load(&config.detector.model_path, config.detector.params.clone())
        .context("loading face detector")?;
    Ok(Pipeline::new(Box::new(detector), config.pipeline.clone()))
}

fn open_source(config: &Config, input: &Input) -> Result<Box<dyn ImageSource>> {
    #[cfg(feature = "v4l")]
    if let Some(device) = &input.camera {
        let device = if device == "default" { config.camera.device.as_str() } else { device.as_str() };
        let params = facecheck_capture::CameraParams {
            width: config.camera.width,
            height: config.camera.height,
            warmup_frames: config.camera.warmup_frames,
        };
        let camera = facecheck_capture::CameraSource::open(device, &params)
            .with_context(|| format!("opening camera {device}"))?;
        return Ok(Box::new(camera));
    }
    #[cfg(not(feature = "v4l"))]
    let _ = config;

    let path = input.path.clone().context("an image path is required")?;
    if path.is_dir() {
        Ok(Box::new(DirectorySource::open(&path)?))
    } else {
        Ok(Box::new(StillImageSource::new(path)))
    }
}

fn check(config: &Config, input: &Input, for_enrollment: bool) -> Result<ExitCode> {
    let pipeline = build_pipeline(config)?;
    let evaluate = if for_enrollment { Pipeline::check_quality_for_enrollment } else { Pipeline::check_quality };

    if let Some(dir) = input.path.as_ref().filter(|p| p.is_dir()) {
        let mut frames = DirectorySource::open(dir)?;
        let mut ready = 0usize;
        while let Some(path) = frames.peek_path().map(|p| p.to_path_buf()) {
            let frame = frames.next_frame()?;
            let report = evaluate(&pipeline, &frame)?;
            if report.state.is_ready() {
                ready += 1;
            }
            println!("{}: {}", path.display(), report.message());
        }
        println!("{ready}/{} frames ready", frames.len());
        return Ok(if ready > 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    let mut source = open_source(config, input)?;
    let frame = source.next_frame()?;
    let report = evaluate(&pipeline, &frame)?;
    println!("{}", report.message());
    Ok(if report.state.is_ready() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn verify(config: &Config, input: &Input) -> Result<ExitCode> {
    let pipeline = build_pipeline(config)?;
    let registry = open_registry(config)?;
    let mut source = open_source(config, input)?;
    let frame = source.next_frame()?;
    tracing::debug!(source = %source.describe(), "verifying frame");

    let outcome = match pipeline.verify(&frame, &registry) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::debug!(error = %e, "verification aborted");
            println!("{}", e.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };

    match outcome {
        Outcome::Accept { name, confidence } => {
            println!("ACCESS GRANTED: welcome, {name} (confidence {confidence:.1}%)");
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Uncertain { best_name, confidence } => {
            println!("UNCERTAIN: best match {best_name} ({confidence:.1}%) is too close to call");
            Ok(ExitCode::FAILURE)
        }
        Outcome::Reject { top_candidates } if top_candidates.is_empty() => {
            println!("NO MATCH");
            Ok(ExitCode::FAILURE)
        }
        Outcome::Reject { top_candidates } => {
            println!("NOT RECOGNIZED");
            println!("best matches:");
            for c in &top_candidates {
                println!("  {}: {:.1}%", c.name, c.score * 100.0);
            }
            println!("required: {:.0}%", pipeline.config().decision.threshold * 100.0);
            Ok(ExitCode::FAILURE)
        }
        Outcome::NoEnrollments => {
            println!("NO USERS ENROLLED: register with `facecheck enroll --name <name> <image>`");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn enroll(config: &Config, name: &str, input: &Input) -> Result<ExitCode> {
    let pipeline = build_pipeline(config)?;
    let mut registry = open_registry(config)?;
    let mut source = open_source(config, input)?;
    let frame = source.next_frame()?;

    match pipeline.enroll(name, &frame, &mut registry) {
        Ok(identity) => {
            println!("REGISTERED: {} ({})", identity.name, identity.reference);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::debug!(error = %e, "enrollment aborted");
            println!("{}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn list(config: &Config) -> Result<ExitCode> {
    let users = open_registry(config)?.summaries()?;
    if users.is_empty() {
        println!("No users registered yet.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Registered users ({}):", users.len());
    for (i, user) in users.iter().enumerate() {
        println!("{:>3}. {}  (registered {})", i + 1, user.name, user.registered_at);
    }
    Ok(ExitCode::SUCCESS)
}

fn delete(config: &Config, name: &str) -> Result<ExitCode> {
    let mut registry = open_registry(config)?;
    if registry.delete(name)? {
        println!("User '{name}' deleted.");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("User '{name}' not found.");
        Ok(ExitCode::FAILURE)
    }
}

fn status(config: &Config) -> Result<ExitCode> {
    let registry = open_registry(config)?;
    let p = &config.pipeline;
    println!("identities:       {}", registry.count()?);
    println!("registry:         {}", registry.db_path().display());
    println!("reference images: {}", registry.faces_dir().display());
    println!("detector model:   {}", config.detector.model_path.display());
    println!("threshold:        {:.0}% (ambiguity gap {:.0}%)", p.decision.threshold * 100.0, p.decision.ambiguity_gap * 100.0);
    println!(
        "quality gate:     face >= {0}x{0} (enroll {1}x{1}), sharpness >= {2}, brightness {3}-{4}",
        p.quality.min_face_size,
        p.enrollment_min_face_size,
        p.quality.min_sharpness,
        p.quality.min_brightness,
        p.quality.max_brightness
    );
    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "v4l")]
fn cameras() -> Result<ExitCode> {
    let devices = facecheck_capture::CameraSource::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found.");
        return Ok(ExitCode::FAILURE);
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
    Ok(ExitCode::SUCCESS)
}
