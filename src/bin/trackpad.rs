//! Trackpad CLI - offline tooling for the gesture classifier
//!
//! Commands:
//! - replay: Run a frame recording through the classifier (batch mode)
//! - run: Classify frames streamed on stdin (streaming mode)
//! - validate: Validate a frame recording
//! - config: Print the default classifier configuration
//! - doctor: Diagnose configuration and environment

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use trackpad_gestures::recording::{RecordedFrame, RecordingAdapter, ReplayedEvent, SCHEMA_VERSION};
use trackpad_gestures::{GestureClassifier, GestureConfig, PRODUCER_NAME, VERSION};

/// Trackpad - scroll, pan and pinch-zoom classification for multitouch frames
#[derive(Parser)]
#[command(name = "trackpad")]
#[command(version = VERSION)]
#[command(about = "Classify recorded trackpad frames into gestures", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a frame recording through the classifier (batch mode)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Classifier configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Classify frames streamed on stdin (streaming mode)
    Run {
        /// Classifier configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Flush output after each event (--flush false to batch writes)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        flush: bool,
    },

    /// Validate a frame recording
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default classifier configuration
    Config,

    /// Diagnose configuration and environment
    Doctor {
        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one frame per line)
    Ndjson,
    /// JSON array of frames
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), TrackpadCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            config,
        } => cmd_replay(&input, &output, input_format, output_format, config.as_deref()),

        Commands::Run { config, flush } => cmd_run(config.as_deref(), flush),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Config => cmd_config(),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn load_classifier(config: Option<&Path>) -> Result<GestureClassifier, TrackpadCliError> {
    let config = match config {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            GestureConfig::from_json(&json)?
        }
        None => GestureConfig::default(),
    };
    Ok(GestureClassifier::with_config(config)?)
}

fn read_frames(
    input: &Path,
    input_format: InputFormat,
) -> Result<Vec<RecordedFrame>, TrackpadCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let frames = match input_format {
        InputFormat::Ndjson => RecordingAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => RecordingAdapter::parse_array(&input_data)?,
    };
    Ok(frames)
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: Option<&Path>,
) -> Result<(), TrackpadCliError> {
    let frames = read_frames(input, input_format)?;
    if frames.is_empty() {
        return Err(TrackpadCliError::NoFrames);
    }

    let failures = RecordingAdapter::validate_frames(&frames);
    if let Some(first) = failures.first() {
        return Err(TrackpadCliError::Validation(first.error.clone()));
    }

    let mut classifier = load_classifier(config)?;
    let events = RecordingAdapter::replay(&frames, &mut classifier);
    info!(frames = frames.len(), events = events.len(), "replay complete");

    let output_data = format_output(&events, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(config: Option<&Path>, flush: bool) -> Result<(), TrackpadCliError> {
    let mut classifier = load_classifier(config)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut previous: Option<RecordedFrame> = None;
    let mut index = 0usize;

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let frame: RecordedFrame = serde_json::from_str(trimmed)
            .map_err(|e| TrackpadCliError::ParseError(format!("Failed to parse frame: {}", e)))?;
        frame.validate()?;

        let dt = RecordingAdapter::frame_dt(previous.as_ref(), &frame);
        for event in classifier.update(&frame.snapshot(), dt) {
            let record = ReplayedEvent {
                frame: index,
                timestamp: frame.timestamp,
                event: event.clone(),
            };
            writeln!(stdout, "{}", serde_json::to_string(&record)?)?;
            if flush {
                stdout.flush()?;
            }
        }

        debug!(frame = index, state = classifier.state().as_str(), "frame processed");
        previous = Some(frame);
        index += 1;
    }

    stdout.flush()?;
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), TrackpadCliError> {
    let frames = read_frames(input, input_format)?;
    let failures = RecordingAdapter::validate_frames(&frames);

    let report = ValidationReport {
        total_frames: frames.len(),
        valid_frames: frames.len() - failures.len(),
        invalid_frames: failures.len(),
        errors: failures
            .iter()
            .map(|f| ValidationErrorDetail {
                index: f.index,
                timestamp: f.timestamp.to_rfc3339(),
                error: f.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total frames:   {}", report.total_frames);
        println!("Valid frames:   {}", report.valid_frames);
        println!("Invalid frames: {}", report.invalid_frames);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Frame {} ({}): {}", err.index, err.timestamp, err.error);
            }
        }
    }

    if report.invalid_frames > 0 {
        Err(TrackpadCliError::ValidationFailed(report.invalid_frames))
    } else {
        Ok(())
    }
}

fn cmd_config() -> Result<(), TrackpadCliError> {
    println!("{}", GestureConfig::default().to_json()?);
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), TrackpadCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} version {}", PRODUCER_NAME, VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Frame schema: {}", SCHEMA_VERSION),
    });

    if let Some(config_path) = config {
        let check = if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(content) => match GestureConfig::from_json(&content) {
                    Ok(parsed) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Config valid (scroll reference {:?}, one-finger pan {})",
                            parsed.scroll_reference, parsed.one_finger_pan
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                },
            }
        } else {
            DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist, defaults will be used".to_string(),
            }
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Trackpad Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    if report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error)) {
        Err(TrackpadCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn format_output(
    records: &[ReplayedEvent],
    format: &OutputFormat,
) -> Result<String, TrackpadCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            if lines.is_empty() {
                Ok(String::new())
            } else {
                Ok(lines.join("\n") + "\n")
            }
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum TrackpadCliError {
    Io(io::Error),
    Gesture(trackpad_gestures::GestureError),
    Json(serde_json::Error),
    Validation(trackpad_gestures::recording::ValidationError),
    NoFrames,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for TrackpadCliError {
    fn from(e: io::Error) -> Self {
        TrackpadCliError::Io(e)
    }
}

impl From<trackpad_gestures::GestureError> for TrackpadCliError {
    fn from(e: trackpad_gestures::GestureError) -> Self {
        TrackpadCliError::Gesture(e)
    }
}

impl From<serde_json::Error> for TrackpadCliError {
    fn from(e: serde_json::Error) -> Self {
        TrackpadCliError::Json(e)
    }
}

impl From<trackpad_gestures::recording::ValidationError> for TrackpadCliError {
    fn from(e: trackpad_gestures::recording::ValidationError) -> Self {
        TrackpadCliError::Validation(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<TrackpadCliError> for CliError {
    fn from(e: TrackpadCliError) -> Self {
        match e {
            TrackpadCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            TrackpadCliError::Gesture(e) => CliError {
                code: "GESTURE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the configuration and input frames".to_string()),
            },
            TrackpadCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            TrackpadCliError::Validation(e) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'trackpad validate' for details".to_string()),
            },
            TrackpadCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            TrackpadCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} frames failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            TrackpadCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            TrackpadCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_frames: usize,
    valid_frames: usize,
    invalid_frames: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    timestamp: String,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
