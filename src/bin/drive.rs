//! Drive CLI - Command-line interface for Drive Sense
//!
//! Commands:
//! - run: Classify streaming readings from stdin (streaming mode)
//! - transform: Classify a file of readings (batch mode)
//! - features: Print the synthesized feature row for every reading
//! - doctor: Diagnose configuration and model health
//! - schema: Print wire formats

use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use drive_sense::classifier::CentroidClassifier;
use drive_sense::config::ExtractorConfig;
use drive_sense::pipeline::{parse_json_array, parse_ndjson, DriveProcessor};
use drive_sense::session::SessionRegistry;
use drive_sense::types::{FeatureRow, ReadingEvent, Verdict, FEATURE_NAMES};
use drive_sense::{ComputeError, DRIVE_VERSION, PRODUCER_NAME};

/// Sessions are swept for idleness every this many input lines
const EXPIRY_SWEEP_INTERVAL: u64 = 256;

/// Drive - Driving-behavior classification from motion sensor streams
#[derive(Parser)]
#[command(name = "drive")]
#[command(version = DRIVE_VERSION)]
#[command(about = "Classify driving behavior from accelerometer and gyroscope readings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify readings from stdin, one verdict per line (streaming mode)
    Run {
        /// Classifier model file (overrides model_path in config)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Extractor config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Rolling window length (overrides config)
        #[arg(long)]
        window_size: Option<usize>,

        /// Embed the feature row in every verdict
        #[arg(long)]
        include_features: bool,

        /// Flush output after each record (`--flush false` to batch writes)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        flush: bool,

        /// Log and skip malformed lines instead of stopping
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Classify a file of readings (batch mode)
    Transform {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Classifier model file (overrides model_path in config)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Extractor config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Rolling window length (overrides config)
        #[arg(long)]
        window_size: Option<usize>,

        /// Embed the feature row in every verdict
        #[arg(long)]
        include_features: bool,
    },

    /// Print the feature row synthesized for every reading (no model needed)
    Features {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Extractor config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Rolling window length (overrides config)
        #[arg(long)]
        window_size: Option<usize>,
    },

    /// Diagnose configuration and model health
    Doctor {
        /// Check a classifier model file
        #[arg(long)]
        model: Option<PathBuf>,

        /// Check an extractor config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one reading per line)
    Ndjson,
    /// JSON array of readings
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (reading event)
    Input,
    /// Output schema (verdict)
    Output,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), DriveCliError> {
    match cli.command {
        Commands::Run {
            model,
            config,
            window_size,
            include_features,
            flush,
            continue_on_error,
        } => {
            let config = load_config(config.as_deref(), window_size, include_features)?;
            let processor = build_processor(model.as_deref(), &config)?;
            cmd_run(&processor, flush, continue_on_error)
        }

        Commands::Transform {
            input,
            output,
            input_format,
            output_format,
            model,
            config,
            window_size,
            include_features,
        } => {
            let config = load_config(config.as_deref(), window_size, include_features)?;
            let processor = build_processor(model.as_deref(), &config)?;
            cmd_transform(&processor, &input, &output, input_format, output_format)
        }

        Commands::Features {
            input,
            input_format,
            config,
            window_size,
        } => {
            let config = load_config(config.as_deref(), window_size, false)?;
            cmd_features(&config, &input, input_format)
        }

        Commands::Doctor { model, config, json } => {
            cmd_doctor(model.as_deref(), config.as_deref(), json)
        }

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_run(
    processor: &DriveProcessor,
    flush: bool,
    continue_on_error: bool,
) -> Result<(), DriveCliError> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line_no: u64 = 0;

    for line in stdin.lock().lines() {
        let line = line?;
        line_no += 1;

        if line_no % EXPIRY_SWEEP_INTERVAL == 0 {
            processor.expire_idle(Utc::now());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let verdict = ReadingEvent::from_json(trimmed).and_then(|event| processor.process_event(event));

        match verdict {
            Ok(verdict) => {
                writeln!(stdout, "{}", serde_json::to_string(&verdict)?)?;
                if flush {
                    stdout.flush()?;
                }
            }
            Err(e) if continue_on_error && is_recoverable(&e) => {
                warn!("Skipping line {}: {}", line_no, e);
            }
            Err(e) => {
                return Err(DriveCliError::ParseError(format!("line {}: {}", line_no, e)));
            }
        }
    }

    stdout.flush()?;
    info!(
        "Stream closed after {} lines ({} live sessions)",
        line_no,
        processor.session_count()
    );
    Ok(())
}

/// Errors tied to one bad input line, as opposed to a broken model
fn is_recoverable(e: &ComputeError) -> bool {
    matches!(
        e,
        ComputeError::MalformedReading(_) | ComputeError::JsonError(_) | ComputeError::ParseError(_)
    )
}

fn cmd_transform(
    processor: &DriveProcessor,
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
) -> Result<(), DriveCliError> {
    let events = read_events(input, input_format)?;

    if events.is_empty() {
        return Err(DriveCliError::NoEvents);
    }

    let verdicts = events
        .into_iter()
        .map(|event| processor.process_event(event))
        .collect::<Result<Vec<Verdict>, ComputeError>>()?;

    let output_data = format_output(&verdicts, &output_format)?;
    write_output(output, &output_data)
}

#[derive(serde::Serialize)]
struct FeatureRecord {
    vehicle_id: String,
    sequence: u64,
    complete: bool,
    features: FeatureRow,
}

fn cmd_features(
    config: &ExtractorConfig,
    input: &Path,
    input_format: InputFormat,
) -> Result<(), DriveCliError> {
    let events = read_events(input, input_format)?;

    if events.is_empty() {
        return Err(DriveCliError::NoEvents);
    }

    let registry = SessionRegistry::new(config)?;
    let mut stdout = io::stdout();

    for event in events {
        let step = registry.ingest(&event.vehicle_id, event.reading)?;
        let record = FeatureRecord {
            vehicle_id: event.vehicle_id,
            sequence: step.sequence,
            complete: step.row.is_complete(),
            features: step.row,
        };
        writeln!(stdout, "{}", serde_json::to_string(&record)?)?;
    }

    stdout.flush()?;
    Ok(())
}

fn cmd_doctor(model: Option<&Path>, config: Option<&Path>, json: bool) -> Result<(), DriveCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "drive_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Drive Sense version {}", DRIVE_VERSION),
    });

    // Config file, if given, also supplies the model path
    let mut model_path = model.map(Path::to_path_buf);
    match config {
        Some(path) => match ExtractorConfig::from_file(path) {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (window_size {}, idle timeout {}s)",
                        config.window_size, config.session_idle_timeout_secs
                    ),
                });
                if model_path.is_none() {
                    model_path = config.model_path;
                }
            }
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid config: {}", e),
            }),
        },
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "No config file, using defaults".to_string(),
        }),
    }

    match model_path {
        Some(path) if path.exists() => match CentroidClassifier::from_file(&path) {
            Ok(classifier) => {
                let labels: Vec<&str> = classifier.labels().map(|l| l.as_str()).collect();
                checks.push(DoctorCheck {
                    name: "model".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Model valid ({} classes: {})", labels.len(), labels.join(", ")),
                });
            }
            Err(e) => checks.push(DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot load model: {}", e),
            }),
        },
        Some(_) => checks.push(DoctorCheck {
            name: "model".to_string(),
            status: CheckStatus::Error,
            message: "Model file does not exist".to_string(),
        }),
        None => checks.push(DoctorCheck {
            name: "model".to_string(),
            status: CheckStatus::Warning,
            message: "No model configured; only 'features' will work".to_string(),
        }),
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
        version: DRIVE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Drive Doctor Report");
        println!("===================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(DriveCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), DriveCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input: one reading event per line (NDJSON)");
                println!();
                println!("- AccX, AccY, AccZ: linear acceleration (required, finite)");
                println!("- GyroX, GyroY, GyroZ: angular velocity (required, finite)");
                println!("- vehicle_id: stream key (optional, default \"default\")");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output: one verdict per reading");
                println!();
                println!("- drive_version: Library version");
                println!("- producer: {{ name, version, instance_id }}");
                println!("- vehicle_id, sequence, computed_at_utc");
                println!("- status: predicted | insufficient_data");
                println!("- predicted_behavior: Label (when predicted)");
                println!("- message: Warm-up notice (when insufficient_data)");
                println!("- features: {{ {} }} (with --include-features)", FEATURE_NAMES.join(", "));
            }
        }
    }

    Ok(())
}

// Helper functions

fn load_config(
    path: Option<&Path>,
    window_size: Option<usize>,
    include_features: bool,
) -> Result<ExtractorConfig, DriveCliError> {
    let mut config = match path {
        Some(path) => ExtractorConfig::from_file(path)?,
        None => ExtractorConfig::default(),
    };

    if let Some(window_size) = window_size {
        config.window_size = window_size;
    }
    if include_features {
        config.include_features = true;
    }

    config.validate()?;
    Ok(config)
}

fn build_processor(
    model: Option<&Path>,
    config: &ExtractorConfig,
) -> Result<DriveProcessor, DriveCliError> {
    let model_path = model
        .or(config.model_path.as_deref())
        .ok_or(DriveCliError::NoModel)?;

    let classifier = CentroidClassifier::from_file(model_path)?;
    info!(
        "Loaded model {} (window {})",
        model_path.display(),
        config.window_size
    );
    Ok(DriveProcessor::with_classifier(config, classifier)?)
}

fn read_input(input: &Path) -> Result<String, DriveCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_events(input: &Path, input_format: InputFormat) -> Result<Vec<ReadingEvent>, DriveCliError> {
    let input_data = read_input(input)?;
    let events = match input_format {
        InputFormat::Ndjson => parse_ndjson(&input_data)?,
        InputFormat::Json => parse_json_array(&input_data)?,
    };
    Ok(events)
}

fn write_output(output: &Path, data: &str) -> Result<(), DriveCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn format_output(verdicts: &[Verdict], format: &OutputFormat) -> Result<String, DriveCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for verdict in verdicts {
                lines.push(serde_json::to_string(verdict)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(verdicts)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(verdicts)?),
    }
}

fn get_input_json_schema() -> String {
    let axis = serde_json::json!({ "type": "number" });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "drive.reading_event",
        "description": "One 6-axis motion sensor reading",
        "type": "object",
        "required": ["AccX", "AccY", "AccZ", "GyroX", "GyroY", "GyroZ"],
        "properties": {
            "vehicle_id": { "type": "string", "default": "default" },
            "AccX": axis,
            "AccY": axis,
            "AccZ": axis,
            "GyroX": axis,
            "GyroY": axis,
            "GyroZ": axis
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    let feature_properties: serde_json::Map<String, serde_json::Value> = FEATURE_NAMES
        .iter()
        .map(|name| {
            (
                name.to_string(),
                serde_json::json!({ "type": ["number", "null"] }),
            )
        })
        .collect();

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "drive.verdict",
        "description": "Driving-behavior verdict for one reading",
        "type": "object",
        "required": ["drive_version", "producer", "vehicle_id", "sequence", "computed_at_utc", "status"],
        "properties": {
            "drive_version": { "type": "string" },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "instance_id": { "type": "string" }
                }
            },
            "vehicle_id": { "type": "string" },
            "sequence": { "type": "integer", "minimum": 1 },
            "computed_at_utc": { "type": "string", "format": "date-time" },
            "status": { "type": "string", "enum": ["predicted", "insufficient_data"] },
            "predicted_behavior": { "type": "string" },
            "message": { "type": "string" },
            "features": {
                "type": "object",
                "properties": feature_properties
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum DriveCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoModel,
    NoEvents,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for DriveCliError {
    fn from(e: io::Error) -> Self {
        DriveCliError::Io(e)
    }
}

impl From<ComputeError> for DriveCliError {
    fn from(e: ComputeError) -> Self {
        DriveCliError::Compute(e)
    }
}

impl From<serde_json::Error> for DriveCliError {
    fn from(e: serde_json::Error) -> Self {
        DriveCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DriveCliError> for CliError {
    fn from(e: DriveCliError) -> Self {
        match e {
            DriveCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            DriveCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::InvalidConfig(_) => ("CONFIG_ERROR", "Check window_size and config values"),
                    ComputeError::ModelError(_) | ComputeError::Classifier(_) => {
                        ("MODEL_ERROR", "Run 'drive doctor --model <file>' for details")
                    }
                    ComputeError::MalformedReading(_) => {
                        ("MALFORMED_READING", "Every reading needs six finite axis values")
                    }
                    _ => ("COMPUTE_ERROR", "Run 'drive schema input' for the expected format"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            DriveCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            DriveCliError::NoModel => CliError {
                code: "NO_MODEL".to_string(),
                message: "No classifier model configured".to_string(),
                hint: Some("Pass --model or set model_path in the config file".to_string()),
            },
            DriveCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No readings found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            DriveCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            DriveCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Use --continue-on-error to skip malformed lines".to_string()),
            },
        }
    }
}

// Report types

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
