//! Keyflux CLI - Command-line interface for Keystroke Flux
//!
//! Commands:
//! - capture: Replay a recorded key signal stream into per-field key logs
//! - extract: Turn key logs into the digraph feature table
//! - score: Run consensus scoring over a prediction response
//! - verify: Extract, predict remotely and score in one step
//! - validate: Validate key signal schema
//! - doctor: Diagnose configuration and environment
//! - schema: Print schema information

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use keystroke_flux::config::{KeystrokeConfig, ENV_PREDICTION_URL};
use keystroke_flux::pipeline::parse_key_data;
use keystroke_flux::schema::{KeySignal, KeySignalAdapter, SCHEMA_VERSION};
use keystroke_flux::{
    decode_predictions, extract_feature_table, CaptureSession, ConsensusScores, KeystrokeError,
    KeystrokeVerifier, KEYFLUX_VERSION, PRODUCER_NAME,
};

/// Keyflux - keystroke-dynamics capture and identity consensus
#[derive(Parser)]
#[command(name = "keyflux")]
#[command(version = KEYFLUX_VERSION)]
#[command(about = "Turn keystroke timings into features and identity consensus", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay key signals into per-field key logs
    Capture {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Field to register up front (repeatable), in addition to configured fields
        #[arg(long = "field")]
        fields: Vec<String>,

        /// Pretty-print the key logs
        #[arg(long)]
        pretty: bool,
    },

    /// Extract the digraph feature table from key logs
    Extract {
        /// Key logs JSON (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Score a prediction response and print the consensus label
    Score {
        /// Prediction response JSON (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output the full score table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract features, query the prediction service and score the result
    Verify {
        /// Key logs JSON (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Prediction endpoint (overrides config and environment)
        #[arg(long)]
        endpoint: Option<String>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Output the full verification as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate key signal schema
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

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one signal per line)
    Ndjson,
    /// JSON array of signals
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one row per line)
    Ndjson,
    /// JSON array of rows
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (keystroke.signal.v1)
    Input,
    /// Key logs (field → key events)
    KeyData,
    /// Feature table rows
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

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

fn run(cli: Cli) -> Result<(), KeyfluxCliError> {
    let loaded = load_config(cli.config.as_deref());
    init_logging(
        loaded
            .as_ref()
            .map(|c| c.logging.level.as_str())
            .unwrap_or("info"),
    );

    match cli.command {
        Commands::Capture {
            input,
            output,
            input_format,
            fields,
            pretty,
        } => cmd_capture(loaded?, &input, &output, input_format, fields, pretty),

        Commands::Extract {
            input,
            output,
            output_format,
        } => cmd_extract(&input, &output, output_format),

        Commands::Score { input, json } => cmd_score(&input, json),

        Commands::Verify {
            input,
            endpoint,
            timeout_secs,
            json,
        } => cmd_verify(loaded?, &input, endpoint, timeout_secs, json),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { json } => cmd_doctor(cli.config.as_deref(), loaded, json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn load_config(path: Option<&Path>) -> Result<KeystrokeConfig, KeystrokeError> {
    let mut config = match path {
        Some(path) => KeystrokeConfig::load(path)?,
        None => KeystrokeConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

/// Logs go to stderr so stdout stays machine-readable; RUST_LOG wins over config
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn cmd_capture(
    config: KeystrokeConfig,
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    fields: Vec<String>,
    pretty: bool,
) -> Result<(), KeyfluxCliError> {
    let input_data = read_input(input)?;
    let signals = parse_signals(&input_data, &input_format)?;

    if signals.is_empty() {
        return Err(KeyfluxCliError::NoSignals);
    }
    KeySignalAdapter::ensure_valid(&signals)?;

    let mut capture = config.capture;
    for field in fields {
        if !capture.fields.contains(&field) {
            capture.fields.push(field);
        }
    }

    let mut session = CaptureSession::new(capture);
    let stats = KeySignalAdapter::replay(&signals, &mut session);
    info!(
        total = stats.total,
        recorded = stats.recorded,
        resets = stats.resets,
        ignored = stats.ignored(),
        "Capture replay finished"
    );

    let logs = session.finish();
    let output_data = if pretty {
        serde_json::to_string_pretty(&logs)? + "\n"
    } else {
        serde_json::to_string(&logs)? + "\n"
    };

    write_output(output, &output_data)
}

fn cmd_extract(
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
) -> Result<(), KeyfluxCliError> {
    let input_data = read_input(input)?;
    let logs = parse_key_data(&input_data)?;
    let rows = extract_feature_table(&logs);

    info!(
        fields = logs.len(),
        events = logs.total_events(),
        rows = rows.len(),
        "Feature table extracted"
    );

    let output_data = format_output(&rows, &output_format)?;
    write_output(output, &output_data)
}

fn cmd_score(input: &Path, json: bool) -> Result<(), KeyfluxCliError> {
    let input_data = read_input(input)?;
    let predictions = decode_predictions(&input_data)?;
    let scores = ConsensusScores::from_predictions(&predictions);
    let label = scores.winner().map(|w| w.label.clone());

    if json {
        let report = ScoreReport {
            samples: predictions.len(),
            label,
            scores,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_scores(label.as_deref(), &scores);
    }

    Ok(())
}

fn cmd_verify(
    mut config: KeystrokeConfig,
    input: &Path,
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    json: bool,
) -> Result<(), KeyfluxCliError> {
    if let Some(endpoint) = endpoint {
        config.prediction.endpoint = Some(endpoint);
    }
    if let Some(timeout_secs) = timeout_secs {
        config.prediction.timeout_secs = timeout_secs;
    }

    let input_data = read_input(input)?;
    let verifier = KeystrokeVerifier::from_config(&config.prediction)?;
    let verification = verifier.verify_json(&input_data)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verification)?);
    } else {
        println!("Feature rows: {}", verification.rows.len());
        println!("Samples:      {}", verification.predictions.len());
        print_scores(verification.label.as_deref(), &verification.scores);
    }

    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), KeyfluxCliError> {
    let input_data = read_input(input)?;
    let signals = parse_signals(&input_data, &input_format)?;

    let results = KeySignalAdapter::validate_signals(&signals);

    let report = ValidationReport {
        total_signals: signals.len(),
        valid_signals: signals.len() - results.len(),
        invalid_signals: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                field: r.field.clone(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total signals:   {}", report.total_signals);
        println!("Valid signals:   {}", report.valid_signals);
        println!("Invalid signals: {}", report.invalid_signals);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Signal {} (field {:?}): {}",
                    err.index, err.field, err.error
                );
            }
        }
    }

    if report.invalid_signals > 0 {
        Err(KeyfluxCliError::ValidationFailed(report.invalid_signals))
    } else {
        Ok(())
    }
}

fn cmd_doctor(
    config_path: Option<&Path>,
    loaded: Result<KeystrokeConfig, KeystrokeError>,
    json: bool,
) -> Result<(), KeyfluxCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck::ok(
        "keyflux_version",
        format!("Keyflux version {}", KEYFLUX_VERSION),
    ));

    checks.push(DoctorCheck::ok(
        "schema_version",
        format!("Input schema: {}", SCHEMA_VERSION),
    ));

    let config = match (config_path, loaded) {
        (Some(path), Ok(config)) => {
            checks.push(DoctorCheck::ok(
                "config",
                format!("Loaded {}", path.display()),
            ));
            Some(config)
        }
        (None, Ok(config)) => {
            checks.push(DoctorCheck::ok(
                "config",
                "No config file given, using defaults".to_string(),
            ));
            Some(config)
        }
        (_, Err(e)) => {
            checks.push(DoctorCheck::error("config", e.to_string()));
            None
        }
    };

    if let Some(config) = &config {
        checks.push(DoctorCheck::ok(
            "capture",
            format!(
                "{} configured fields, {} excluded keys",
                config.capture.fields.len(),
                config.capture.excluded_keys.len()
            ),
        ));

        checks.push(match config.prediction.endpoint.as_deref() {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                DoctorCheck::ok(
                    "prediction_endpoint",
                    format!("{} (timeout {}s)", url, config.prediction.timeout_secs),
                )
            }
            Some(url) => DoctorCheck::error(
                "prediction_endpoint",
                format!("Not an http(s) URL: {}", url),
            ),
            None => DoctorCheck::warning(
                "prediction_endpoint",
                format!("Not configured; set {} to enable verify", ENV_PREDICTION_URL),
            ),
        });
    }

    // Check stdin is available (for piping signal streams)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck::ok("stdin", "stdin is a TTY (interactive mode)".to_string())
    } else {
        DoctorCheck::ok("stdin", "stdin is a pipe (ready for input)".to_string())
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: KEYFLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Keyflux Doctor Report");
        println!("=====================");
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
        Err(KeyfluxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), KeyfluxCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("One record per key press or release, in arrival order:");
                println!();
                println!("- key: Logical key (\"a\", \"Backspace\", ...)");
                println!("- field: Identifier of the target input field");
                println!("- event_type: down | up");
                println!("- timestamp: Epoch milliseconds");
                println!("- focused: Whether the field had focus (default true)");
                println!("- field_empty: Whether the field was empty at press time (default false)");
                println!();
                println!("Modifier, navigation and function keys are dropped during capture.");
            }
        }
        SchemaType::KeyData => {
            if json_schema {
                println!("{}", get_key_data_json_schema());
            } else {
                println!("Key Logs: field identifier → ordered key events");
                println!();
                println!("- key: Logical key");
                println!("- keyDownTime / keyUpTime: Seconds since the field's capture start (6 dp)");
                println!("- keyDownTimestamp / keyUpTimestamp: Epoch milliseconds");
                println!("- durationInSeconds: Hold time (6 dp)");
                println!();
                println!("Release fields are null while the key is still held.");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Feature Table: one row per consecutive key pair");
                println!();
                println!("- keydownTime: Hold time of the first key (s, 3 dp)");
                println!("- UD: Release of first key → press of second");
                println!("- DD: Press of first key → press of second");
                println!("- DU: Press of first key → release of second");
                println!("- UU: Release of first key → release of second");
                println!("- iteration: 1-based pair index within the field");
                println!("- key1 / key2: Keys of the pair (\"null\" when missing)");
                println!();
                println!("Metrics are null when a required timestamp is missing.");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> io::Result<String> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read_to_string(input)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), KeyfluxCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn parse_signals(
    input_data: &str,
    input_format: &InputFormat,
) -> Result<Vec<KeySignal>, KeyfluxCliError> {
    let signals = match input_format {
        InputFormat::Ndjson => KeySignalAdapter::parse_ndjson(input_data)?,
        InputFormat::Json => KeySignalAdapter::parse_array(input_data)?,
    };
    Ok(signals)
}

fn format_output<T: Serialize>(
    rows: &[T],
    format: &OutputFormat,
) -> Result<String, KeyfluxCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for row in rows {
                out.push_str(&serde_json::to_string(row)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string(rows)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(rows)? + "\n"),
    }
}

fn print_scores(label: Option<&str>, scores: &ConsensusScores) {
    match label {
        Some(label) => println!("Consensus:    {}", label),
        None => println!("Consensus:    none (no predictions)"),
    }
    for entry in scores.iter() {
        println!("  {:>4}  {}", entry.score, entry.label);
    }
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "Keystroke signal: one key press or release on a named field",
        "type": "object",
        "required": ["key", "field", "event_type", "timestamp"],
        "properties": {
            "key": { "type": "string", "minLength": 1 },
            "field": { "type": "string", "minLength": 1 },
            "event_type": { "type": "string", "enum": ["down", "up"] },
            "timestamp": { "type": "integer", "exclusiveMinimum": 0 },
            "focused": { "type": "boolean", "default": true },
            "field_empty": { "type": "boolean", "default": false }
        }
    })
    .to_string()
}

fn get_key_data_json_schema() -> String {
    let nullable_number = serde_json::json!({ "type": ["number", "null"] });
    let nullable_integer = serde_json::json!({ "type": ["integer", "null"] });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "keystroke key logs",
        "description": "Field identifier mapped to its ordered key events",
        "type": "object",
        "additionalProperties": {
            "type": "array",
            "items": {
                "type": "object",
                "required": ["key"],
                "properties": {
                    "key": { "type": "string" },
                    "keyDownTime": nullable_number,
                    "keyUpTime": nullable_number,
                    "keyDownTimestamp": nullable_integer,
                    "keyUpTimestamp": nullable_integer,
                    "durationInSeconds": nullable_number
                }
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    let nullable_number = serde_json::json!({ "type": ["number", "null"] });
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "keystroke feature table",
        "description": "Digraph timing rows in field order",
        "type": "array",
        "items": {
            "type": "object",
            "required": ["keydownTime", "UD", "DD", "DU", "UU", "iteration", "key1", "key2"],
            "properties": {
                "keydownTime": nullable_number,
                "UD": nullable_number,
                "DD": nullable_number,
                "DU": nullable_number,
                "UU": nullable_number,
                "iteration": { "type": "integer", "minimum": 1 },
                "key1": { "type": "string" },
                "key2": { "type": ["string", "null"] }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum KeyfluxCliError {
    Io(io::Error),
    Keystroke(KeystrokeError),
    Json(serde_json::Error),
    NoSignals,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for KeyfluxCliError {
    fn from(e: io::Error) -> Self {
        KeyfluxCliError::Io(e)
    }
}

impl From<KeystrokeError> for KeyfluxCliError {
    fn from(e: KeystrokeError) -> Self {
        KeyfluxCliError::Keystroke(e)
    }
}

impl From<serde_json::Error> for KeyfluxCliError {
    fn from(e: serde_json::Error) -> Self {
        KeyfluxCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<KeyfluxCliError> for CliError {
    fn from(e: KeyfluxCliError) -> Self {
        match e {
            KeyfluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            KeyfluxCliError::Keystroke(e) => keystroke_error(e),
            KeyfluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            KeyfluxCliError::NoSignals => CliError {
                code: "NO_SIGNALS".to_string(),
                message: "No key signals found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            KeyfluxCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} signals failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            KeyfluxCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

fn keystroke_error(e: KeystrokeError) -> CliError {
    let (code, hint) = match &e {
        KeystrokeError::MissingEndpoint => (
            "MISSING_ENDPOINT",
            format!(
                "Pass --endpoint, set {} or configure prediction.endpoint",
                ENV_PREDICTION_URL
            ),
        ),
        KeystrokeError::Prediction(_) => (
            "PREDICTION_ERROR",
            "Check that the prediction service is reachable".to_string(),
        ),
        KeystrokeError::Config(_) => (
            "CONFIG_ERROR",
            "Check the TOML configuration file".to_string(),
        ),
        KeystrokeError::Io(_) => (
            "IO_ERROR",
            "Check file paths and permissions".to_string(),
        ),
        KeystrokeError::InvalidSignal(_) => (
            "VALIDATION_ERROR",
            "Run 'keyflux validate' for details".to_string(),
        ),
        KeystrokeError::ParseError(_) | KeystrokeError::JsonError(_) => (
            "PARSE_ERROR",
            "Run 'keyflux schema' to see the expected input".to_string(),
        ),
    };
    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint: Some(hint),
    }
}

// Report types

#[derive(Serialize)]
struct ScoreReport {
    samples: usize,
    label: Option<String>,
    scores: ConsensusScores,
}

#[derive(Serialize)]
struct ValidationReport {
    total_signals: usize,
    valid_signals: usize,
    invalid_signals: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    field: String,
    error: String,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: String) -> Self {
        Self::with_status(name, CheckStatus::Ok, message)
    }

    fn warning(name: &str, message: String) -> Self {
        Self::with_status(name, CheckStatus::Warning, message)
    }

    fn error(name: &str, message: String) -> Self {
        Self::with_status(name, CheckStatus::Error, message)
    }

    fn with_status(name: &str, status: CheckStatus, message: String) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
        }
    }
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
