//! Usability CLI - Command-line tooling for the usability tracker
//!
//! Commands:
//! - replay: Run a scripted navigation session through a real tracker
//! - inspect: Summarize an audit log
//! - config: Print the default configuration

use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use usability_tracker::{
    read_log, AuditEntry, ManualClock, Navigation, RecordingPresenter, SurveyResponse,
    SurveyStep, TrackerConfig, TrackerError, UsabilityTracker, PRODUCER_NAME, TRACKER_VERSION,
};

/// Usability - Detect low-discoverability navigation and inspect audit logs
#[derive(Parser)]
#[command(name = "usability")]
#[command(author = "Synheart AI Inc")]
#[command(version = TRACKER_VERSION)]
#[command(about = "Replay navigation sessions and inspect usability audit logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a navigation script through the tracker, writing a real audit log
    Replay {
        /// Script file path (use - for stdin)
        #[arg(short, long)]
        script: PathBuf,

        /// Directory for the audit log
        #[arg(long, default_value = "usability-logs")]
        log_dir: PathBuf,

        /// Device ID used in the log file name
        #[arg(long, default_value = "replay")]
        device_id: String,

        /// Unix time the script offsets are relative to
        #[arg(long, default_value = "0")]
        start: i64,

        /// Tracker configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Summarize an audit log
    Inspect {
        /// Audit log path
        #[arg(short, long)]
        input: PathBuf,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default tracker configuration as JSON
    Config,
}

fn main() -> ExitCode {
    env_logger::init();
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

fn run(cli: Cli) -> Result<(), UsabilityCliError> {
    match cli.command {
        Commands::Replay {
            script,
            log_dir,
            device_id,
            start,
            config,
        } => cmd_replay(&script, log_dir, device_id, start, config.as_deref()),
        Commands::Inspect { input, json } => cmd_inspect(&input, json),
        Commands::Config => {
            println!("{}", TrackerConfig::default().to_json()?);
            Ok(())
        }
    }
}

// Replay

/// One parsed script line: `<offset_secs> <action> [argument]`
#[derive(Debug, PartialEq)]
enum ScriptAction {
    View(String),
    Activate,
    Deactivate,
    Rating(f64),
    Text(String),
}

#[derive(Debug)]
struct ScriptLine {
    line_no: usize,
    offset: i64,
    action: ScriptAction,
}

fn parse_script(input: &str) -> Result<Vec<ScriptLine>, UsabilityCliError> {
    let mut lines = Vec::new();
    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bad = |msg: &str| UsabilityCliError::Script(format!("line {line_no}: {msg}"));

        let (offset, rest) = line.split_once(char::is_whitespace).ok_or_else(|| bad("missing action"))?;
        let offset = offset.parse::<i64>().map_err(|_| bad("offset must be an integer"))?;
        let rest = rest.trim_start();
        let (verb, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let arg = arg.trim_start();

        let action = match verb {
            "view" if !arg.is_empty() => ScriptAction::View(arg.to_string()),
            "view" => return Err(bad("view needs a screen id")),
            "activate" => ScriptAction::Activate,
            "deactivate" => ScriptAction::Deactivate,
            "rating" => ScriptAction::Rating(
                arg.parse::<f64>().map_err(|_| bad("rating must be a number"))?,
            ),
            "text" => ScriptAction::Text(arg.to_string()),
            other => return Err(bad(&format!("unknown action '{other}'"))),
        };
        lines.push(ScriptLine {
            line_no,
            offset,
            action,
        });
    }
    Ok(lines)
}

fn cmd_replay(
    script: &Path,
    log_dir: PathBuf,
    device_id: String,
    start: i64,
    config_path: Option<&Path>,
) -> Result<(), UsabilityCliError> {
    let script_data = read_input(script)?;
    let steps = parse_script(&script_data)?;

    let mut config = match config_path {
        Some(path) => TrackerConfig::from_json(&fs::read_to_string(path)?)?,
        None => TrackerConfig::default(),
    };
    config.log_dir = log_dir;
    config.device_id = Some(device_id);

    let clock = ManualClock::new(start);
    let tracker = UsabilityTracker::new(
        config,
        Box::new(clock.clone()),
        Box::new(RecordingPresenter::new()),
    )?;

    let mut report = ReplayReport {
        log_path: tracker.log_path().map(|p| p.display().to_string()),
        steps: Vec::new(),
        surveys_started: 0,
    };

    for step in steps {
        clock.set(start + step.offset);
        let (navigation, survey_step) = match step.action {
            ScriptAction::View(screen) => (Some(tracker.enter_view(&screen)), None),
            ScriptAction::Activate => {
                tracker.app_activate();
                (None, None)
            }
            ScriptAction::Deactivate => {
                tracker.app_deactivate();
                (None, None)
            }
            ScriptAction::Rating(value) => (
                None,
                Some(tracker.submit_survey(SurveyResponse::Rating { value })?),
            ),
            ScriptAction::Text(text) => (
                None,
                Some(tracker.submit_survey(SurveyResponse::FreeText { text })?),
            ),
        };
        if navigation.as_ref().is_some_and(|n| n.survey_started) {
            report.surveys_started += 1;
        }
        report.steps.push(ReplayStep {
            line: step.line_no,
            at: start + step.offset,
            navigation,
            survey_step,
        });
    }

    println!("{}", to_json(&report)?);
    Ok(())
}

// Inspect

fn cmd_inspect(input: &Path, json: bool) -> Result<(), UsabilityCliError> {
    let parsed = read_log(input)?;

    let mut report = InspectReport {
        lines: parsed.records.len(),
        malformed_lines: parsed.malformed_lines,
        ..InspectReport::default()
    };
    let mut screens = BTreeSet::new();
    for record in parsed.records {
        match record.entry {
            AuditEntry::Screen { screen_id } => {
                report.screen_visits += 1;
                screens.insert(screen_id);
            }
            AuditEntry::Activate => report.activations += 1,
            AuditEntry::Deactivate => report.deactivations += 1,
            AuditEntry::Rating { rating, history } => report.ratings.push(RatingSummary {
                timestamp: record.timestamp,
                rating,
                history,
            }),
            AuditEntry::FreeText { text } => report.free_text.push(text),
        }
    }
    report.distinct_screens = screens.into_iter().collect();

    if json {
        println!("{}", to_json(&report)?);
    } else {
        println!("Usability Log Summary");
        println!("=====================");
        println!("Producer: {} {}", PRODUCER_NAME, TRACKER_VERSION);
        println!("Lines:         {}", report.lines);
        if !report.malformed_lines.is_empty() {
            println!("Skipped:       {:?}", report.malformed_lines);
        }
        println!("Screen visits: {}", report.screen_visits);
        println!("Screens:       {}", report.distinct_screens.join(", "));
        println!(
            "Lifecycle:     {} activate / {} deactivate",
            report.activations, report.deactivations
        );
        println!("\nSurveys:");
        for rating in &report.ratings {
            println!("  [{}] rating {:.2}: {}", rating.timestamp, rating.rating, rating.history);
        }
        for text in &report.free_text {
            println!("  looking for: '{}'", text);
        }
    }
    Ok(())
}

// Helpers

fn read_input(path: &Path) -> Result<String, UsabilityCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// Pretty JSON for terminals, compact JSON for pipes
fn to_json<T: serde::Serialize>(value: &T) -> Result<String, UsabilityCliError> {
    let json = if atty::is(atty::Stream::Stdout) {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

// Error types

#[derive(Debug)]
enum UsabilityCliError {
    Io(io::Error),
    Tracker(TrackerError),
    Json(serde_json::Error),
    Script(String),
}

impl From<io::Error> for UsabilityCliError {
    fn from(e: io::Error) -> Self {
        UsabilityCliError::Io(e)
    }
}

impl From<TrackerError> for UsabilityCliError {
    fn from(e: TrackerError) -> Self {
        UsabilityCliError::Tracker(e)
    }
}

impl From<serde_json::Error> for UsabilityCliError {
    fn from(e: serde_json::Error) -> Self {
        UsabilityCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<UsabilityCliError> for CliError {
    fn from(e: UsabilityCliError) -> Self {
        match e {
            UsabilityCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            UsabilityCliError::Tracker(e) => CliError {
                code: "TRACKER_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the configuration and the survey answers in the script".to_string()),
            },
            UsabilityCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            UsabilityCliError::Script(msg) => CliError {
                code: "SCRIPT_ERROR".to_string(),
                message: msg,
                hint: Some("Lines look like '<offset> view <screen>', '<offset> rating 4'".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ReplayReport {
    log_path: Option<String>,
    surveys_started: usize,
    steps: Vec<ReplayStep>,
}

#[derive(serde::Serialize)]
struct ReplayStep {
    line: usize,
    at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    navigation: Option<Navigation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    survey_step: Option<SurveyStep>,
}

#[derive(serde::Serialize, Default)]
struct InspectReport {
    lines: usize,
    malformed_lines: Vec<usize>,
    screen_visits: usize,
    distinct_screens: Vec<String>,
    activations: usize,
    deactivations: usize,
    ratings: Vec<RatingSummary>,
    free_text: Vec<String>,
}

#[derive(serde::Serialize)]
struct RatingSummary {
    timestamp: i64,
    rating: f64,
    history: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let script = "# warmup\n0 activate\n1 view Home\n\n4 rating 4.5\n5 text where is export\n";
        let lines = parse_script(script).unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1].action, ScriptAction::View("Home".to_string()));
        assert_eq!(lines[1].line_no, 3);
        assert_eq!(lines[2].action, ScriptAction::Rating(4.5));
        assert_eq!(
            lines[3].action,
            ScriptAction::Text("where is export".to_string())
        );
    }

    #[test]
    fn test_parse_script_errors() {
        assert!(parse_script("x view Home").is_err());
        assert!(parse_script("1 view").is_err());
        assert!(parse_script("1 jump Home").is_err());
        assert!(parse_script("1 rating high").is_err());
    }
}
