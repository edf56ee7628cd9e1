//! Append-only audit log
//!
//! One plain-text file per tracker lifetime, one event per line:
//!
//! ```text
//! <unix_timestamp>,<payload>\n
//! ```
//!
//! The payload is a raw screen id, `_ACTIVATE_`, `_DEACTIVATE_`,
//! `_QUESTIONNAIRE1_,<rating>,<history>` or `_QUESTIONNAIRE2_,'<text>'`.
//! Every line is synced to disk before [`AuditLog::append`] returns.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

pub const ACTIVATE_MARKER: &str = "_ACTIVATE_";
pub const DEACTIVATE_MARKER: &str = "_DEACTIVATE_";
pub const QUESTIONNAIRE1_MARKER: &str = "_QUESTIONNAIRE1_";
pub const QUESTIONNAIRE2_MARKER: &str = "_QUESTIONNAIRE2_";

/// Payload of a single audit line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    /// The user entered a screen
    Screen { screen_id: String },
    /// Host app came to the foreground
    Activate,
    /// Host app went to the background
    Deactivate,
    /// Rating step answer with the history window it refers to
    Rating { rating: f64, history: String },
    /// Free-text step answer
    FreeText { text: String },
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEntry::Screen { screen_id } => f.write_str(screen_id),
            AuditEntry::Activate => f.write_str(ACTIVATE_MARKER),
            AuditEntry::Deactivate => f.write_str(DEACTIVATE_MARKER),
            AuditEntry::Rating { rating, history } => {
                write!(f, "{QUESTIONNAIRE1_MARKER},{rating:.2},{history}")
            }
            AuditEntry::FreeText { text } => write!(f, "{QUESTIONNAIRE2_MARKER},'{text}'"),
        }
    }
}

impl AuditEntry {
    /// Parse a payload (the part of a line after the timestamp)
    pub fn parse(payload: &str) -> Result<Self, TrackerError> {
        if payload == ACTIVATE_MARKER {
            return Ok(AuditEntry::Activate);
        }
        if payload == DEACTIVATE_MARKER {
            return Ok(AuditEntry::Deactivate);
        }
        if let Some(rest) = strip_marker(payload, QUESTIONNAIRE1_MARKER) {
            let (rating, history) = rest.split_once(',').unwrap_or((rest, ""));
            let rating = rating
                .parse::<f64>()
                .map_err(|_| TrackerError::MalformedLogLine(payload.to_string()))?;
            return Ok(AuditEntry::Rating {
                rating,
                history: history.to_string(),
            });
        }
        if let Some(rest) = strip_marker(payload, QUESTIONNAIRE2_MARKER) {
            let text = rest
                .strip_prefix('\'')
                .and_then(|r| r.strip_suffix('\''))
                .ok_or_else(|| TrackerError::MalformedLogLine(payload.to_string()))?;
            return Ok(AuditEntry::FreeText {
                text: text.to_string(),
            });
        }
        Ok(AuditEntry::Screen {
            screen_id: payload.to_string(),
        })
    }
}

fn strip_marker<'a>(payload: &'a str, marker: &str) -> Option<&'a str> {
    payload.strip_prefix(marker)?.strip_prefix(',')
}

/// A parsed audit line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: i64,
    #[serde(flatten)]
    pub entry: AuditEntry,
}

impl AuditRecord {
    /// Render as a line without the trailing newline
    pub fn to_line(&self) -> String {
        format!("{},{}", self.timestamp, self.entry)
    }

    pub fn parse_line(line: &str) -> Result<Self, TrackerError> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let (timestamp, payload) = line
            .split_once(',')
            .ok_or_else(|| TrackerError::MalformedLogLine(line.to_string()))?;
        let timestamp = timestamp
            .parse::<i64>()
            .map_err(|_| TrackerError::MalformedLogLine(line.to_string()))?;
        Ok(Self {
            timestamp,
            entry: AuditEntry::parse(payload)?,
        })
    }
}

/// Contents of an audit log file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedLog {
    pub records: Vec<AuditRecord>,
    /// 1-based numbers of lines that could not be parsed
    pub malformed_lines: Vec<usize>,
}

/// Parse every non-empty line of an audit log file.
///
/// Unparseable lines are skipped and reported in
/// [`ParsedLog::malformed_lines`]; only I/O errors fail the whole read.
pub fn read_log(path: &Path) -> Result<ParsedLog, TrackerError> {
    let reader = BufReader::new(File::open(path)?);
    let mut parsed = ParsedLog::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match AuditRecord::parse_line(&line) {
            Ok(record) => parsed.records.push(record),
            Err(e) => {
                log::warn!("skipping line {} of {}: {e}", idx + 1, path.display());
                parsed.malformed_lines.push(idx + 1);
            }
        }
    }
    Ok(parsed)
}

/// File name for a tracker lifetime started at `created_at`
pub fn log_file_name(device_id: &str, created_at: i64) -> String {
    format!("{device_id}_{created_at}.log")
}

/// Durable, append-only audit sink
#[derive(Debug)]
pub struct AuditLog {
    file: File,
    path: PathBuf,
}

impl AuditLog {
    /// Create (or reopen for append) the log file for this tracker lifetime
    pub fn create(dir: &Path, device_id: &str, created_at: i64) -> Result<Self, TrackerError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(log_file_name(device_id, created_at));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::debug!("audit log opened at {}", path.display());
        Ok(Self { file, path })
    }

    /// Append one line and sync it to disk before returning
    pub fn append(&mut self, timestamp: i64, entry: &AuditEntry) -> Result<(), TrackerError> {
        let line = format!("{timestamp},{entry}\n");
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
