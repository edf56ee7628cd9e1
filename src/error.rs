//! Error types for the usability tracker

use thiserror::Error;

use crate::survey::SurveyStep;

/// Errors that can occur while tracking navigation or driving a survey
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Rating {value} is outside the allowed range {min}..={max}")]
    InvalidRating { value: f64, min: f64, max: f64 },

    #[error("Response does not match the current survey step ({0:?})")]
    UnexpectedResponse(SurveyStep),

    #[error("Free text must fit on one line")]
    InvalidFreeText,

    #[error("No survey is awaiting a response")]
    NoSurveyPending,

    #[error("Malformed audit log line: {0}")]
    MalformedLogLine(String),
}
