//! Tracker configuration
//!
//! Configuration is plain serde data so hosts can ship it as JSON. Every field has
//! a default matching the reference heuristics (6-event window, 6 second
//! threshold, 1–5 rating with a free-text follow-up from 3.5).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detection::DEFAULT_RETENTION_THRESHOLD_SECS;
use crate::error::TrackerError;
use crate::history::DEFAULT_HISTORY_CAPACITY;

/// File inside the log directory holding the generated device identifier
pub const DEVICE_ID_FILE: &str = "device_id";

/// Survey wording and rating bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveySettings {
    pub rating_min: f64,
    pub rating_max: f64,
    pub rating_default: f64,
    /// Ratings at or above this value lead to the free-text step
    pub freetext_threshold: f64,
    pub rating_question: String,
    pub freetext_question: String,
}

impl Default for SurveySettings {
    fn default() -> Self {
        Self {
            rating_min: 1.0,
            rating_max: 5.0,
            rating_default: 3.0,
            freetext_threshold: 3.5,
            rating_question: "How hard was it to find what you were looking for?".to_string(),
            freetext_question: "What are you looking for?".to_string(),
        }
    }
}

/// Full tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Number of navigation events kept in the history window
    pub history_capacity: usize,
    /// Visits shorter than this count as brief
    pub retention_threshold_secs: f64,
    /// Directory for audit logs (the app's private storage)
    pub log_dir: PathBuf,
    /// Stable device identifier; generated and persisted when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub survey: SurveySettings,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            retention_threshold_secs: DEFAULT_RETENTION_THRESHOLD_SECS,
            log_dir: PathBuf::from("usability-logs"),
            device_id: None,
            survey: SurveySettings::default(),
        }
    }
}

impl TrackerConfig {
    /// Default configuration writing logs under `log_dir`
    pub fn with_log_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, TrackerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check internal consistency of the configuration
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.history_capacity == 0 {
            return Err(TrackerError::InvalidConfig(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if !self.retention_threshold_secs.is_finite() || self.retention_threshold_secs < 0.0 {
            return Err(TrackerError::InvalidConfig(format!(
                "retention_threshold_secs must be a non-negative number, got {}",
                self.retention_threshold_secs
            )));
        }
        let s = &self.survey;
        if !(s.rating_min.is_finite() && s.rating_max.is_finite()) || s.rating_min > s.rating_max {
            return Err(TrackerError::InvalidConfig(format!(
                "invalid rating range {}..={}",
                s.rating_min, s.rating_max
            )));
        }
        if !(s.rating_min..=s.rating_max).contains(&s.rating_default) {
            return Err(TrackerError::InvalidConfig(format!(
                "rating_default {} is outside {}..={}",
                s.rating_default, s.rating_min, s.rating_max
            )));
        }
        if let Some(id) = &self.device_id {
            check_device_id(id)?;
        }
        Ok(())
    }

    /// The configured device id, or the one persisted in the log directory.
    ///
    /// A fresh UUID is generated and written on first use so later tracker
    /// lifetimes on the same device reuse it.
    pub fn resolve_device_id(&self) -> Result<String, TrackerError> {
        if let Some(id) = &self.device_id {
            return Ok(id.clone());
        }
        load_or_create_device_id(&self.log_dir)
    }
}

/// Device ids become part of the log file name
fn check_device_id(id: &str) -> Result<(), TrackerError> {
    if id.is_empty() || id.contains(['/', '\\']) {
        return Err(TrackerError::InvalidConfig(format!(
            "device_id {id:?} cannot be used in a file name"
        )));
    }
    Ok(())
}

fn load_or_create_device_id(dir: &Path) -> Result<String, TrackerError> {
    let path = dir.join(DEVICE_ID_FILE);
    if let Ok(existing) = fs::read_to_string(&path) {
        let existing = existing.trim();
        match check_device_id(existing) {
            Ok(()) => return Ok(existing.to_string()),
            Err(e) if !existing.is_empty() => {
                log::warn!("replacing stored device id in {}: {e}", path.display());
            }
            Err(_) => {}
        }
    }
    fs::create_dir_all(dir)?;
    let id = Uuid::new_v4().to_string();
    fs::write(&path, &id)?;
    log::debug!("generated device id {id}");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.history_capacity, 6);
        assert_eq!(config.retention_threshold_secs, 6.0);
        assert_eq!(config.survey.rating_default, 3.0);
        assert_eq!(config.survey.freetext_threshold, 3.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = TrackerConfig::from_json(r#"{"history_capacity": 4, "log_dir": "/tmp/x"}"#)
            .unwrap();
        assert_eq!(config.history_capacity, 4);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.survey, SurveySettings::default());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = TrackerConfig::with_log_dir("/data/logs");
        config.device_id = Some("abc".to_string());
        let loaded = TrackerConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TrackerConfig::default();
        config.history_capacity = 0;
        assert!(matches!(config.validate(), Err(TrackerError::InvalidConfig(_))));

        let mut config = TrackerConfig::default();
        config.survey.rating_default = 9.0;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.device_id = Some("../escape".to_string());
        assert!(config.validate().is_err());

        assert!(TrackerConfig::from_json(r#"{"retention_threshold_secs": -1.0}"#).is_err());
    }

    #[test]
    fn test_device_id_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::with_log_dir(dir.path());

        let first = config.resolve_device_id().unwrap();
        let second = config.resolve_device_id().unwrap();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn test_stored_device_id_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let stored = dir.path().join(DEVICE_ID_FILE);
        fs::write(&stored, "../../etc/x\n").unwrap();
        let config = TrackerConfig::with_log_dir(dir.path());

        let id = config.resolve_device_id().unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(fs::read_to_string(&stored).unwrap(), id);
        assert_eq!(config.resolve_device_id().unwrap(), id);
    }

    #[test]
    fn test_explicit_device_id_wins() {
        let mut config = TrackerConfig::with_log_dir("/nonexistent");
        config.device_id = Some("phone-7".to_string());
        assert_eq!(config.resolve_device_id().unwrap(), "phone-7");
    }
}
