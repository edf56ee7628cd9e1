//! Navigation event model
//!
//! A screen visit starts as an [`ActiveView`] when the user arrives and only
//! becomes a [`NavigationEvent`] when the user leaves it for another screen.

use serde::{Deserialize, Serialize};

/// A finalized visit to a screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEvent {
    /// Identifier of the screen that was left
    pub screen_id: String,
    /// Whole seconds spent on the screen before leaving it
    pub retention_secs: u64,
}

impl NavigationEvent {
    pub fn new(screen_id: impl Into<String>, retention_secs: u64) -> Self {
        Self {
            screen_id: screen_id.into(),
            retention_secs,
        }
    }

    /// Render as `<retention>:<screen_id>` for questionnaire history
    pub fn to_history_token(&self) -> String {
        format!("{}:{}", self.retention_secs, self.screen_id)
    }
}

/// The screen currently shown, not yet finalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveView {
    pub screen_id: String,
    /// Unix seconds at which the screen was entered
    pub entered_at: i64,
}

impl ActiveView {
    pub fn new(screen_id: impl Into<String>, entered_at: i64) -> Self {
        Self {
            screen_id: screen_id.into(),
            entered_at,
        }
    }

    /// Close the visit at `now`, assigning its retention time.
    ///
    /// A clock that went backwards yields zero retention.
    pub fn finalize(self, now: i64) -> NavigationEvent {
        let retention_secs = now.saturating_sub(self.entered_at).max(0) as u64;
        NavigationEvent {
            screen_id: self.screen_id,
            retention_secs,
        }
    }
}
