//! Low-discoverability detection
//!
//! Two independent heuristics are evaluated over the same history snapshot:
//!
//! - **Low retention**: the window is full and every visit in it was shorter than
//!   the retention threshold.
//! - **Navigational loop**: at least one screen appears twice in the window.
//!
//! A discoverability issue is declared only when both hold.

use crate::event::NavigationEvent;
use crate::history::HistoryStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default retention threshold in seconds
pub const DEFAULT_RETENTION_THRESHOLD_SECS: f64 = 6.0;

/// Outcome of evaluating both heuristics on one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub low_retention: bool,
    pub has_loop: bool,
}

impl Detection {
    /// Whether a discoverability issue should be reported
    pub fn is_triggered(&self) -> bool {
        self.low_retention && self.has_loop
    }
}

/// Detector parameterized by the retention threshold.
///
/// The window size is always the capacity of the history being evaluated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionEngine {
    retention_threshold_secs: f64,
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_THRESHOLD_SECS)
    }
}

impl DetectionEngine {
    pub fn new(retention_threshold_secs: f64) -> Self {
        Self {
            retention_threshold_secs,
        }
    }

    /// Evaluate both heuristics against the current contents of `history`
    pub fn evaluate(&self, history: &HistoryStore) -> Detection {
        let snapshot: Vec<&NavigationEvent> = history.items().collect();
        Detection {
            low_retention: history.is_full() && self.all_brief(&snapshot),
            has_loop: has_loop(&snapshot),
        }
    }

    /// Low-retention heuristic
    ///
    /// With `S` events in the window and `B` of them below the threshold, true iff
    /// the window is at capacity and `B == S`. One long visit resets the signal.
    pub fn low_retention(&self, history: &HistoryStore) -> bool {
        let snapshot: Vec<&NavigationEvent> = history.items().collect();
        history.is_full() && self.all_brief(&snapshot)
    }

    pub fn retention_threshold_secs(&self) -> f64 {
        self.retention_threshold_secs
    }

    /// Non-empty and every visit shorter than the threshold
    fn all_brief(&self, events: &[&NavigationEvent]) -> bool {
        !events.is_empty()
            && events
                .iter()
                .all(|e| (e.retention_secs as f64) < self.retention_threshold_secs)
    }
}

/// Navigational-loop heuristic
///
/// True iff two distinct positions in the window carry the same screen id.
/// Comparison is exact and case-sensitive.
pub fn has_loop(events: &[&NavigationEvent]) -> bool {
    let mut seen = HashSet::with_capacity(events.len());
    events.iter().any(|e| !seen.insert(e.screen_id.as_str()))
}
