//! Wall-clock sources
//!
//! Retention times and audit timestamps are whole unix seconds. The tracker reads
//! time through [`Clock`] so that replays and tests can drive it deterministically.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

/// Source of the current unix time in seconds
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

/// Clock backed by the system wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Manually advanced clock.
///
/// Clones share the same underlying time, so a handle kept by the caller can
/// advance the clock owned by a tracker.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_unix: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_unix)),
        }
    }

    /// Move the clock forward by `secs` seconds
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, unix: i64) {
        self.now.store(unix, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
