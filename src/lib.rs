//! Usability Tracker - On-device detection of low-discoverability navigation
//!
//! The tracker observes screen-to-screen navigation reported by the host app and
//! flags sessions where the user bounces quickly between the same few screens,
//! a sign they cannot find what they are looking for. On detection it asks the
//! host to show a two-step micro-survey and records everything in an
//! append-only audit log on the device.
//!
//! Flow: `enter_view` → finalize previous view → bounded history → detection
//! (low retention AND navigational loop) → survey → audit log.
//!
//! ## Modules
//!
//! - **Tracker**: process-wide facade called by the presentation layer
//! - **Detection**: the two heuristics over the history window
//! - **Audit**: durable per-launch log in the `<timestamp>,<payload>` format

pub mod audit;
pub mod clock;
pub mod config;
pub mod detection;
pub mod error;
pub mod event;
pub mod history;
pub mod survey;
pub mod tracker;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use audit::{read_log, AuditEntry, AuditLog, AuditRecord, ParsedLog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SurveySettings, TrackerConfig};
pub use detection::{Detection, DetectionEngine};
pub use error::TrackerError;
pub use event::{ActiveView, NavigationEvent};
pub use history::HistoryStore;
pub use survey::{
    NoopPresenter, RecordingPresenter, SurveyFlow, SurveyPresenter, SurveyPrompt, SurveyResponse,
    SurveyStep,
};
pub use tracker::{init_shared, shared, Navigation, UsabilityTracker};

/// Tracker version
pub const TRACKER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by tooling
pub const PRODUCER_NAME: &str = "usability-tracker";
