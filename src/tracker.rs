//! Tracker facade
//!
//! [`UsabilityTracker`] is the entry point for the host's presentation layer. It
//! owns the navigation history, the in-flight view, the pending survey and the
//! audit log behind a single lock, so every call is applied atomically and log
//! lines land in call order.
//!
//! Hosts that want one tracker per process use [`init_shared`] once at startup
//! and [`shared`] afterwards.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use serde::Serialize;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLog};
use crate::clock::{Clock, SystemClock};
use crate::config::{SurveySettings, TrackerConfig};
use crate::detection::{Detection, DetectionEngine};
use crate::error::TrackerError;
use crate::event::{ActiveView, NavigationEvent};
use crate::history::HistoryStore;
use crate::survey::{
    NoopPresenter, SurveyFlow, SurveyPresenter, SurveyPrompt, SurveyResponse, SurveyStep,
};

/// Result of a single [`UsabilityTracker::enter_view`] call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Navigation {
    /// Event finalized for the screen that was left, if there was one
    pub finalized: Option<NavigationEvent>,
    /// Heuristics evaluated after the push
    pub detection: Detection,
    /// Whether this call started a new survey
    pub survey_started: bool,
}

struct TrackerState {
    history: HistoryStore,
    active_view: Option<ActiveView>,
    survey: Option<SurveyFlow>,
    audit: Option<AuditLog>,
}

/// Navigation tracker detecting low-discoverability patterns
pub struct UsabilityTracker {
    state: Mutex<TrackerState>,
    detector: DetectionEngine,
    survey_settings: SurveySettings,
    clock: Box<dyn Clock>,
    presenter: Box<dyn SurveyPresenter>,
    device_id: String,
    created_at: i64,
    log_path: Option<PathBuf>,
    audit_failures: AtomicU64,
}

impl UsabilityTracker {
    /// Tracker using the system clock and no survey presenter
    pub fn open(config: TrackerConfig) -> Result<Self, TrackerError> {
        Self::new(config, Box::new(SystemClock), Box::new(NoopPresenter))
    }

    /// Create a tracker and its audit log file.
    ///
    /// Only an invalid configuration is an error. If the device id or the log
    /// file cannot be set up the tracker still runs, without an audit log.
    pub fn new(
        config: TrackerConfig,
        clock: Box<dyn Clock>,
        presenter: Box<dyn SurveyPresenter>,
    ) -> Result<Self, TrackerError> {
        config.validate()?;

        let created_at = clock.now_unix();
        let mut failures = 0;

        let device_id = config.resolve_device_id().unwrap_or_else(|e| {
            log::warn!("could not resolve device id, using an ephemeral one: {e}");
            failures += 1;
            Uuid::new_v4().to_string()
        });

        let audit = match AuditLog::create(&config.log_dir, &device_id, created_at) {
            Ok(audit) => Some(audit),
            Err(e) => {
                log::warn!(
                    "audit log unavailable in {}: {e}",
                    config.log_dir.display()
                );
                failures += 1;
                None
            }
        };
        let log_path = audit.as_ref().map(|a| a.path().to_path_buf());

        Ok(Self {
            state: Mutex::new(TrackerState {
                history: HistoryStore::new(config.history_capacity),
                active_view: None,
                survey: None,
                audit,
            }),
            detector: DetectionEngine::new(config.retention_threshold_secs),
            survey_settings: config.survey,
            clock,
            presenter,
            device_id,
            created_at,
            log_path,
            audit_failures: AtomicU64::new(failures),
        })
    }

    /// Record that the user arrived at `screen_id`.
    ///
    /// Finalizes the previous view into the history, logs the new screen, and
    /// evaluates the heuristics. When both fire and no survey is already
    /// waiting for an answer, a survey is started and its first prompt handed to
    /// the presenter.
    pub fn enter_view(&self, screen_id: &str) -> Navigation {
        let (navigation, prompt) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            // Read under the lock so log timestamps follow line order.
            let now = self.clock.now_unix();

            let finalized = state.active_view.take().map(|view| view.finalize(now));
            if let Some(event) = &finalized {
                state.history.push(event.clone());
            }

            self.write_audit(
                &mut state.audit,
                now,
                &AuditEntry::Screen {
                    screen_id: screen_id.to_string(),
                },
            );
            state.active_view = Some(ActiveView::new(screen_id, now));

            let detection = self.detector.evaluate(&state.history);
            let mut prompt = None;
            if detection.is_triggered() {
                if state.survey.is_some() {
                    log::debug!("discoverability issue at {screen_id}; survey already pending");
                } else {
                    log::info!("discoverability issue detected at {screen_id}");
                    let flow = SurveyFlow::new(self.survey_settings.clone());
                    prompt = flow.prompt();
                    state.survey = Some(flow);
                }
            }

            let navigation = Navigation {
                finalized,
                detection,
                survey_started: prompt.is_some(),
            };
            (navigation, prompt)
        };

        // Presented outside the lock so the host may answer from the callback.
        if let Some(prompt) = prompt {
            self.presenter.present(&prompt);
        }
        navigation
    }

    /// Host app came to the foreground
    pub fn app_activate(&self) {
        self.log_marker(AuditEntry::Activate);
    }

    /// Host app went to the background
    pub fn app_deactivate(&self) {
        self.log_marker(AuditEntry::Deactivate);
    }

    /// Deliver the user's answer to the pending survey.
    ///
    /// A rating logs the current history window and clears it. Returns the step
    /// the survey moved to; a follow-up prompt is handed to the presenter.
    pub fn submit_survey(&self, response: SurveyResponse) -> Result<SurveyStep, TrackerError> {
        let (next, prompt) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let now = self.clock.now_unix();

            let flow = state.survey.as_mut().ok_or(TrackerError::NoSurveyPending)?;
            let next = flow.apply(&response)?;
            let prompt = flow.prompt();

            let entry = match response {
                SurveyResponse::Rating { value } => {
                    let history = state.history.serialize();
                    state.history.clear();
                    AuditEntry::Rating {
                        rating: value,
                        history,
                    }
                }
                SurveyResponse::FreeText { text } => AuditEntry::FreeText { text },
            };
            self.write_audit(&mut state.audit, now, &entry);

            if next == SurveyStep::Done {
                state.survey = None;
            }
            (next, prompt)
        };

        if let Some(prompt) = prompt {
            self.presenter.present(&prompt);
        }
        Ok(next)
    }

    /// Current history window, newest first
    pub fn history(&self) -> Vec<NavigationEvent> {
        self.lock().history.snapshot()
    }

    /// Screen the user is on, if any
    pub fn active_view(&self) -> Option<ActiveView> {
        self.lock().active_view.clone()
    }

    /// Step of the survey awaiting an answer, if any
    pub fn pending_survey(&self) -> Option<SurveyStep> {
        self.lock().survey.as_ref().map(SurveyFlow::step)
    }

    /// Prompt of the survey awaiting an answer, for hosts that re-render it
    pub fn pending_prompt(&self) -> Option<SurveyPrompt> {
        self.lock().survey.as_ref().and_then(SurveyFlow::prompt)
    }

    /// Abandon a pending survey without logging an answer
    pub fn dismiss_survey(&self) -> bool {
        self.lock().survey.take().is_some()
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Unix time at which this tracker was created
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Number of audit writes (or setup steps) that failed so far
    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    fn log_marker(&self, entry: AuditEntry) {
        let mut guard = self.lock();
        let now = self.clock.now_unix();
        self.write_audit(&mut guard.audit, now, &entry);
    }

    /// Best-effort audit write; failures are counted and never propagated
    fn write_audit(&self, audit: &mut Option<AuditLog>, timestamp: i64, entry: &AuditEntry) {
        let Some(sink) = audit.as_mut() else {
            self.audit_failures.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if let Err(e) = sink.append(timestamp, entry) {
            log::warn!("failed to write audit entry to {}: {e}", sink.path().display());
            self.audit_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static SHARED: OnceLock<UsabilityTracker> = OnceLock::new();
static SHARED_INIT: Mutex<()> = Mutex::new(());

/// Initialize the process-wide tracker.
///
/// The first successful call constructs the tracker; later calls (including
/// concurrent ones) return the same instance and ignore their arguments.
pub fn init_shared(
    config: TrackerConfig,
    presenter: Box<dyn SurveyPresenter>,
) -> Result<&'static UsabilityTracker, TrackerError> {
    if let Some(tracker) = SHARED.get() {
        return Ok(tracker);
    }
    let _guard = SHARED_INIT.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(tracker) = SHARED.get() {
        return Ok(tracker);
    }
    let tracker = UsabilityTracker::new(config, Box::new(SystemClock), presenter)?;
    Ok(SHARED.get_or_init(|| tracker))
}

/// The process-wide tracker, once [`init_shared`] has succeeded
pub fn shared() -> Option<&'static UsabilityTracker> {
    SHARED.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::survey::RecordingPresenter;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::atomic::AtomicI64;
    use std::sync::Arc;
    use std::thread;

    /// Clock that ticks forward on every read
    struct TickingClock(AtomicI64);

    impl Clock for TickingClock {
        fn now_unix(&self) -> i64 {
            self.0.fetch_add(1, Ordering::SeqCst)
        }
    }

    struct Fixture {
        tracker: UsabilityTracker,
        clock: ManualClock,
        presenter: Arc<RecordingPresenter>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TrackerConfig::with_log_dir(dir.path());
        config.device_id = Some("test-device".to_string());
        let clock = ManualClock::new(1_000);
        let presenter = Arc::new(RecordingPresenter::new());
        let tracker = UsabilityTracker::new(
            config,
            Box::new(clock.clone()),
            Box::new(Arc::clone(&presenter)),
        )
        .unwrap();
        Fixture {
            tracker,
            clock,
            presenter,
            _dir: dir,
        }
    }

    fn visit(f: &Fixture, screen: &str, dwell: i64) -> Navigation {
        let nav = f.tracker.enter_view(screen);
        f.clock.advance(dwell);
        nav
    }

    fn log_lines(f: &Fixture) -> Vec<String> {
        fs::read_to_string(f.tracker.log_path().unwrap())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_first_view_pushes_nothing() {
        let f = fixture();
        let nav = f.tracker.enter_view("X");
        assert_eq!(nav.finalized, None);
        assert!(f.tracker.history().is_empty());
        assert_eq!(f.tracker.active_view(), Some(ActiveView::new("X", 1_000)));
    }

    #[test]
    fn test_transition_finalizes_previous_view() {
        let f = fixture();
        visit(&f, "X", 3);
        let nav = f.tracker.enter_view("Y");

        assert_eq!(nav.finalized, Some(NavigationEvent::new("X", 3)));
        assert_eq!(f.tracker.history(), vec![NavigationEvent::new("X", 3)]);
        assert_eq!(log_lines(&f), vec!["1000,X", "1003,Y"]);
    }

    #[test]
    fn test_loop_with_brief_visits_triggers_survey() {
        let f = fixture();
        for screen in ["A", "B", "A", "B", "A", "B"] {
            let nav = visit(&f, screen, 2);
            assert!(!nav.survey_started);
        }
        let nav = f.tracker.enter_view("C");

        assert!(nav.detection.is_triggered());
        assert!(nav.survey_started);
        assert_eq!(f.tracker.pending_survey(), Some(SurveyStep::Rating));
        assert!(matches!(
            f.presenter.prompts().as_slice(),
            [SurveyPrompt::Rating { .. }]
        ));
    }

    #[test]
    fn test_unique_brief_visits_do_not_trigger() {
        let f = fixture();
        for screen in ["A", "B", "C", "D", "E", "F", "G"] {
            let nav = visit(&f, screen, 1);
            assert!(!nav.survey_started);
        }
        assert!(f.presenter.prompts().is_empty());
        assert_eq!(f.tracker.pending_survey(), None);
    }

    #[test]
    fn test_retrigger_suppressed_while_pending() {
        let f = fixture();
        for screen in ["A", "B", "A", "B", "A", "B", "A"] {
            visit(&f, screen, 1);
        }
        assert_eq!(f.presenter.prompts().len(), 1);

        let nav = f.tracker.enter_view("B");
        assert!(nav.detection.is_triggered());
        assert!(!nav.survey_started);
        assert_eq!(f.presenter.prompts().len(), 1);
    }

    #[test]
    fn test_low_rating_clears_history_and_ends() {
        let f = fixture();
        for screen in ["A", "B", "A", "B", "A", "B"] {
            visit(&f, screen, 2);
        }
        f.tracker.enter_view("C");

        let next = f
            .tracker
            .submit_survey(SurveyResponse::Rating { value: 2.0 })
            .unwrap();
        assert_eq!(next, SurveyStep::Done);
        assert!(f.tracker.history().is_empty());
        assert_eq!(f.tracker.pending_survey(), None);

        let last = log_lines(&f).pop().unwrap();
        assert_eq!(last, "1012,_QUESTIONNAIRE1_,2.00,2:B,2:A,2:B,2:A,2:B,2:A");
    }

    #[test]
    fn test_high_rating_then_free_text() {
        let f = fixture();
        for screen in ["A", "B", "A", "B", "A", "B"] {
            visit(&f, screen, 1);
        }
        f.tracker.enter_view("C");

        let next = f
            .tracker
            .submit_survey(SurveyResponse::Rating { value: 4.0 })
            .unwrap();
        assert_eq!(next, SurveyStep::FreeText);
        assert_eq!(f.tracker.pending_survey(), Some(SurveyStep::FreeText));
        assert!(matches!(
            f.presenter.prompts().last(),
            Some(SurveyPrompt::FreeText { .. })
        ));

        f.tracker
            .submit_survey(SurveyResponse::FreeText {
                text: "sharing".to_string(),
            })
            .unwrap();
        assert_eq!(f.tracker.pending_survey(), None);
        assert_eq!(log_lines(&f).last().unwrap(), "1006,_QUESTIONNAIRE2_,'sharing'");
    }

    #[test]
    fn test_submit_without_survey_fails() {
        let f = fixture();
        let err = f
            .tracker
            .submit_survey(SurveyResponse::Rating { value: 3.0 })
            .unwrap_err();
        assert!(matches!(err, TrackerError::NoSurveyPending));
    }

    #[test]
    fn test_invalid_rating_keeps_history() {
        let f = fixture();
        for screen in ["A", "B", "A", "B", "A", "B"] {
            visit(&f, screen, 1);
        }
        f.tracker.enter_view("C");

        assert!(f
            .tracker
            .submit_survey(SurveyResponse::Rating { value: 0.0 })
            .is_err());
        assert_eq!(f.tracker.history().len(), 6);
        assert_eq!(f.tracker.pending_survey(), Some(SurveyStep::Rating));
    }

    #[test]
    fn test_multiline_free_text_not_logged() {
        let f = fixture();
        for screen in ["A", "B", "A", "B", "A", "B"] {
            visit(&f, screen, 1);
        }
        f.tracker.enter_view("C");
        f.tracker
            .submit_survey(SurveyResponse::Rating { value: 5.0 })
            .unwrap();
        let before = log_lines(&f);

        let err = f
            .tracker
            .submit_survey(SurveyResponse::FreeText {
                text: "dark\nmode".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidFreeText));
        assert_eq!(log_lines(&f), before);
        assert_eq!(f.tracker.pending_survey(), Some(SurveyStep::FreeText));
    }

    #[test]
    fn test_concurrent_timestamps_follow_line_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TrackerConfig::with_log_dir(dir.path());
        config.device_id = Some("d".to_string());
        let tracker = UsabilityTracker::new(
            config,
            Box::new(TickingClock(AtomicI64::new(0))),
            Box::new(NoopPresenter),
        )
        .unwrap();

        thread::scope(|s| {
            for t in 0..4 {
                let tracker = &tracker;
                s.spawn(move || {
                    for i in 0..50 {
                        match i % 3 {
                            0 => tracker.app_activate(),
                            1 => tracker.app_deactivate(),
                            _ => {
                                tracker.enter_view(&format!("S{t}"));
                            }
                        }
                    }
                });
            }
        });

        let contents = fs::read_to_string(tracker.log_path().unwrap()).unwrap();
        let stamps: Vec<i64> = contents
            .lines()
            .map(|l| l.split_once(',').unwrap().0.parse().unwrap())
            .collect();
        assert_eq!(stamps.len(), 200);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "{stamps:?}");
    }

    #[test]
    fn test_dismiss_survey() {
        let f = fixture();
        for screen in ["A", "B", "A", "B", "A", "B"] {
            visit(&f, screen, 1);
        }
        f.tracker.enter_view("C");
        assert!(f.tracker.dismiss_survey());
        assert!(!f.tracker.dismiss_survey());
        assert_eq!(f.tracker.history().len(), 6);
    }

    #[test]
    fn test_lifecycle_markers() {
        let f = fixture();
        f.tracker.app_activate();
        f.clock.advance(5);
        f.tracker.app_deactivate();
        assert_eq!(log_lines(&f), vec!["1000,_ACTIVATE_", "1005,_DEACTIVATE_"]);
        assert!(f.tracker.history().is_empty());
    }

    #[test]
    fn test_log_file_named_after_device_and_creation() {
        let f = fixture();
        let name = f.tracker.log_path().unwrap().file_name().unwrap();
        assert_eq!(name.to_str().unwrap(), "test-device_1000.log");
        assert_eq!(f.tracker.created_at(), 1_000);
        assert_eq!(f.tracker.device_id(), "test-device");
    }

    #[test]
    fn test_tracking_survives_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();

        let mut config = TrackerConfig::with_log_dir(blocker.join("logs"));
        config.device_id = Some("d".to_string());
        let clock = ManualClock::new(0);
        let tracker =
            UsabilityTracker::new(config, Box::new(clock.clone()), Box::new(NoopPresenter))
                .unwrap();
        assert!(tracker.log_path().is_none());

        tracker.enter_view("A");
        clock.advance(2);
        tracker.enter_view("B");
        assert_eq!(tracker.history(), vec![NavigationEvent::new("A", 2)]);
        assert!(tracker.audit_failures() >= 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = TrackerConfig::default();
        config.history_capacity = 0;
        assert!(UsabilityTracker::open(config).is_err());
    }
}
