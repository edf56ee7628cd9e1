//! FFI bindings for the usability tracker
//!
//! C-compatible functions for embedding the tracker in a mobile host. Strings are
//! null-terminated UTF-8. Strings returned by this module are allocated here and
//! must be released with `ut_free_string`.
//!
//! Survey prompts are delivered to the host through a callback receiving the
//! prompt as JSON, e.g. `{"step":"rating","question":"...","min":1.0,...}`. The
//! pointer passed to the callback is only valid for the duration of the call.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use crate::clock::SystemClock;
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::survey::{NoopPresenter, SurveyPresenter, SurveyPrompt, SurveyResponse, SurveyStep};
use crate::tracker::{self, UsabilityTracker};

/// Host callback receiving a survey prompt as JSON
pub type SurveyCallback = extern "C" fn(prompt_json: *const c_char);

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn step_code(step: SurveyStep) -> c_int {
    match step {
        SurveyStep::Rating => 0,
        SurveyStep::FreeText => 1,
        SurveyStep::Done => 2,
    }
}

/// Forwards prompts to a C callback
struct CallbackPresenter {
    callback: SurveyCallback,
}

impl SurveyPresenter for CallbackPresenter {
    fn present(&self, prompt: &SurveyPrompt) {
        match serde_json::to_string(prompt).map(CString::new) {
            Ok(Ok(json)) => (self.callback)(json.as_ptr()),
            _ => log::warn!("survey prompt could not be passed to the host"),
        }
    }
}

fn presenter_for(callback: Option<SurveyCallback>) -> Box<dyn SurveyPresenter> {
    match callback {
        Some(callback) => Box::new(CallbackPresenter { callback }),
        None => Box::new(NoopPresenter),
    }
}

/// Parse a config from a C string; NULL means the defaults
unsafe fn config_from_ptr(config_json: *const c_char) -> Result<TrackerConfig, String> {
    if config_json.is_null() {
        return Ok(TrackerConfig::default());
    }
    let json = cstr_to_string(config_json).ok_or("Invalid config string pointer")?;
    TrackerConfig::from_json(&json).map_err(|e| e.to_string())
}

unsafe fn tracker_ref<'a>(tracker: *const UsabilityTracker) -> Option<&'a UsabilityTracker> {
    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return None;
    }
    Some(&*tracker)
}

fn survey_result(result: Result<SurveyStep, TrackerError>) -> c_int {
    match result {
        Ok(step) => step_code(step),
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Tracker Lifecycle
// ============================================================================

/// Create a standalone tracker.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Must be freed with `ut_tracker_free`.
/// - Returns NULL on error; call `ut_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ut_tracker_new(
    config_json: *const c_char,
    callback: Option<SurveyCallback>,
) -> *mut UsabilityTracker {
    clear_last_error();

    let config = match config_from_ptr(config_json) {
        Ok(config) => config,
        Err(e) => {
            set_last_error(&e);
            return ptr::null_mut();
        }
    };

    match UsabilityTracker::new(config, Box::new(SystemClock), presenter_for(callback)) {
        Ok(tracker) => Box::into_raw(Box::new(tracker)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Initialize (on first call) and return the process-wide tracker.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Arguments are ignored once the shared tracker exists.
/// - The returned pointer lives for the whole process; do NOT pass it to
///   `ut_tracker_free`.
/// - Returns NULL on error; call `ut_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ut_tracker_shared(
    config_json: *const c_char,
    callback: Option<SurveyCallback>,
) -> *const UsabilityTracker {
    clear_last_error();

    if let Some(existing) = tracker::shared() {
        return existing;
    }

    let config = match config_from_ptr(config_json) {
        Ok(config) => config,
        Err(e) => {
            set_last_error(&e);
            return ptr::null();
        }
    };

    match tracker::init_shared(config, presenter_for(callback)) {
        Ok(shared) => shared,
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null()
        }
    }
}

/// Free a tracker created by `ut_tracker_new`.
///
/// # Safety
/// - `tracker` must be a pointer returned by `ut_tracker_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ut_tracker_free(tracker: *mut UsabilityTracker) {
    if !tracker.is_null() {
        drop(Box::from_raw(tracker));
    }
}

// ============================================================================
// Navigation
// ============================================================================

/// Record that a screen appeared.
///
/// # Safety
/// - `tracker` must be a valid tracker pointer.
/// - `screen_id` must be a valid null-terminated C string.
/// - Returns 1 if a survey was started, 0 otherwise, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn ut_enter_view(
    tracker: *const UsabilityTracker,
    screen_id: *const c_char,
) -> c_int {
    clear_last_error();

    let Some(tracker) = tracker_ref(tracker) else {
        return -1;
    };
    let Some(screen_id) = cstr_to_string(screen_id) else {
        set_last_error("Invalid screen_id string pointer");
        return -1;
    };

    c_int::from(tracker.enter_view(&screen_id).survey_started)
}

/// Record that the host app came to the foreground.
///
/// # Safety
/// - `tracker` must be a valid tracker pointer.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn ut_app_activate(tracker: *const UsabilityTracker) -> c_int {
    clear_last_error();

    match tracker_ref(tracker) {
        Some(tracker) => {
            tracker.app_activate();
            0
        }
        None => -1,
    }
}

/// Record that the host app went to the background.
///
/// # Safety
/// - `tracker` must be a valid tracker pointer.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn ut_app_deactivate(tracker: *const UsabilityTracker) -> c_int {
    clear_last_error();

    match tracker_ref(tracker) {
        Some(tracker) => {
            tracker.app_deactivate();
            0
        }
        None => -1,
    }
}

// ============================================================================
// Survey
// ============================================================================

/// Submit the rating step answer.
///
/// # Safety
/// - `tracker` must be a valid tracker pointer.
/// - Returns the next step (0 rating, 1 free text, 2 done) or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn ut_submit_rating(tracker: *const UsabilityTracker, value: f64) -> c_int {
    clear_last_error();

    let Some(tracker) = tracker_ref(tracker) else {
        return -1;
    };
    survey_result(tracker.submit_survey(SurveyResponse::Rating { value }))
}

/// Submit the free-text step answer.
///
/// # Safety
/// - `tracker` must be a valid tracker pointer.
/// - `text` must be a valid null-terminated C string.
/// - Returns the next step (2 done) or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn ut_submit_freetext(
    tracker: *const UsabilityTracker,
    text: *const c_char,
) -> c_int {
    clear_last_error();

    let Some(tracker) = tracker_ref(tracker) else {
        return -1;
    };
    let Some(text) = cstr_to_string(text) else {
        set_last_error("Invalid text string pointer");
        return -1;
    };
    survey_result(tracker.submit_survey(SurveyResponse::FreeText { text }))
}

/// Current history window as a JSON array, newest first.
///
/// # Safety
/// - `tracker` must be a valid tracker pointer.
/// - Returns a newly allocated string that must be freed with `ut_free_string`.
/// - Returns NULL on error; call `ut_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ut_history_json(tracker: *const UsabilityTracker) -> *mut c_char {
    clear_last_error();

    let Some(tracker) = tracker_ref(tracker) else {
        return ptr::null_mut();
    };
    match serde_json::to_string(&tracker.history()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by this library.
///
/// # Safety
/// - `ptr` must be a pointer returned by a `ut_` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ut_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `ut_` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn ut_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn ut_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static PROMPTS_SEEN: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn count_prompt(prompt_json: *const c_char) {
        let json = unsafe { CStr::from_ptr(prompt_json) }.to_str().unwrap();
        assert!(json.contains("\"step\""));
        PROMPTS_SEEN.fetch_add(1, Ordering::SeqCst);
    }

    fn config_json(dir: &std::path::Path) -> CString {
        let mut config = TrackerConfig::with_log_dir(dir);
        config.device_id = Some("ffi-device".to_string());
        CString::new(config.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_ffi_tracker_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_json(dir.path());

        unsafe {
            let tracker = ut_tracker_new(config.as_ptr(), Some(count_prompt));
            assert!(!tracker.is_null());

            let screen = CString::new("Home").unwrap();
            assert_eq!(ut_enter_view(tracker, screen.as_ptr()), 0);
            assert_eq!(ut_app_activate(tracker), 0);
            assert_eq!(ut_app_deactivate(tracker), 0);

            let history = ut_history_json(tracker);
            assert!(!history.is_null());
            assert_eq!(CStr::from_ptr(history).to_str().unwrap(), "[]");
            ut_free_string(history);

            // Same-second transitions are brief visits; this loops A/B.
            let mut started = 0;
            for name in ["A", "B", "A", "B", "A", "B"] {
                let name = CString::new(name).unwrap();
                started += ut_enter_view(tracker, name.as_ptr());
            }
            assert_eq!(started, 1);
            assert_eq!(PROMPTS_SEEN.load(Ordering::SeqCst), 1);

            assert_eq!(ut_submit_rating(tracker, 5.0), 1);
            let text = CString::new("search").unwrap();
            assert_eq!(ut_submit_freetext(tracker, text.as_ptr()), 2);
            assert_eq!(PROMPTS_SEEN.load(Ordering::SeqCst), 2);

            ut_tracker_free(tracker);
        }
    }

    #[test]
    fn test_ffi_errors() {
        unsafe {
            assert_eq!(ut_app_activate(ptr::null()), -1);
            assert!(!ut_last_error().is_null());

            let bad = CString::new("{not json").unwrap();
            assert!(ut_tracker_new(bad.as_ptr(), None).is_null());
            assert!(!ut_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_rating_without_survey() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_json(dir.path());
        unsafe {
            let tracker = ut_tracker_new(config.as_ptr(), None);
            assert_eq!(ut_submit_rating(tracker, 3.0), -1);
            let msg = CStr::from_ptr(ut_last_error()).to_str().unwrap();
            assert!(msg.contains("No survey"));
            ut_tracker_free(tracker);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = CStr::from_ptr(ut_version()).to_str().unwrap();
            assert_eq!(version, env!("CARGO_PKG_VERSION"));
        }
    }
}
