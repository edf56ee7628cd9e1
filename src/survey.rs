//! Two-step micro-survey
//!
//! A survey starts at the rating step. Answering it records the rating; ratings
//! at or above the free-text threshold continue to a free-text step, lower ones
//! end the survey. The host renders prompts through a [`SurveyPresenter`] and
//! reports answers back as [`SurveyResponse`] values.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::config::SurveySettings;
use crate::error::TrackerError;

/// Where a survey currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStep {
    Rating,
    FreeText,
    Done,
}

/// An answer delivered by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SurveyResponse {
    Rating { value: f64 },
    FreeText { text: String },
}

/// What the host should display next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SurveyPrompt {
    Rating {
        question: String,
        min: f64,
        max: f64,
        default: f64,
    },
    FreeText {
        question: String,
    },
}

/// Host-side renderer for survey prompts.
///
/// Presentation is fire-and-forget: implementations must not block waiting for
/// the user, and must not answer synchronously from inside `present` if they
/// rely on the prompt having been shown first.
pub trait SurveyPresenter: Send + Sync {
    fn present(&self, prompt: &SurveyPrompt);
}

impl<P: SurveyPresenter + ?Sized> SurveyPresenter for Arc<P> {
    fn present(&self, prompt: &SurveyPrompt) {
        (**self).present(prompt)
    }
}

/// Presenter that shows nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresenter;

impl SurveyPresenter for NoopPresenter {
    fn present(&self, _prompt: &SurveyPrompt) {}
}

/// Presenter that keeps every prompt it was asked to show
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    prompts: Mutex<Vec<SurveyPrompt>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> Vec<SurveyPrompt> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl SurveyPresenter for RecordingPresenter {
    fn present(&self, prompt: &SurveyPrompt) {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }
    }
}

/// State machine for one survey
#[derive(Debug, Clone)]
pub struct SurveyFlow {
    settings: SurveySettings,
    step: SurveyStep,
}

impl SurveyFlow {
    pub fn new(settings: SurveySettings) -> Self {
        Self {
            settings,
            step: SurveyStep::Rating,
        }
    }

    pub fn step(&self) -> SurveyStep {
        self.step
    }

    pub fn is_done(&self) -> bool {
        self.step == SurveyStep::Done
    }

    /// Prompt for the current step, `None` once the survey has ended
    pub fn prompt(&self) -> Option<SurveyPrompt> {
        let s = &self.settings;
        match self.step {
            SurveyStep::Rating => Some(SurveyPrompt::Rating {
                question: s.rating_question.clone(),
                min: s.rating_min,
                max: s.rating_max,
                default: s.rating_default,
            }),
            SurveyStep::FreeText => Some(SurveyPrompt::FreeText {
                question: s.freetext_question.clone(),
            }),
            SurveyStep::Done => None,
        }
    }

    /// Validate `response` against the current step and advance.
    ///
    /// On error the step is left unchanged.
    pub fn apply(&mut self, response: &SurveyResponse) -> Result<SurveyStep, TrackerError> {
        let next = match (self.step, response) {
            (SurveyStep::Rating, SurveyResponse::Rating { value }) => {
                let (min, max) = (self.settings.rating_min, self.settings.rating_max);
                if !value.is_finite() || *value < min || *value > max {
                    return Err(TrackerError::InvalidRating {
                        value: *value,
                        min,
                        max,
                    });
                }
                if *value >= self.settings.freetext_threshold {
                    SurveyStep::FreeText
                } else {
                    SurveyStep::Done
                }
            }
            (SurveyStep::FreeText, SurveyResponse::FreeText { text }) => {
                // Each answer is one audit line.
                if text.contains(['\n', '\r']) {
                    return Err(TrackerError::InvalidFreeText);
                }
                SurveyStep::Done
            }
            (step, _) => return Err(TrackerError::UnexpectedResponse(step)),
        };
        self.step = next;
        Ok(next)
    }
}
