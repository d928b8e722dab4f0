//! # Survey State Machine
//!
//! The seven-step tour request questionnaire. A [`SurveySession`] owns the
//! current step and the answers collected so far; [`SurveySession::apply`] is
//! the transition function. It never performs I/O: the caller renders the
//! returned [`Transition`] and decides what happens to the session.
//!
//! ## Steps
//!
//! `Destination → DepartureDate → Nights → Adults → Children → Budget → Comment`
//!
//! - Valid input is stored and the session moves one step forward.
//! - Invalid input leaves the step and the answers untouched.
//! - Back rewinds the position only; stored values stay until overwritten.
//! - Text or skip on `Comment` completes the survey. The session stays on
//!   `Comment` until the caller confirms persistence, so a failed save can be
//!   retried without re-entering anything.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::SurveyRules;
use crate::errors::ValidationError;
use crate::store::NewSubmission;
use crate::validation::{
    normalize_comment, validate_adults, validate_budget, validate_children, validate_departure_date,
    validate_destination, validate_nights, DATE_FORMAT, NO_COMMENT,
};

/// Number of steps shown in the progress indicator
pub const TOTAL_STEPS: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurveyStep {
    Destination,
    DepartureDate,
    Nights,
    Adults,
    Children,
    Budget,
    Comment,
}

impl SurveyStep {
    pub const ALL: [SurveyStep; TOTAL_STEPS] = [
        SurveyStep::Destination,
        SurveyStep::DepartureDate,
        SurveyStep::Nights,
        SurveyStep::Adults,
        SurveyStep::Children,
        SurveyStep::Budget,
        SurveyStep::Comment,
    ];

    /// 1-based position used in the progress indicator
    pub fn number(self) -> usize {
        self.index() + 1
    }

    pub fn next(self) -> Option<SurveyStep> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<SurveyStep> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Localization key of the question asked at this step
    pub fn prompt_key(self) -> &'static str {
        match self {
            SurveyStep::Destination => "prompt-destination",
            SurveyStep::DepartureDate => "prompt-departure-date",
            SurveyStep::Nights => "prompt-nights",
            SurveyStep::Adults => "prompt-adults",
            SurveyStep::Children => "prompt-children",
            SurveyStep::Budget => "prompt-budget",
            SurveyStep::Comment => "prompt-comment",
        }
    }

    /// Localization key of the confirmation shown after the step is accepted
    pub fn saved_key(self) -> &'static str {
        match self {
            SurveyStep::Destination => "saved-destination",
            SurveyStep::DepartureDate => "saved-departure-date",
            SurveyStep::Nights => "saved-nights",
            SurveyStep::Adults => "saved-adults",
            SurveyStep::Children => "saved-children",
            SurveyStep::Budget => "saved-budget",
            SurveyStep::Comment => "saved-comment",
        }
    }

    fn index(self) -> usize {
        match self {
            SurveyStep::Destination => 0,
            SurveyStep::DepartureDate => 1,
            SurveyStep::Nights => 2,
            SurveyStep::Adults => 3,
            SurveyStep::Children => 4,
            SurveyStep::Budget => 5,
            SurveyStep::Comment => 6,
        }
    }
}

/// Answers collected so far. Fields are only ever set in step order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyAnswers {
    pub destination: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub nights: Option<i32>,
    pub adults: Option<i32>,
    pub children: Option<i32>,
    pub budget: Option<i64>,
    pub comment: Option<String>,
}

impl SurveyAnswers {
    pub fn is_set(&self, step: SurveyStep) -> bool {
        match step {
            SurveyStep::Destination => self.destination.is_some(),
            SurveyStep::DepartureDate => self.departure_date.is_some(),
            SurveyStep::Nights => self.nights.is_some(),
            SurveyStep::Adults => self.adults.is_some(),
            SurveyStep::Children => self.children.is_some(),
            SurveyStep::Budget => self.budget.is_some(),
            SurveyStep::Comment => self.comment.is_some(),
        }
    }

    /// Display form of the stored value for a step
    pub fn display_value(&self, step: SurveyStep) -> Option<String> {
        match step {
            SurveyStep::Destination => self.destination.clone(),
            SurveyStep::DepartureDate => self.departure_date.map(|d| d.format(DATE_FORMAT).to_string()),
            SurveyStep::Nights => self.nights.map(|v| v.to_string()),
            SurveyStep::Adults => self.adults.map(|v| v.to_string()),
            SurveyStep::Children => self.children.map(|v| v.to_string()),
            SurveyStep::Budget => self.budget.map(|v| v.to_string()),
            SurveyStep::Comment => self.comment.clone(),
        }
    }

    fn first_missing_step(&self) -> Option<SurveyStep> {
        SurveyStep::ALL.into_iter().find(|step| !self.is_set(*step))
    }

    fn complete(&self) -> Option<CompletedSurvey> {
        Some(CompletedSurvey {
            destination: self.destination.clone()?,
            departure_date: self.departure_date?,
            nights: self.nights?,
            adults: self.adults?,
            children: self.children?,
            budget: self.budget?,
            comment: self.comment.clone()?,
        })
    }
}

/// Fully validated answers, ready to become a submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedSurvey {
    pub destination: String,
    pub departure_date: NaiveDate,
    pub nights: i32,
    pub adults: i32,
    pub children: i32,
    pub budget: i64,
    pub comment: String,
}

impl CompletedSurvey {
    pub fn into_submission(self, user_id: i64, username: Option<String>) -> NewSubmission {
        NewSubmission {
            user_id,
            username,
            destination: self.destination,
            departure_date: self.departure_date.format(DATE_FORMAT).to_string(),
            nights: self.nights,
            adults: self.adults,
            children: self.children,
            budget: self.budget,
            comment: Some(self.comment),
        }
    }
}

/// Input delivered to the state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurveyInput<'a> {
    Text(&'a str),
    Back,
    Skip,
    /// Resubmit a completed survey whose save failed
    Retry,
}

/// Outcome of applying an input to a session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// `accepted` was stored and the session moved to `next`
    Advanced { accepted: SurveyStep, next: SurveyStep },
    /// Input rejected, nothing changed
    Rejected(ValidationError),
    /// Position rewound to `to`; stored values kept
    SteppedBack { to: SurveyStep },
    /// Back from the first step: the survey is over and must be discarded
    Exited,
    /// All answers collected; the caller persists them
    Completed(CompletedSurvey),
    /// Input has no meaning at the current step
    Ignored,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveySession {
    step: SurveyStep,
    answers: SurveyAnswers,
    updated_at: DateTime<Utc>,
}

impl SurveySession {
    /// Start an empty survey at the first step
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            step: SurveyStep::Destination,
            answers: SurveyAnswers::default(),
            updated_at: now,
        }
    }

    pub fn step(&self) -> SurveyStep {
        self.step
    }

    pub fn answers(&self) -> &SurveyAnswers {
        &self.answers
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the last activity is older than `timeout`
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match (now - self.updated_at).to_std() {
            Ok(idle) => idle > timeout,
            Err(_) => false,
        }
    }

    /// Apply one input and report what happened
    pub fn apply(
        &mut self,
        input: SurveyInput<'_>,
        rules: &SurveyRules,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Transition {
        self.updated_at = now;

        match input {
            SurveyInput::Back => match self.step.previous() {
                Some(previous) => {
                    self.step = previous;
                    Transition::SteppedBack { to: previous }
                }
                None => Transition::Exited,
            },
            SurveyInput::Skip if self.step == SurveyStep::Comment => {
                self.answers.comment = Some(NO_COMMENT.to_string());
                self.finish()
            }
            SurveyInput::Retry if self.step == SurveyStep::Comment && self.answers.comment.is_some() => {
                self.finish()
            }
            SurveyInput::Skip | SurveyInput::Retry => Transition::Ignored,
            SurveyInput::Text(text) => match self.accept(text, rules, today) {
                Ok(()) if self.step == SurveyStep::Comment => self.finish(),
                Ok(()) => {
                    let accepted = self.step;
                    match accepted.next() {
                        Some(next) => {
                            self.step = next;
                            Transition::Advanced { accepted, next }
                        }
                        None => self.finish(),
                    }
                }
                Err(error) => Transition::Rejected(error),
            },
        }
    }

    fn accept(&mut self, text: &str, rules: &SurveyRules, today: NaiveDate) -> Result<(), ValidationError> {
        let answers = &mut self.answers;
        match self.step {
            SurveyStep::Destination => answers.destination = Some(validate_destination(text)?),
            SurveyStep::DepartureDate => answers.departure_date = Some(validate_departure_date(text, today)?),
            SurveyStep::Nights => answers.nights = Some(validate_nights(text)?),
            SurveyStep::Adults => answers.adults = Some(validate_adults(text, rules)?),
            SurveyStep::Children => answers.children = Some(validate_children(text)?),
            SurveyStep::Budget => answers.budget = Some(validate_budget(text, rules)?),
            SurveyStep::Comment => answers.comment = Some(normalize_comment(text)),
        }
        Ok(())
    }

    fn finish(&mut self) -> Transition {
        match self.answers.complete() {
            Some(completed) => Transition::Completed(completed),
            None => {
                // Unreachable through `apply`; recover by returning to the gap
                let missing = self.answers.first_missing_step().unwrap_or(SurveyStep::Destination);
                warn!(step = ?missing, "Survey reached completion with a missing answer");
                self.step = missing;
                Transition::SteppedBack { to: missing }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_ordering() {
        assert_eq!(SurveyStep::Destination.previous(), None);
        assert_eq!(SurveyStep::Destination.next(), Some(SurveyStep::DepartureDate));
        assert_eq!(SurveyStep::Comment.next(), None);
        assert_eq!(SurveyStep::Comment.previous(), Some(SurveyStep::Budget));
        assert_eq!(SurveyStep::Comment.number(), TOTAL_STEPS);
    }

    #[test]
    fn test_stale_detection() {
        let start = Utc::now();
        let session = SurveySession::new(start);
        let timeout = Duration::from_secs(60);

        assert!(!session.is_stale(start + chrono::Duration::seconds(30), timeout));
        assert!(session.is_stale(start + chrono::Duration::seconds(61), timeout));
        // Clock going backwards never expires a survey
        assert!(!session.is_stale(start - chrono::Duration::seconds(120), timeout));
    }

    #[test]
    fn test_skip_outside_comment_is_ignored() {
        let now = Utc::now();
        let mut session = SurveySession::new(now);
        let transition = session.apply(SurveyInput::Skip, &SurveyRules::default(), now.date_naive(), now);

        assert_eq!(transition, Transition::Ignored);
        assert_eq!(session.step(), SurveyStep::Destination);
    }
}
