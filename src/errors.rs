//! # Error Types Module
//!
//! Error types shared by the survey core, the submission store, the delivery
//! channels and the administrative commands.

use thiserror::Error;

use crate::survey::SurveyStep;

/// Rejection produced by a step validator.
///
/// Parse failures and range failures of the same step map to the same
/// variant so the user always sees one message per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("destination must be non-empty text")]
    Destination,
    #[error("departure date must be dd.mm.yyyy and not in the past")]
    DepartureDate,
    #[error("nights out of range")]
    Nights,
    #[error("adults out of range")]
    Adults,
    #[error("children out of range")]
    Children,
    #[error("budget below minimum or not a number")]
    Budget,
}

impl ValidationError {
    /// Step whose validator produced this error
    pub fn step(&self) -> SurveyStep {
        match self {
            ValidationError::Destination => SurveyStep::Destination,
            ValidationError::DepartureDate => SurveyStep::DepartureDate,
            ValidationError::Nights => SurveyStep::Nights,
            ValidationError::Adults => SurveyStep::Adults,
            ValidationError::Children => SurveyStep::Children,
            ValidationError::Budget => SurveyStep::Budget,
        }
    }

    /// Localization key of the message shown to the user
    pub fn message_key(&self) -> &'static str {
        match self {
            ValidationError::Destination => "invalid-destination",
            ValidationError::DepartureDate => "invalid-departure-date",
            ValidationError::Nights => "invalid-nights",
            ValidationError::Adults => "invalid-adults",
            ValidationError::Children => "invalid-children",
            ValidationError::Budget => "invalid-budget",
        }
    }
}

/// Submission store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request #{0} not found")]
    NotFound(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Best-effort delivery failures. Logged, never shown to the submitting user.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("credentials error: {0}")]
    Credentials(String),
    #[error("token signing error: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("spreadsheet rejected append ({status}): {body}")]
    Sheets { status: u16, body: String },
    #[error("notification failed: {0}")]
    Notification(String),
}

/// Administrative command failures
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("access denied for user {0}")]
    AccessDenied(i64),
    #[error("request #{0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Store(StoreError),
    #[error("export failed: {0}")]
    Export(String),
    #[error("failed to send reply: {0}")]
    Reply(String),
}

impl From<StoreError> for AdminError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AdminError::NotFound(id),
            other => AdminError::Store(other),
        }
    }
}
