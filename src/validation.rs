//! Step validators for the tour request survey.
//!
//! Every validator is a pure function returning either the accepted value or
//! the step's [`ValidationError`]. Parse failures and range failures share
//! the same error.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::{SurveyRules, MAX_CHILDREN, MAX_DESTINATION_CHARS, MAX_NIGHTS, MIN_NIGHTS};
use crate::errors::ValidationError;

/// Date format used for input and storage of the departure date
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Comment stored when the user skips the last step
pub const NO_COMMENT: &str = "Нет комментариев";

lazy_static! {
    // Whitespace (including non-breaking spaces) and the rouble sign
    static ref BUDGET_NOISE: Regex = Regex::new(r"[\s₽]").expect("Budget noise pattern should be valid");
}

pub fn validate_destination(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();

    if trimmed.is_empty() || trimmed.chars().count() > MAX_DESTINATION_CHARS {
        return Err(ValidationError::Destination);
    }

    Ok(trimmed.to_string())
}

/// Parse a `dd.mm.yyyy` departure date that is not before `today`
pub fn validate_departure_date(input: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let date = NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::DepartureDate)?;

    if date < today {
        return Err(ValidationError::DepartureDate);
    }

    Ok(date)
}

pub fn validate_nights(input: &str) -> Result<i32, ValidationError> {
    parse_in_range(input, MIN_NIGHTS, MAX_NIGHTS).ok_or(ValidationError::Nights)
}

pub fn validate_adults(input: &str, rules: &SurveyRules) -> Result<i32, ValidationError> {
    parse_in_range(input, rules.min_travelers, rules.max_travelers).ok_or(ValidationError::Adults)
}

pub fn validate_children(input: &str) -> Result<i32, ValidationError> {
    parse_in_range(input, 0, MAX_CHILDREN).ok_or(ValidationError::Children)
}

/// Parse a budget such as `150 000₽` and check it against the configured minimum
pub fn validate_budget(input: &str, rules: &SurveyRules) -> Result<i64, ValidationError> {
    let digits = BUDGET_NOISE.replace_all(input, "");
    let budget: i64 = digits.parse().map_err(|_| ValidationError::Budget)?;

    if budget < rules.min_budget {
        return Err(ValidationError::Budget);
    }

    Ok(budget)
}

/// Comments accept any text; blank input counts as a skip
pub fn normalize_comment(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        NO_COMMENT.to_string()
    } else {
        trimmed.to_string()
    }
}

fn parse_in_range(input: &str, min: i32, max: i32) -> Option<i32> {
    input
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|value| (min..=max).contains(value))
}
