//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::config::{SurveyRules, MAX_CHILDREN, MAX_NIGHTS, MIN_NIGHTS};
use crate::localization::LocalizationManager;
use crate::survey::{SurveyStep, TOTAL_STEPS};

pub const CALLBACK_START_SURVEY: &str = "start_survey";
pub const CALLBACK_BACK: &str = "back";
pub const CALLBACK_SKIP: &str = "skip";
pub const CALLBACK_RETRY: &str = "retry";

/// Group the digits of an amount in threes: `150000` → `150 000`
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Coloured bar for the current step, e.g. `🟩🟩🟨⬜⬜⬜⬜`
pub fn progress_bar(step: SurveyStep) -> String {
    let current = step.number();
    (1..=TOTAL_STEPS)
        .map(|i| match i.cmp(&current) {
            std::cmp::Ordering::Less => "🟩",
            std::cmp::Ordering::Equal => "🟨",
            std::cmp::Ordering::Greater => "⬜",
        })
        .collect()
}

/// Progress line shown above each question
pub fn progress_line(i18n: &LocalizationManager, language: &str, step: SurveyStep) -> String {
    let current = step.number().to_string();
    let total = TOTAL_STEPS.to_string();
    format!(
        "{} {}",
        i18n.t_args("progress", language, &[("current", current.as_str()), ("total", total.as_str())]),
        progress_bar(step)
    )
}

/// Values substituted into prompts and validation messages
pub struct RuleArgs {
    min_nights: String,
    max_nights: String,
    min_adults: String,
    max_adults: String,
    max_children: String,
    min_budget: String,
}

impl RuleArgs {
    pub fn new(rules: &SurveyRules) -> Self {
        Self {
            min_nights: MIN_NIGHTS.to_string(),
            max_nights: MAX_NIGHTS.to_string(),
            min_adults: rules.min_travelers.to_string(),
            max_adults: rules.max_travelers.to_string(),
            max_children: MAX_CHILDREN.to_string(),
            min_budget: format_amount(rules.min_budget),
        }
    }

    pub fn as_args(&self) -> [(&str, &str); 6] {
        [
            ("min_nights", self.min_nights.as_str()),
            ("max_nights", self.max_nights.as_str()),
            ("min_adults", self.min_adults.as_str()),
            ("max_adults", self.max_adults.as_str()),
            ("max_children", self.max_children.as_str()),
            ("min_budget", self.min_budget.as_str()),
        ]
    }
}

/// Progress line followed by the question for `step`
pub fn format_prompt(i18n: &LocalizationManager, language: &str, rules: &SurveyRules, step: SurveyStep) -> String {
    let args = RuleArgs::new(rules);
    format!(
        "{}\n\n{}",
        progress_line(i18n, language, step),
        i18n.t_args(step.prompt_key(), language, &args.as_args())
    )
}

/// Welcome menu with the single "find a tour" button
pub fn create_main_menu_keyboard(i18n: &LocalizationManager, language: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        i18n.t("find-tour", language),
        CALLBACK_START_SURVEY,
    )]])
}

/// Keyboard attached to a survey question
pub fn create_step_keyboard(i18n: &LocalizationManager, language: &str, step: SurveyStep) -> InlineKeyboardMarkup {
    let back = vec![InlineKeyboardButton::callback(i18n.t("back", language), CALLBACK_BACK)];
    if step == SurveyStep::Comment {
        InlineKeyboardMarkup::new(vec![
            vec![InlineKeyboardButton::callback(i18n.t("skip", language), CALLBACK_SKIP)],
            back,
        ])
    } else {
        InlineKeyboardMarkup::new(vec![back])
    }
}

/// Keyboard offered after a failed save
pub fn create_retry_keyboard(i18n: &LocalizationManager, language: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(i18n.t("retry", language), CALLBACK_RETRY)],
        vec![InlineKeyboardButton::callback(i18n.t("back", language), CALLBACK_BACK)],
    ])
}

/// Split text blocks into messages that stay under `limit` characters
pub fn chunk_blocks(blocks: &[String], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for block in blocks {
        let needed = if current.is_empty() {
            block.chars().count()
        } else {
            current.chars().count() + 2 + block.chars().count()
        };
        if needed > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(block);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
