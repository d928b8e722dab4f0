//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: turns incoming messages into [`InboundEvent`]s
//! - `callback_handler`: turns inline keyboard presses into [`InboundEvent`]s
//! - `dialogue_manager`: drives the conversation state for one event
//! - `admin_handler`: operator commands
//! - `ui_builder`: keyboards and message formatting

pub mod admin_handler;
pub mod callback_handler;
pub mod dialogue_manager;
pub mod message_handler;
pub mod ui_builder;

use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::dialogue::{self, InMemStorage};
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::MessageId;

use crate::config::SurveyRules;
use crate::delivery::DeliveryFanout;
use crate::dialogue::ConversationState;
use crate::localization::{detect_language, LocalizationManager};
use crate::messenger::Messenger;
use crate::reporting::AdminService;
use crate::throttle::RateLimiter;

pub use callback_handler::callback_handler;
pub use dialogue_manager::handle_event;
pub use message_handler::message_handler;

/// Everything a handler needs besides the update itself
pub struct BotContext {
    pub rules: SurveyRules,
    pub i18n: Arc<LocalizationManager>,
    pub limiter: Arc<RateLimiter>,
    pub fanout: DeliveryFanout,
    pub admin: AdminService,
    pub messenger: Arc<dyn Messenger>,
    /// Surveys idle for longer than this are dropped on the next event
    pub idle_timeout: Option<Duration>,
}

/// Inline keyboard actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyAction {
    Begin,
    Back,
    Skip,
    Retry,
}

impl SurveyAction {
    pub fn from_callback_data(data: &str) -> Option<Self> {
        match data {
            ui_builder::CALLBACK_START_SURVEY => Some(SurveyAction::Begin),
            ui_builder::CALLBACK_BACK => Some(SurveyAction::Back),
            ui_builder::CALLBACK_SKIP => Some(SurveyAction::Skip),
            ui_builder::CALLBACK_RETRY => Some(SurveyAction::Retry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Text(String),
    Action(SurveyAction),
    /// A message without text (photo, sticker, voice...)
    Unsupported,
}

/// Transport-neutral form of one user interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: i64,
    pub chat_id: ChatId,
    pub username: Option<String>,
    pub language_code: Option<String>,
    pub payload: EventPayload,
    /// Message carrying the pressed button, edited in place where possible
    pub origin_message: Option<MessageId>,
}

impl InboundEvent {
    /// Catalog language for replies to this user
    pub fn language(&self) -> &'static str {
        detect_language(self.language_code.as_deref())
    }

    /// Messages are rate limited, button presses are not
    pub fn is_message(&self) -> bool {
        !matches!(self.payload, EventPayload::Action(_))
    }
}

/// Dispatcher tree: every update enters the per-chat dialogue first
pub fn schema() -> UpdateHandler<anyhow::Error> {
    dialogue::enter::<Update, InMemStorage<ConversationState>, ConversationState, _>()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_data_mapping() {
        assert_eq!(SurveyAction::from_callback_data("start_survey"), Some(SurveyAction::Begin));
        assert_eq!(SurveyAction::from_callback_data("retry"), Some(SurveyAction::Retry));
        assert_eq!(SurveyAction::from_callback_data("edit_3"), None);
    }
}
