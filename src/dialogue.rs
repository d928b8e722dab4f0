//! Per-chat conversation state kept in the dispatcher's dialogue storage.

use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

use crate::survey::SurveySession;

/// Represents the conversation state of one chat
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationState {
    #[default]
    Idle,
    /// A tour request is being filled in
    Survey(SurveySession),
    /// The operator ran `/broadcast` without text; the next text is sent to everyone
    AwaitingBroadcast,
}

impl ConversationState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ConversationState::Idle)
    }
}

/// Type alias for the survey dialogue
pub type SurveyDialogue = Dialogue<ConversationState, InMemStorage<ConversationState>>;
