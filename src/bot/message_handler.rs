//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::debug;

use crate::dialogue::{ConversationState, SurveyDialogue};

use super::dialogue_manager::handle_event;
use super::{BotContext, EventPayload, InboundEvent};

/// Build the transport-neutral event for a message, `None` for anonymous senders
pub fn event_from_message(msg: &Message) -> Option<InboundEvent> {
    let user = msg.from.as_ref()?;
    let payload = match msg.text() {
        Some(text) => EventPayload::Text(text.to_string()),
        None => EventPayload::Unsupported,
    };

    Some(InboundEvent {
        user_id: user.id.0 as i64,
        chat_id: msg.chat.id,
        username: user.username.clone(),
        language_code: user.language_code.clone(),
        payload,
        origin_message: None,
    })
}

/// Persist the state returned by the dialogue manager
pub async fn store_state(dialogue: &SurveyDialogue, state: ConversationState) -> Result<()> {
    if state.is_idle() {
        dialogue.exit().await?;
    } else {
        dialogue.update(state).await?;
    }
    Ok(())
}

pub async fn message_handler(msg: Message, dialogue: SurveyDialogue, ctx: Arc<BotContext>) -> Result<()> {
    let Some(event) = event_from_message(&msg) else {
        debug!(chat_id = %msg.chat.id, "Ignoring message without a sender");
        return Ok(());
    };
    debug!(user_id = event.user_id, has_text = msg.text().is_some(), "Received message");

    let state = dialogue.get().await?.unwrap_or_default();
    let next = handle_event(&ctx, state, &event).await?;
    store_state(&dialogue, next).await
}
