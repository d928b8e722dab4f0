//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, warn};

use crate::dialogue::SurveyDialogue;

use super::dialogue_manager::handle_event;
use super::message_handler::store_state;
use super::{BotContext, EventPayload, InboundEvent, SurveyAction};

/// Handle callback queries from inline keyboards
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    dialogue: SurveyDialogue,
    ctx: Arc<BotContext>,
) -> Result<()> {
    debug!(user_id = %q.from.id, data = ?q.data, "Received callback query from user");

    // Stop the client-side spinner before doing any work
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!(user_id = %q.from.id, error = %e, "Failed to answer callback query");
    }

    let Some(action) = q.data.as_deref().and_then(SurveyAction::from_callback_data) else {
        debug!(user_id = %q.from.id, "Ignoring unknown callback data");
        return Ok(());
    };
    let Some(message) = q.message.as_ref() else {
        debug!(user_id = %q.from.id, "Callback without an originating message");
        return Ok(());
    };

    let event = InboundEvent {
        user_id: q.from.id.0 as i64,
        chat_id: message.chat().id,
        username: q.from.username.clone(),
        language_code: q.from.language_code.clone(),
        payload: EventPayload::Action(action),
        origin_message: Some(message.id()),
    };

    let state = dialogue.get().await?.unwrap_or_default();
    let next = handle_event(&ctx, state, &event).await?;
    store_state(&dialogue, next).await
}
