//! Dialogue Manager module: applies one inbound event to a conversation.
//!
//! [`handle_event`] is transport-neutral. It receives the stored state and
//! returns the state to store; every reply goes through the context's
//! [`Messenger`](crate::messenger::Messenger).

use anyhow::Result;
use chrono::Utc;
use teloxide::types::InlineKeyboardMarkup;
use tracing::{debug, info, warn};

use crate::dialogue::ConversationState;
use crate::errors::ValidationError;
use crate::reporting::local_today;
use crate::survey::{CompletedSurvey, SurveyInput, SurveySession, SurveyStep, Transition};

use super::admin_handler::{handle_admin_command, parse_command, run_broadcast, Command};
use super::ui_builder::{
    create_main_menu_keyboard, create_retry_keyboard, create_step_keyboard, format_amount, format_prompt,
    progress_line, RuleArgs,
};
use super::{BotContext, EventPayload, InboundEvent, SurveyAction};

/// Process one event and return the next conversation state
pub async fn handle_event(ctx: &BotContext, state: ConversationState, event: &InboundEvent) -> Result<ConversationState> {
    let lang = event.language();

    if event.is_message() {
        if let Err(wait) = ctx.limiter.check(event.user_id) {
            debug!(user_id = event.user_id, wait_ms = wait.as_millis() as u64, "Message throttled");
            let seconds = format!("{:.1}", wait.as_secs_f64());
            let text = ctx.i18n.t_args("throttle", lang, &[("seconds", seconds.as_str())]);
            ctx.messenger.send_text(event.chat_id, &text, None).await?;
            return Ok(state);
        }
    }

    let state = expire_idle_survey(ctx, state, event);

    if let EventPayload::Text(text) = &event.payload {
        if let Some(command) = parse_command(text) {
            return handle_command(ctx, state, event, command).await;
        }
    }

    match (state, &event.payload) {
        (_, EventPayload::Action(SurveyAction::Begin)) => start_survey(ctx, event).await,
        (ConversationState::Survey(session), EventPayload::Text(text)) => {
            advance_survey(ctx, session, event, SurveyInput::Text(text)).await
        }
        (ConversationState::Survey(session), EventPayload::Action(SurveyAction::Back)) => {
            advance_survey(ctx, session, event, SurveyInput::Back).await
        }
        (ConversationState::Survey(session), EventPayload::Action(SurveyAction::Skip)) => {
            advance_survey(ctx, session, event, SurveyInput::Skip).await
        }
        (ConversationState::Survey(session), EventPayload::Action(SurveyAction::Retry)) => {
            advance_survey(ctx, session, event, SurveyInput::Retry).await
        }
        (state @ ConversationState::Survey(_), EventPayload::Unsupported)
        | (state @ ConversationState::AwaitingBroadcast, EventPayload::Unsupported) => {
            ctx.messenger
                .send_text(event.chat_id, &ctx.i18n.t("text-only", lang), None)
                .await?;
            Ok(state)
        }
        (ConversationState::AwaitingBroadcast, EventPayload::Text(text)) => {
            run_broadcast(ctx, event, text).await?;
            Ok(ConversationState::Idle)
        }
        (ConversationState::AwaitingBroadcast, EventPayload::Action(_)) => Ok(ConversationState::AwaitingBroadcast),
        (ConversationState::Idle, EventPayload::Action(_)) => {
            // Button from a finished or expired survey
            send_welcome(ctx, event).await?;
            Ok(ConversationState::Idle)
        }
        (ConversationState::Idle, EventPayload::Text(_) | EventPayload::Unsupported) => {
            ctx.messenger
                .send_text(
                    event.chat_id,
                    &ctx.i18n.t("idle-hint", lang),
                    Some(create_main_menu_keyboard(&ctx.i18n, lang)),
                )
                .await?;
            Ok(ConversationState::Idle)
        }
    }
}

fn expire_idle_survey(ctx: &BotContext, state: ConversationState, event: &InboundEvent) -> ConversationState {
    match (state, ctx.idle_timeout) {
        (ConversationState::Survey(session), Some(timeout)) if session.is_stale(Utc::now(), timeout) => {
            info!(
                user_id = event.user_id,
                step = ?session.step(),
                last_activity = %session.updated_at(),
                "Discarding idle survey"
            );
            ConversationState::Idle
        }
        (state, _) => state,
    }
}

async fn handle_command(
    ctx: &BotContext,
    state: ConversationState,
    event: &InboundEvent,
    command: Command,
) -> Result<ConversationState> {
    let lang = event.language();
    match command {
        Command::Start => {
            if !state.is_idle() {
                info!(user_id = event.user_id, "Conversation reset by /start");
            }
            send_welcome(ctx, event).await?;
            Ok(ConversationState::Idle)
        }
        Command::Cancel => {
            match state {
                ConversationState::AwaitingBroadcast => {
                    ctx.messenger
                        .send_text(event.chat_id, &ctx.i18n.t("admin-broadcast-cancelled", lang), None)
                        .await?;
                }
                ConversationState::Survey(session) => {
                    info!(user_id = event.user_id, step = ?session.step(), "Survey cancelled");
                    send_welcome(ctx, event).await?;
                }
                ConversationState::Idle => send_welcome(ctx, event).await?,
            }
            Ok(ConversationState::Idle)
        }
        Command::Admin(command) => Ok(handle_admin_command(ctx, event, command)
            .await?
            .unwrap_or(state)),
        Command::Unknown(name) => {
            debug!(user_id = event.user_id, command = %name, "Ignoring unknown command");
            Ok(state)
        }
    }
}

async fn send_welcome(ctx: &BotContext, event: &InboundEvent) -> Result<()> {
    let lang = event.language();
    ctx.messenger
        .send_text(
            event.chat_id,
            &ctx.i18n.t("welcome", lang),
            Some(create_main_menu_keyboard(&ctx.i18n, lang)),
        )
        .await?;
    Ok(())
}

/// Edit the message carrying the pressed button, or send a new one
async fn replace_or_send(
    ctx: &BotContext,
    event: &InboundEvent,
    text: &str,
    keyboard: InlineKeyboardMarkup,
) -> Result<()> {
    if let Some(message_id) = event.origin_message {
        match ctx
            .messenger
            .edit_text(event.chat_id, message_id, text, Some(keyboard.clone()))
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) => debug!(user_id = event.user_id, error = %e, "Edit failed, sending a new message"),
        }
    }
    ctx.messenger.send_text(event.chat_id, text, Some(keyboard)).await?;
    Ok(())
}

async fn start_survey(ctx: &BotContext, event: &InboundEvent) -> Result<ConversationState> {
    let lang = event.language();
    let session = SurveySession::new(Utc::now());
    info!(user_id = event.user_id, "Survey started");

    let step = session.step();
    ctx.messenger
        .send_text(
            event.chat_id,
            &format_prompt(&ctx.i18n, lang, &ctx.rules, step),
            Some(create_step_keyboard(&ctx.i18n, lang, step)),
        )
        .await?;
    Ok(ConversationState::Survey(session))
}

async fn advance_survey(
    ctx: &BotContext,
    mut session: SurveySession,
    event: &InboundEvent,
    input: SurveyInput<'_>,
) -> Result<ConversationState> {
    let lang = event.language();
    let now = Utc::now();

    match session.apply(input, &ctx.rules, local_today(now), now) {
        Transition::Advanced { accepted, next } => {
            let value = match (accepted, session.answers().budget) {
                (SurveyStep::Budget, Some(budget)) => format_amount(budget),
                _ => session.answers().display_value(accepted).unwrap_or_default(),
            };
            debug!(user_id = event.user_id, step = ?accepted, "Survey answer accepted");

            let text = format!(
                "{}\n\n{}",
                ctx.i18n.t_args(accepted.saved_key(), lang, &[("value", value.as_str())]),
                format_prompt(&ctx.i18n, lang, &ctx.rules, next)
            );
            ctx.messenger
                .send_text(event.chat_id, &text, Some(create_step_keyboard(&ctx.i18n, lang, next)))
                .await?;
            Ok(ConversationState::Survey(session))
        }
        Transition::Rejected(error) => {
            send_rejection(ctx, &session, event, error).await?;
            Ok(ConversationState::Survey(session))
        }
        Transition::SteppedBack { to } => {
            debug!(user_id = event.user_id, step = ?to, "Survey stepped back");
            let text = format_prompt(&ctx.i18n, lang, &ctx.rules, to);
            replace_or_send(ctx, event, &text, create_step_keyboard(&ctx.i18n, lang, to)).await?;
            Ok(ConversationState::Survey(session))
        }
        Transition::Exited => {
            info!(user_id = event.user_id, "Survey left from the first step");
            replace_or_send(
                ctx,
                event,
                &ctx.i18n.t("welcome", lang),
                create_main_menu_keyboard(&ctx.i18n, lang),
            )
            .await?;
            Ok(ConversationState::Idle)
        }
        Transition::Completed(completed) => submit_survey(ctx, session, event, completed).await,
        Transition::Ignored => {
            // Stale button from another step
            let step = session.step();
            debug!(user_id = event.user_id, step = ?step, "Button not valid here, repeating prompt");
            let text = format_prompt(&ctx.i18n, lang, &ctx.rules, step);
            replace_or_send(ctx, event, &text, create_step_keyboard(&ctx.i18n, lang, step)).await?;
            Ok(ConversationState::Survey(session))
        }
    }
}

async fn send_rejection(
    ctx: &BotContext,
    session: &SurveySession,
    event: &InboundEvent,
    error: ValidationError,
) -> Result<()> {
    let lang = event.language();
    debug!(user_id = event.user_id, step = ?error.step(), "Survey answer rejected");

    let args = RuleArgs::new(&ctx.rules);
    let text = format!(
        "{}\n\n{}",
        ctx.i18n.t_args(error.message_key(), lang, &args.as_args()),
        progress_line(&ctx.i18n, lang, session.step())
    );
    ctx.messenger
        .send_text(
            event.chat_id,
            &text,
            Some(create_step_keyboard(&ctx.i18n, lang, session.step())),
        )
        .await?;
    Ok(())
}

async fn submit_survey(
    ctx: &BotContext,
    session: SurveySession,
    event: &InboundEvent,
    completed: CompletedSurvey,
) -> Result<ConversationState> {
    let lang = event.language();
    let submission = completed.into_submission(event.user_id, event.username.clone());

    let submitted = match ctx.fanout.submit(submission).await {
        Ok(submitted) => submitted,
        Err(e) => {
            warn!(user_id = event.user_id, error = %e, "Submission failed, offering retry");
            ctx.messenger
                .send_text(
                    event.chat_id,
                    &ctx.i18n.t("submit-failed", lang),
                    Some(create_retry_keyboard(&ctx.i18n, lang)),
                )
                .await?;
            return Ok(ConversationState::Survey(session));
        }
    };

    // Deliveries keep running detached
    let record = submitted.record;
    info!(user_id = event.user_id, request_id = record.id, "Survey completed");

    let request_id = record.id.to_string();
    let nights = record.nights.to_string();
    let adults = record.adults.to_string();
    let children = record.children.to_string();
    let budget = format_amount(record.budget);
    let text = ctx.i18n.t_args(
        "survey-complete",
        lang,
        &[
            ("request_id", request_id.as_str()),
            ("destination", record.destination.as_str()),
            ("date", record.departure_date.as_str()),
            ("nights", nights.as_str()),
            ("adults", adults.as_str()),
            ("children", children.as_str()),
            ("budget", budget.as_str()),
            ("comment", record.comment.as_deref().unwrap_or_default()),
        ],
    );
    // The request is stored, so the survey is over even if the reply is lost
    if let Err(e) = ctx
        .messenger
        .send_text(event.chat_id, &text, Some(create_main_menu_keyboard(&ctx.i18n, lang)))
        .await
    {
        warn!(
            user_id = event.user_id,
            request_id = record.id,
            error = %e,
            "Failed to send submission confirmation"
        );
    }

    Ok(ConversationState::Idle)
}
