//! Admin Handler module for operator commands
//!
//! Commands are parsed for every user; authorization happens in
//! [`AdminService`](crate::reporting::AdminService) so a non-operator gets
//! the access-denied reply rather than silence.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info};

use crate::dialogue::ConversationState;
use crate::errors::AdminError;
use crate::export::format_created_at;
use crate::reporting::{local_today, StatsReport};
use crate::store::SubmissionRecord;
use crate::validation::DATE_FORMAT;

use super::ui_builder::{chunk_blocks, format_amount};
use super::{BotContext, InboundEvent};

/// Telegram rejects messages longer than 4096 characters
const MESSAGE_LIMIT: usize = 4000;

lazy_static! {
    // `/name`, `/name@botname`, optional argument text
    static ref COMMAND_PATTERN: Regex =
        Regex::new(r"(?s)^/([A-Za-z_]+)(?:@\w+)?(?:\s+(.*))?$").expect("Invalid command regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Menu,
    Help,
    Stats,
    Requests,
    Today(Option<String>),
    Search(Option<String>),
    Delete(Option<String>),
    Export,
    Broadcast(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Cancel,
    Admin(AdminCommand),
    Unknown(String),
}

/// Parse a slash command; `None` for ordinary text
pub fn parse_command(text: &str) -> Option<Command> {
    let captures = COMMAND_PATTERN.captures(text.trim())?;
    let name = captures.get(1)?.as_str().to_ascii_lowercase();
    let argument = captures
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|arg| !arg.is_empty());

    let command = match name.as_str() {
        "start" => Command::Start,
        "cancel" => Command::Cancel,
        "admin" => Command::Admin(AdminCommand::Menu),
        "help_admin" => Command::Admin(AdminCommand::Help),
        "stats" => Command::Admin(AdminCommand::Stats),
        "requests" => Command::Admin(AdminCommand::Requests),
        "today" => Command::Admin(AdminCommand::Today(argument)),
        "search" => Command::Admin(AdminCommand::Search(argument)),
        "delete" => Command::Admin(AdminCommand::Delete(argument)),
        "export" => Command::Admin(AdminCommand::Export),
        "broadcast" => Command::Admin(AdminCommand::Broadcast(argument)),
        _ => Command::Unknown(name),
    };
    Some(command)
}

fn parse_request_id(argument: Option<&str>) -> Option<i64> {
    argument?.trim_start_matches('#').parse::<i64>().ok().filter(|id| *id > 0)
}

async fn reply(ctx: &BotContext, event: &InboundEvent, text: &str) -> Result<()> {
    ctx.messenger.send_text(event.chat_id, text, None).await?;
    Ok(())
}

async fn reply_key(ctx: &BotContext, event: &InboundEvent, key: &str) -> Result<()> {
    reply(ctx, event, &ctx.i18n.t(key, event.language())).await
}

/// Render an admin failure for the caller
async fn reply_error(ctx: &BotContext, event: &InboundEvent, err: AdminError) -> Result<()> {
    let lang = event.language();
    match err {
        AdminError::AccessDenied(_) => reply_key(ctx, event, "access-denied").await,
        AdminError::NotFound(id) => {
            let id = id.to_string();
            reply(ctx, event, &ctx.i18n.t_args("admin-not-found", lang, &[("request_id", id.as_str())])).await
        }
        other => {
            error!(user_id = event.user_id, error = %other, "Admin command failed");
            reply_key(ctx, event, "admin-error").await
        }
    }
}

/// Execute an operator command, returning a new conversation state when it changes
pub async fn handle_admin_command(
    ctx: &BotContext,
    event: &InboundEvent,
    command: AdminCommand,
) -> Result<Option<ConversationState>> {
    info!(user_id = event.user_id, command = ?command, "Admin command received");

    let outcome = match command {
        AdminCommand::Menu => show_menu(ctx, event, "admin-menu").await,
        AdminCommand::Help => show_menu(ctx, event, "admin-help").await,
        AdminCommand::Stats => show_stats(ctx, event).await,
        AdminCommand::Requests => show_recent(ctx, event).await,
        AdminCommand::Today(argument) => show_day(ctx, event, argument.as_deref()).await,
        AdminCommand::Search(argument) => search(ctx, event, argument.as_deref()).await,
        AdminCommand::Delete(argument) => delete(ctx, event, argument.as_deref()).await,
        AdminCommand::Export => export(ctx, event).await,
        AdminCommand::Broadcast(Some(text)) => broadcast(ctx, event, &text).await.map(|_| None),
        AdminCommand::Broadcast(None) => match ctx.admin.authorize(event.user_id) {
            Ok(()) => {
                reply_key(ctx, event, "admin-broadcast-prompt").await?;
                return Ok(Some(ConversationState::AwaitingBroadcast));
            }
            Err(e) => Err(e),
        },
    };

    match outcome {
        Ok(next) => Ok(next),
        Err(err) => {
            reply_error(ctx, event, err).await?;
            Ok(None)
        }
    }
}

/// Broadcast the text received while awaiting a broadcast message
pub async fn run_broadcast(ctx: &BotContext, event: &InboundEvent, text: &str) -> Result<()> {
    if let Err(err) = broadcast(ctx, event, text).await {
        reply_error(ctx, event, err).await?;
    }
    Ok(())
}

type AdminOutcome = std::result::Result<Option<ConversationState>, AdminError>;

async fn show_menu(ctx: &BotContext, event: &InboundEvent, key: &str) -> AdminOutcome {
    ctx.admin.authorize(event.user_id)?;
    let operator_id = ctx.admin.operator_id().to_string();
    let text = ctx
        .i18n
        .t_args(key, event.language(), &[("operator_id", operator_id.as_str())]);
    send(ctx, event, &text).await?;
    Ok(None)
}

async fn send(ctx: &BotContext, event: &InboundEvent, text: &str) -> std::result::Result<(), AdminError> {
    ctx.messenger
        .send_text(event.chat_id, text, None)
        .await
        .map(|_| ())
        .map_err(|e| AdminError::Reply(e.to_string()))
}

async fn send_blocks(ctx: &BotContext, event: &InboundEvent, blocks: &[String]) -> std::result::Result<(), AdminError> {
    for chunk in chunk_blocks(blocks, MESSAGE_LIMIT) {
        send(ctx, event, &chunk).await?;
    }
    Ok(())
}

pub fn format_stats(ctx: &BotContext, language: &str, report: &StatsReport) -> String {
    let total = report.overall.count.to_string();
    let unique_users = report.overall.unique_users.to_string();
    let total_budget = format_amount(report.overall.budget_sum);
    let average_budget = format_amount(report.average_budget());
    let today = report.today.to_string();
    let week = report.last_week.to_string();
    let month = report.last_month.to_string();

    let mut text = ctx.i18n.t_args(
        "admin-stats",
        language,
        &[
            ("total", total.as_str()),
            ("unique_users", unique_users.as_str()),
            ("total_budget", total_budget.as_str()),
            ("average_budget", average_budget.as_str()),
            ("today", today.as_str()),
            ("week", week.as_str()),
            ("month", month.as_str()),
        ],
    );

    if report.top_destinations.is_empty() {
        text.push('\n');
        text.push_str(&ctx.i18n.t("admin-stats-no-destinations", language));
    }
    for (i, entry) in report.top_destinations.iter().enumerate() {
        let position = (i + 1).to_string();
        let count = entry.count.to_string();
        text.push('\n');
        text.push_str(&ctx.i18n.t_args(
            "admin-stats-destination",
            language,
            &[
                ("position", position.as_str()),
                ("destination", entry.destination.as_str()),
                ("count", count.as_str()),
            ],
        ));
    }
    text
}

async fn show_stats(ctx: &BotContext, event: &InboundEvent) -> AdminOutcome {
    let report = ctx.admin.stats(event.user_id, Utc::now()).await?;
    send(ctx, event, &format_stats(ctx, event.language(), &report)).await?;
    Ok(None)
}

fn format_request_line(ctx: &BotContext, language: &str, record: &SubmissionRecord) -> String {
    let request_id = record.id.to_string();
    let nights = record.nights.to_string();
    let adults = record.adults.to_string();
    let children = record.children.to_string();
    let budget = format_amount(record.budget);
    let created_at = format_created_at(record.created_at);
    ctx.i18n.t_args(
        "admin-request-line",
        language,
        &[
            ("request_id", request_id.as_str()),
            ("username", record.username.as_deref().unwrap_or("N/A")),
            ("destination", record.destination.as_str()),
            ("date", record.departure_date.as_str()),
            ("nights", nights.as_str()),
            ("adults", adults.as_str()),
            ("children", children.as_str()),
            ("budget", budget.as_str()),
            ("created_at", created_at.as_str()),
        ],
    )
}

pub fn format_request_details(ctx: &BotContext, language: &str, record: &SubmissionRecord) -> String {
    let request_id = record.id.to_string();
    let user_id = record.user_id.to_string();
    let nights = record.nights.to_string();
    let adults = record.adults.to_string();
    let children = record.children.to_string();
    let budget = format_amount(record.budget);
    let created_at = format_created_at(record.created_at);
    ctx.i18n.t_args(
        "admin-request-details",
        language,
        &[
            ("request_id", request_id.as_str()),
            ("user_id", user_id.as_str()),
            ("username", record.username.as_deref().unwrap_or("N/A")),
            ("destination", record.destination.as_str()),
            ("date", record.departure_date.as_str()),
            ("nights", nights.as_str()),
            ("adults", adults.as_str()),
            ("children", children.as_str()),
            ("budget", budget.as_str()),
            ("comment", record.comment.as_deref().unwrap_or("-")),
            ("created_at", created_at.as_str()),
        ],
    )
}

async fn show_recent(ctx: &BotContext, event: &InboundEvent) -> AdminOutcome {
    let lang = event.language();
    let records = ctx.admin.recent(event.user_id).await?;
    if records.is_empty() {
        send(ctx, event, &ctx.i18n.t("admin-no-requests", lang)).await?;
        return Ok(None);
    }

    let count = records.len().to_string();
    let mut blocks = vec![ctx.i18n.t_args("admin-recent-title", lang, &[("count", count.as_str())])];
    blocks.extend(records.iter().map(|record| format_request_line(ctx, lang, record)));
    send_blocks(ctx, event, &blocks).await?;
    Ok(None)
}

async fn show_day(ctx: &BotContext, event: &InboundEvent, argument: Option<&str>) -> AdminOutcome {
    let lang = event.language();
    ctx.admin.authorize(event.user_id)?;

    let day = match argument {
        None => local_today(Utc::now()),
        Some(raw) => match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            Ok(day) => day,
            Err(_) => {
                send(ctx, event, &ctx.i18n.t("admin-today-usage", lang)).await?;
                return Ok(None);
            }
        },
    };
    let date = day.format(DATE_FORMAT).to_string();

    let records = ctx.admin.for_day(event.user_id, day).await?;
    if records.is_empty() {
        send(ctx, event, &ctx.i18n.t_args("admin-no-requests-day", lang, &[("date", date.as_str())])).await?;
        return Ok(None);
    }

    let count = records.len().to_string();
    let mut blocks = vec![ctx
        .i18n
        .t_args("admin-day-title", lang, &[("date", date.as_str()), ("count", count.as_str())])];
    blocks.extend(records.iter().map(|record| format_request_line(ctx, lang, record)));
    send_blocks(ctx, event, &blocks).await?;
    Ok(None)
}

async fn search(ctx: &BotContext, event: &InboundEvent, argument: Option<&str>) -> AdminOutcome {
    let lang = event.language();
    ctx.admin.authorize(event.user_id)?;

    let Some(id) = parse_request_id(argument) else {
        send(ctx, event, &ctx.i18n.t("admin-search-usage", lang)).await?;
        return Ok(None);
    };

    let record = ctx.admin.lookup(event.user_id, id).await?;
    send(ctx, event, &format_request_details(ctx, lang, &record)).await?;
    Ok(None)
}

async fn delete(ctx: &BotContext, event: &InboundEvent, argument: Option<&str>) -> AdminOutcome {
    let lang = event.language();
    ctx.admin.authorize(event.user_id)?;

    let Some(id) = parse_request_id(argument) else {
        send(ctx, event, &ctx.i18n.t("admin-delete-usage", lang)).await?;
        return Ok(None);
    };

    let record = ctx.admin.delete(event.user_id, id).await?;
    let request_id = record.id.to_string();
    let text = ctx.i18n.t_args(
        "admin-deleted",
        lang,
        &[
            ("request_id", request_id.as_str()),
            ("destination", record.destination.as_str()),
            ("username", record.username.as_deref().unwrap_or("N/A")),
        ],
    );
    send(ctx, event, &text).await?;
    Ok(None)
}

async fn export(ctx: &BotContext, event: &InboundEvent) -> AdminOutcome {
    let lang = event.language();
    let Some(file) = ctx.admin.export(event.user_id, Utc::now()).await? else {
        send(ctx, event, &ctx.i18n.t("admin-export-empty", lang)).await?;
        return Ok(None);
    };

    let count = file.count.to_string();
    let caption = ctx.i18n.t_args("admin-export-caption", lang, &[("count", count.as_str())]);
    ctx.messenger
        .send_document(event.chat_id, file.bytes, &file.filename, &caption)
        .await
        .map_err(|e| AdminError::Export(format!("failed to send {}: {e}", file.filename)))?;
    Ok(None)
}

async fn broadcast(ctx: &BotContext, event: &InboundEvent, text: &str) -> std::result::Result<(), AdminError> {
    let lang = event.language();
    let recipients = ctx.admin.broadcast_recipients(event.user_id).await?;
    if recipients.is_empty() {
        send(ctx, event, &ctx.i18n.t("admin-broadcast-no-users", lang)).await?;
        return Ok(());
    }

    let total = recipients.len().to_string();
    send(ctx, event, &ctx.i18n.t_args("admin-broadcast-started", lang, &[("total", total.as_str())])).await?;

    let tally = ctx
        .admin
        .broadcast(event.user_id, ctx.messenger.as_ref(), &recipients, text)
        .await?;
    let succeeded = tally.succeeded.to_string();
    let failed = tally.failed.to_string();
    let total = tally.total.to_string();
    send(
        ctx,
        event,
        &ctx.i18n.t_args(
            "admin-broadcast-done",
            lang,
            &[
                ("succeeded", succeeded.as_str()),
                ("failed", failed.as_str()),
                ("total", total.as_str()),
            ],
        ),
    )
    .await
}
