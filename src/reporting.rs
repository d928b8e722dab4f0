//! # Administrative Reporting
//!
//! Operator-only queries and maintenance over the submission store. Every
//! operation takes the caller's Telegram id and fails with
//! [`AdminError::AccessDenied`] for anyone but the configured operator.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use teloxide::types::ChatId;
use tracing::{info, warn};

use crate::errors::AdminError;
use crate::export::{build_csv, ExportFile};
use crate::messenger::Messenger;
use crate::store::{DateRange, DestinationCount, ListQuery, SubmissionAggregate, SubmissionRecord, SubmissionStore};

pub const RECENT_LIMIT: i64 = 10;
pub const TOP_DESTINATIONS_LIMIT: i64 = 5;
const BROADCAST_PAUSE: std::time::Duration = std::time::Duration::from_millis(50);

/// Figures shown by `/stats`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReport {
    pub overall: SubmissionAggregate,
    /// Requests since local midnight
    pub today: i64,
    pub last_week: i64,
    pub last_month: i64,
    pub top_destinations: Vec<DestinationCount>,
}

impl StatsReport {
    /// Integer average budget, zero when there are no requests
    pub fn average_budget(&self) -> i64 {
        if self.overall.count == 0 {
            0
        } else {
            self.overall.budget_sum / self.overall.count
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastTally {
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
}

/// Start of a calendar day in the server's time zone
fn local_midnight(day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Midnight skipped by a DST jump; UTC midnight is close enough
        None => naive.and_utc(),
    }
}

/// Creation-time window covering one local calendar day
pub fn local_day_range(day: NaiveDate) -> DateRange {
    let next = day.succ_opt().unwrap_or(day);
    DateRange::between(local_midnight(day), local_midnight(next))
}

pub fn local_today(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Local).date_naive()
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn SubmissionStore>,
    operator_id: i64,
}

impl AdminService {
    pub fn new(store: Arc<dyn SubmissionStore>, operator_id: i64) -> Self {
        Self { store, operator_id }
    }

    pub fn operator_id(&self) -> i64 {
        self.operator_id
    }

    pub fn is_operator(&self, caller: i64) -> bool {
        caller == self.operator_id
    }

    pub fn authorize(&self, caller: i64) -> Result<(), AdminError> {
        if self.is_operator(caller) {
            Ok(())
        } else {
            warn!(user_id = caller, "Rejected admin command from non-operator");
            Err(AdminError::AccessDenied(caller))
        }
    }

    pub async fn stats(&self, caller: i64, now: DateTime<Utc>) -> Result<StatsReport, AdminError> {
        self.authorize(caller)?;

        let overall = self.store.aggregate(None).await?;
        let today = self
            .store
            .aggregate(Some(DateRange::since(local_midnight(local_today(now)))))
            .await?;
        let last_week = self.store.aggregate(Some(DateRange::since(now - Duration::days(7)))).await?;
        let last_month = self.store.aggregate(Some(DateRange::since(now - Duration::days(30)))).await?;
        let top_destinations = self.store.top_destinations(None, TOP_DESTINATIONS_LIMIT).await?;

        Ok(StatsReport {
            overall,
            today: today.count,
            last_week: last_week.count,
            last_month: last_month.count,
            top_destinations,
        })
    }

    /// The most recent requests, newest first
    pub async fn recent(&self, caller: i64) -> Result<Vec<SubmissionRecord>, AdminError> {
        self.authorize(caller)?;
        Ok(self.store.list(ListQuery::recent(RECENT_LIMIT)).await?)
    }

    /// All requests created on a local calendar day
    pub async fn for_day(&self, caller: i64, day: NaiveDate) -> Result<Vec<SubmissionRecord>, AdminError> {
        self.authorize(caller)?;
        Ok(self.store.list(ListQuery::within(local_day_range(day))).await?)
    }

    pub async fn lookup(&self, caller: i64, id: i64) -> Result<SubmissionRecord, AdminError> {
        self.authorize(caller)?;
        Ok(self.store.get(id).await?)
    }

    pub async fn delete(&self, caller: i64, id: i64) -> Result<SubmissionRecord, AdminError> {
        self.authorize(caller)?;
        let record = self.store.delete(id).await?;
        info!(request_id = id, operator_id = caller, "Request deleted by operator");
        Ok(record)
    }

    /// Every request as a CSV document, `None` when the store is empty
    pub async fn export(&self, caller: i64, now: DateTime<Utc>) -> Result<Option<ExportFile>, AdminError> {
        self.authorize(caller)?;
        let records = self.store.list(ListQuery::all()).await?;
        if records.is_empty() {
            return Ok(None);
        }
        let file = build_csv(&records, now)?;
        info!(count = file.count, filename = %file.filename, "Export generated");
        Ok(Some(file))
    }

    /// Users who ever submitted a request
    pub async fn broadcast_recipients(&self, caller: i64) -> Result<Vec<i64>, AdminError> {
        self.authorize(caller)?;
        Ok(self.store.distinct_user_ids().await?)
    }

    /// Send `text` to each recipient, counting failures without stopping
    pub async fn broadcast(
        &self,
        caller: i64,
        messenger: &dyn Messenger,
        recipients: &[i64],
        text: &str,
    ) -> Result<BroadcastTally, AdminError> {
        self.authorize(caller)?;
        let mut tally = BroadcastTally {
            total: recipients.len(),
            ..BroadcastTally::default()
        };

        for (i, user_id) in recipients.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(BROADCAST_PAUSE).await;
            }
            match messenger.send_text(ChatId(*user_id), text, None).await {
                Ok(_) => tally.succeeded += 1,
                Err(e) => {
                    warn!(user_id, error = %e, "Broadcast delivery failed");
                    tally.failed += 1;
                }
            }
        }

        info!(
            succeeded = tally.succeeded,
            failed = tally.failed,
            total = tally.total,
            "Broadcast finished"
        );
        Ok(tally)
    }
}
