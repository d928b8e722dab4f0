//! Submission store contract.
//!
//! A completed survey becomes an immutable [`SubmissionRecord`] whose id is
//! assigned by the store. Ids grow monotonically and are never handed out
//! twice, even after a deletion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tokio::sync::Mutex;

use crate::errors::StoreError;

/// Fields of a submission before the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    pub user_id: i64,
    pub username: Option<String>,
    pub destination: String,
    pub departure_date: String,
    pub nights: i32,
    pub adults: i32,
    pub children: i32,
    pub budget: i64,
    pub comment: Option<String>,
}

/// A persisted tour request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubmissionRecord {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub destination: String,
    /// `dd.mm.yyyy`
    pub departure_date: String,
    pub nights: i32,
    pub adults: i32,
    pub children: i32,
    pub budget: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Half-open creation time window `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn since(from: DateTime<Utc>) -> Self {
        Self { from, to: None }
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to: Some(to) }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && self.to.is_none_or(|to| at < to)
    }
}

/// Listing filter; results are always newest first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub range: Option<DateRange>,
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn recent(limit: i64) -> Self {
        Self {
            range: None,
            limit: Some(limit),
        }
    }

    pub fn within(range: DateRange) -> Self {
        Self {
            range: Some(range),
            limit: None,
        }
    }
}

/// Counts and sums over a creation time window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmissionAggregate {
    pub count: i64,
    pub budget_sum: i64,
    pub unique_users: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DestinationCount {
    pub destination: String,
    pub count: i64,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Atomically persist a submission, assigning id and creation time
    async fn create(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError>;

    /// `StoreError::NotFound` when the id is unknown
    async fn get(&self, id: i64) -> Result<SubmissionRecord, StoreError>;

    /// Remove a submission and return what was removed
    async fn delete(&self, id: i64) -> Result<SubmissionRecord, StoreError>;

    /// Submissions ordered by creation time, newest first
    async fn list(&self, query: ListQuery) -> Result<Vec<SubmissionRecord>, StoreError>;

    async fn aggregate(&self, range: Option<DateRange>) -> Result<SubmissionAggregate, StoreError>;

    /// Most frequent destinations, most popular first
    async fn top_destinations(
        &self,
        range: Option<DateRange>,
        limit: i64,
    ) -> Result<Vec<DestinationCount>, StoreError>;

    /// Every user id that ever submitted a request
    async fn distinct_user_ids(&self) -> Result<Vec<i64>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i64,
    records: BTreeMap<i64, SubmissionRecord>,
}

/// Non-durable store used by tests and when no database is configured
#[derive(Debug, Default)]
pub struct InMemorySubmissionStore {
    state: Mutex<MemoryState>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn in_range(range: &Option<DateRange>, record: &SubmissionRecord) -> bool {
    range.is_none_or(|range| range.contains(record.created_at))
}

#[async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn create(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.last_id += 1;

        let record = SubmissionRecord {
            id: state.last_id,
            user_id: submission.user_id,
            username: submission.username,
            destination: submission.destination,
            departure_date: submission.departure_date,
            nights: submission.nights,
            adults: submission.adults,
            children: submission.children,
            budget: submission.budget,
            comment: submission.comment,
            created_at: Utc::now(),
        };
        state.records.insert(record.id, record.clone());

        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<SubmissionRecord, StoreError> {
        let state = self.state.lock().await;
        state.records.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn delete(&self, id: i64) -> Result<SubmissionRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.records.remove(&id).ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, query: ListQuery) -> Result<Vec<SubmissionRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut records: Vec<SubmissionRecord> = state
            .records
            .values()
            .filter(|record| in_range(&query.range, record))
            .cloned()
            .collect();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = query.limit {
            records.truncate(usize::try_from(limit).unwrap_or(0));
        }

        Ok(records)
    }

    async fn aggregate(&self, range: Option<DateRange>) -> Result<SubmissionAggregate, StoreError> {
        let state = self.state.lock().await;
        let mut aggregate = SubmissionAggregate::default();
        let mut users = HashSet::new();

        for record in state.records.values().filter(|record| in_range(&range, record)) {
            aggregate.count += 1;
            aggregate.budget_sum += record.budget;
            users.insert(record.user_id);
        }
        aggregate.unique_users = users.len() as i64;

        Ok(aggregate)
    }

    async fn top_destinations(
        &self,
        range: Option<DateRange>,
        limit: i64,
    ) -> Result<Vec<DestinationCount>, StoreError> {
        let state = self.state.lock().await;
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for record in state.records.values().filter(|record| in_range(&range, record)) {
            *counts.entry(record.destination.as_str()).or_default() += 1;
        }

        let mut top: Vec<DestinationCount> = counts
            .into_iter()
            .map(|(destination, count)| DestinationCount {
                destination: destination.to_string(),
                count,
            })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.destination.cmp(&b.destination)));
        top.truncate(usize::try_from(limit).unwrap_or(0));

        Ok(top)
    }

    async fn distinct_user_ids(&self) -> Result<Vec<i64>, StoreError> {
        let state = self.state.lock().await;
        let users: BTreeSet<i64> = state.records.values().map(|record| record.user_id).collect();
        Ok(users.into_iter().collect())
    }
}
