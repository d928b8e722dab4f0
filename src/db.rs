use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::store::{
    DateRange, DestinationCount, ListQuery, NewSubmission, SubmissionAggregate, SubmissionRecord,
    SubmissionStore,
};

const RECORD_COLUMNS: &str = "id, user_id, username, destination, departure_date, nights, adults, \
                              children, budget, comment, created_at";

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    // BIGSERIAL ids come from a sequence, so deleted ids are never handed out again
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS requests (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            username VARCHAR(100),
            destination VARCHAR(200) NOT NULL,
            departure_date VARCHAR(20) NOT NULL,
            nights INTEGER NOT NULL,
            adults INTEGER NOT NULL,
            children INTEGER NOT NULL,
            budget BIGINT NOT NULL,
            comment TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create requests table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_created_at ON requests (created_at DESC)")
        .execute(pool)
        .await
        .context("Failed to create created_at index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_user_id ON requests (user_id)")
        .execute(pool)
        .await
        .context("Failed to create user_id index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// PostgreSQL-backed submission store
#[derive(Clone)]
pub struct PgSubmissionStore {
    pool: PgPool,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn range_bounds(range: Option<DateRange>) -> (Option<chrono::DateTime<chrono::Utc>>, Option<chrono::DateTime<chrono::Utc>>) {
    match range {
        Some(range) => (Some(range.from), range.to),
        None => (None, None),
    }
}

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    async fn create(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError> {
        debug!(user_id = submission.user_id, "Creating new request");

        let record = sqlx::query_as::<_, SubmissionRecord>(&format!(
            "INSERT INTO requests (user_id, username, destination, departure_date, nights, adults, children, budget, comment)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(submission.user_id)
        .bind(&submission.username)
        .bind(&submission.destination)
        .bind(&submission.departure_date)
        .bind(submission.nights)
        .bind(submission.adults)
        .bind(submission.children)
        .bind(submission.budget)
        .bind(&submission.comment)
        .fetch_one(&self.pool)
        .await?;

        info!(request_id = record.id, user_id = record.user_id, "Request created");
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<SubmissionRecord, StoreError> {
        debug!(request_id = id, "Reading request");

        sqlx::query_as::<_, SubmissionRecord>(&format!("SELECT {RECORD_COLUMNS} FROM requests WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn delete(&self, id: i64) -> Result<SubmissionRecord, StoreError> {
        info!(request_id = id, "Deleting request");

        sqlx::query_as::<_, SubmissionRecord>(&format!(
            "DELETE FROM requests WHERE id = $1 RETURNING {RECORD_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, query: ListQuery) -> Result<Vec<SubmissionRecord>, StoreError> {
        let (from, to) = range_bounds(query.range);

        // LIMIT NULL means no limit in PostgreSQL
        let records = sqlx::query_as::<_, SubmissionRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM requests
             WHERE ($1::timestamptz IS NULL OR created_at >= $1)
               AND ($2::timestamptz IS NULL OR created_at < $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3"
        ))
        .bind(from)
        .bind(to)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn aggregate(&self, range: Option<DateRange>) -> Result<SubmissionAggregate, StoreError> {
        let (from, to) = range_bounds(range);

        let (count, budget_sum, unique_users): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(budget), 0)::BIGINT, COUNT(DISTINCT user_id)
             FROM requests
             WHERE ($1::timestamptz IS NULL OR created_at >= $1)
               AND ($2::timestamptz IS NULL OR created_at < $2)",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(SubmissionAggregate {
            count,
            budget_sum,
            unique_users,
        })
    }

    async fn top_destinations(
        &self,
        range: Option<DateRange>,
        limit: i64,
    ) -> Result<Vec<DestinationCount>, StoreError> {
        let (from, to) = range_bounds(range);

        let top = sqlx::query_as::<_, DestinationCount>(
            "SELECT destination, COUNT(*) AS count
             FROM requests
             WHERE ($1::timestamptz IS NULL OR created_at >= $1)
               AND ($2::timestamptz IS NULL OR created_at < $2)
             GROUP BY destination
             ORDER BY count DESC, destination ASC
             LIMIT $3",
        )
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(top)
    }

    async fn distinct_user_ids(&self) -> Result<Vec<i64>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT DISTINCT user_id FROM requests ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
