use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use super::{expiry, EventRecord, EventState, EventUpdate, IdempotencyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlIdempotencyRepository {
    pool: DbPool,
}

impl SqlIdempotencyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn claim_at(
        &self,
        event_id: &str,
        ttl_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let timestamp = now.to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO slack_event (
                event_id,
                status,
                processing_message_ts,
                last_error,
                created_at,
                updated_at,
                expires_at
             ) VALUES (?, ?, NULL, NULL, ?, ?, ?)
             ON CONFLICT(event_id) DO UPDATE SET
                status = excluded.status,
                processing_message_ts = NULL,
                last_error = NULL,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at
             WHERE slack_event.expires_at <= ?",
        )
        .bind(event_id)
        .bind(EventState::Received.as_str())
        .bind(&timestamp)
        .bind(&timestamp)
        .bind(expiry(now, ttl_secs).timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait::async_trait]
impl IdempotencyRepository for SqlIdempotencyRepository {
    async fn try_claim_event(
        &self,
        event_id: &str,
        ttl_secs: u64,
    ) -> Result<bool, RepositoryError> {
        self.claim_at(event_id, ttl_secs, Utc::now()).await
    }

    async fn update_state(
        &self,
        event_id: &str,
        update: EventUpdate,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE slack_event SET
                status = COALESCE(?, status),
                processing_message_ts = COALESCE(?, processing_message_ts),
                last_error = COALESCE(?, last_error),
                updated_at = ?
             WHERE event_id = ?",
        )
        .bind(update.status.map(|status| status.as_str()))
        .bind(update.processing_message_ts)
        .bind(update.last_error)
        .bind(Utc::now().to_rfc3339())
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_state(&self, event_id: &str) -> Result<Option<EventRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                event_id,
                status,
                processing_message_ts,
                last_error,
                created_at,
                updated_at,
                expires_at
             FROM slack_event
             WHERE event_id = ?",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }
}

fn record_from_row(row: SqliteRow) -> Result<EventRecord, RepositoryError> {
    let status: String = row.try_get("status")?;
    let expires_at: i64 = row.try_get("expires_at")?;

    Ok(EventRecord {
        event_id: row.try_get("event_id")?,
        status: status.parse()?,
        processing_message_ts: row.try_get("processing_message_ts")?,
        last_error: row.try_get("last_error")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
        expires_at: DateTime::<Utc>::from_timestamp(expires_at, 0).ok_or_else(|| {
            RepositoryError::Decode(format!("expires_at out of range: {expires_at}"))
        })?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{value}`: {error}")))
}
