use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub mod event;
pub mod memory;

pub use event::SqlIdempotencyRepository;
pub use memory::InMemoryIdempotencyRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Lifecycle of one Slack event id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventState {
    Received,
    Processing,
    Done,
    Failed,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Processing => "PROCESSING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for EventState {
    type Err = RepositoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "RECEIVED" => Ok(Self::Received),
            "PROCESSING" => Ok(Self::Processing),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            other => Err(RepositoryError::Decode(format!("unknown event state `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub event_id: String,
    pub status: EventState,
    pub processing_message_ts: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EventRecord {
    fn claimed(event_id: &str, now: DateTime<Utc>, ttl_secs: u64) -> Self {
        Self {
            event_id: event_id.to_string(),
            status: EventState::Received,
            processing_message_ts: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            expires_at: expiry(now, ttl_secs),
        }
    }

    fn apply(&mut self, update: EventUpdate, now: DateTime<Utc>) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(ts) = update.processing_message_ts {
            self.processing_message_ts = Some(ts);
        }
        if let Some(error) = update.last_error {
            self.last_error = Some(error);
        }
        self.updated_at = now;
    }
}

/// Partial update; `None` fields keep their stored value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventUpdate {
    pub status: Option<EventState>,
    pub processing_message_ts: Option<String>,
    pub last_error: Option<String>,
}

impl EventUpdate {
    pub fn status(status: EventState) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    pub fn processing_message(ts: impl Into<String>) -> Self {
        Self { processing_message_ts: Some(ts.into()), ..Self::default() }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { status: Some(EventState::Failed), last_error: Some(error.into()), ..Self::default() }
    }
}

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// `true` when this caller now owns the event id. An id whose claim has
    /// expired can be claimed again.
    async fn try_claim_event(&self, event_id: &str, ttl_secs: u64)
        -> Result<bool, RepositoryError>;

    /// Updating an unknown id is a no-op.
    async fn update_state(&self, event_id: &str, update: EventUpdate)
        -> Result<(), RepositoryError>;

    async fn get_state(&self, event_id: &str) -> Result<Option<EventRecord>, RepositoryError>;

    async fn is_done(&self, event_id: &str) -> Result<(bool, Option<EventRecord>), RepositoryError> {
        let record = self.get_state(event_id).await?;
        let done = record.as_ref().is_some_and(|record| record.status == EventState::Done);
        Ok((done, record))
    }
}

fn expiry(now: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
    now.checked_add_signed(chrono::Duration::seconds(ttl.min(i64::MAX / 1_000)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
