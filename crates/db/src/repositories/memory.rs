use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use super::{EventRecord, EventUpdate, IdempotencyRepository, RepositoryError};

/// Process-local ledger for tests and for running without a database file.
#[derive(Default)]
pub struct InMemoryIdempotencyRepository {
    events: RwLock<HashMap<String, EventRecord>>,
}

#[async_trait::async_trait]
impl IdempotencyRepository for InMemoryIdempotencyRepository {
    async fn try_claim_event(
        &self,
        event_id: &str,
        ttl_secs: u64,
    ) -> Result<bool, RepositoryError> {
        let now = Utc::now();
        let mut events = self.events.write().await;
        if events.get(event_id).is_some_and(|record| record.expires_at > now) {
            return Ok(false);
        }
        events.insert(event_id.to_string(), EventRecord::claimed(event_id, now, ttl_secs));
        Ok(true)
    }

    async fn update_state(
        &self,
        event_id: &str,
        update: EventUpdate,
    ) -> Result<(), RepositoryError> {
        let mut events = self.events.write().await;
        if let Some(record) = events.get_mut(event_id) {
            record.apply(update, Utc::now());
        }
        Ok(())
    }

    async fn get_state(&self, event_id: &str) -> Result<Option<EventRecord>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.get(event_id).cloned())
    }
}
