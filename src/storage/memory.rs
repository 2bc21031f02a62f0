//! In-memory event storage for tests and embedding

use super::{matches_ids, order_events, EventFilter, EventStorage, StorageError};
use crate::models::{Event, IdMode};
use async_trait::async_trait;
use std::collections::BTreeSet;

pub struct MemoryStorage {
    app_id: String,
    events: Vec<Event>,
    requests: usize,
}

impl MemoryStorage {
    pub fn new(app_id: &str, events: Vec<Event>) -> Self {
        Self {
            app_id: app_id.to_string(),
            events,
            requests: 0,
        }
    }

    /// Number of `events_for_ids` calls served, one per slice
    pub fn requests(&self) -> usize {
        self.requests
    }
}

#[async_trait]
impl EventStorage for MemoryStorage {
    async fn all_ids(&mut self, mode: IdMode) -> Result<Vec<String>, StorageError> {
        let ids: BTreeSet<String> = self
            .events
            .iter()
            .filter_map(|e| match mode {
                IdMode::Session => Some(e.session_id.clone()),
                IdMode::User => e.user_id.clone(),
            })
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn events_for_ids(
        &mut self,
        ids: &[String],
        mode: IdMode,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StorageError> {
        self.requests += 1;
        let mut events: Vec<Event> = self
            .events
            .iter()
            .filter(|e| matches_ids(e, ids, mode) && filter.admits(e))
            .cloned()
            .collect();
        order_events(&mut events, &self.app_id);
        Ok(events)
    }

    fn storage_type(&self) -> &'static str {
        "Memory"
    }
}
