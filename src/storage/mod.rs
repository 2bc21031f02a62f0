//! Storage collaborators - where slices of events come from
//!
//! Every reader returns events sorted by (session, sequence index,
//! timestamp), with missing app ids and sequence indices filled in.

pub mod jsonl_reader;
pub mod memory;
pub mod sqlite_reader;

pub use jsonl_reader::JsonlEventReader;
pub use memory::MemoryStorage;
pub use sqlite_reader::SqliteEventReader;

use crate::models::{Event, IdMode};
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug)]
pub enum StorageError {
    Database(rusqlite::Error),
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Malformed(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Database(e) => write!(f, "Database error: {}", e),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::Serialization(e) => write!(f, "Serialization error: {}", e),
            StorageError::Malformed(msg) => write!(f, "Malformed event: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Row-level filters applied while retrieving a slice
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Keep only these log versions
    pub versions: Option<Vec<String>>,
    pub excluded_events: Vec<String>,
}

impl EventFilter {
    pub fn admits(&self, event: &Event) -> bool {
        if self.excluded_events.iter().any(|name| *name == event.event_name) {
            return false;
        }
        match &self.versions {
            Some(versions) => event
                .log_version
                .as_ref()
                .map(|v| versions.contains(v))
                .unwrap_or(false),
            None => true,
        }
    }
}

/// Whether an event belongs to one of the requested ids
pub fn matches_ids(event: &Event, ids: &[String], mode: IdMode) -> bool {
    match mode {
        IdMode::Session => ids.iter().any(|id| *id == event.session_id),
        IdMode::User => event
            .user_id
            .as_ref()
            .map(|user| ids.contains(user))
            .unwrap_or(false),
    }
}

/// Backend trait for event retrieval
#[async_trait]
pub trait EventStorage: Send {
    /// Every id available for the mode, sorted
    async fn all_ids(&mut self, mode: IdMode) -> Result<Vec<String>, StorageError>;

    /// Events for exactly these ids, ordered by session then sequence index
    async fn events_for_ids(
        &mut self,
        ids: &[String],
        mode: IdMode,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StorageError>;

    /// Get backend type for logging
    fn storage_type(&self) -> &'static str;
}

/// Sort a slice of events and fill positional defaults
///
/// Events without an index keep their timestamp order and are numbered
/// from 1 within each session, counting every event of that session.
pub fn order_events(events: &mut [Event], app_id: &str) {
    events.sort_by(|a, b| {
        a.session_id
            .cmp(&b.session_id)
            .then_with(|| {
                a.event_sequence_index
                    .unwrap_or(i64::MAX)
                    .cmp(&b.event_sequence_index.unwrap_or(i64::MAX))
            })
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });

    let mut positions: HashMap<String, i64> = HashMap::new();
    for event in events.iter_mut() {
        let position = positions.entry(event.session_id.clone()).or_insert(0);
        *position += 1;
        event.fill_defaults(app_id, *position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_event(session: &str, index: Option<i64>, secs: u32) -> Event {
        let mut event = Event::new(session, "", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap(), "e");
        event.event_sequence_index = index;
        event
    }

    #[test]
    fn test_order_events_sorts_and_fills() {
        let mut events = vec![
            make_event("B", None, 9),
            make_event("A", Some(2), 1),
            make_event("B", None, 3),
            make_event("A", Some(0), 5),
        ];
        order_events(&mut events, "GAME");

        let order: Vec<(String, Option<i64>)> = events
            .iter()
            .map(|e| (e.session_id.clone(), e.event_sequence_index))
            .collect();
        assert_eq!(
            order,
            vec![
                ("A".to_string(), Some(0)),
                ("A".to_string(), Some(2)),
                ("B".to_string(), Some(1)),
                ("B".to_string(), Some(2)),
            ]
        );
        assert!(events.iter().all(|e| e.app_id == "GAME"));
        assert_eq!(events[2].timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 3).unwrap());
    }

    #[test]
    fn test_filter_versions_and_exclusions() {
        let filter = EventFilter {
            versions: Some(vec!["3".to_string()]),
            excluded_events: vec!["heartbeat".to_string()],
        };
        let mut event = make_event("A", None, 0);
        assert!(!filter.admits(&event));
        event.log_version = Some("3".to_string());
        assert!(filter.admits(&event));
        event.event_name = "heartbeat".to_string();
        assert!(!filter.admits(&event));
    }

    #[test]
    fn test_matches_ids_by_mode() {
        let mut event = make_event("S1", None, 0);
        let ids = vec!["S1".to_string(), "P7".to_string()];
        assert!(matches_ids(&event, &ids, IdMode::Session));
        assert!(!matches_ids(&event, &ids, IdMode::User));
        event.user_id = Some("P7".to_string());
        assert!(matches_ids(&event, &ids, IdMode::User));
    }
}
