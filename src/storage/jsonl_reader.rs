//! JSONL event reader - one serialized event per line
//!
//! The file is streamed once per slice; only events of the requested ids
//! are kept in memory.

use super::{matches_ids, order_events, EventFilter, EventStorage, StorageError};
use crate::models::{Event, IdMode};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct JsonlEventReader {
    path: PathBuf,
    app_id: String,
    fail_fast: bool,
}

impl JsonlEventReader {
    pub fn new(path: impl Into<PathBuf>, app_id: &str, fail_fast: bool) -> Self {
        Self {
            path: path.into(),
            app_id: app_id.to_string(),
            fail_fast,
        }
    }

    /// Parse every well-formed line, passing each event to `keep`
    async fn scan<F>(&self, mut keep: F) -> Result<(), StorageError>
    where
        F: FnMut(Event) + Send,
    {
        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match Event::from_jsonl(&line) {
                Ok(event) => keep(event),
                Err(e) if self.fail_fast => {
                    return Err(StorageError::Malformed(format!(
                        "{}:{}: {}",
                        self.path.display(),
                        line_no,
                        e
                    )))
                }
                Err(e) => log::warn!("⚠️  Skipping line {} of {}: {}", line_no, self.path.display(), e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventStorage for JsonlEventReader {
    async fn all_ids(&mut self, mode: IdMode) -> Result<Vec<String>, StorageError> {
        let mut ids = BTreeSet::new();
        self.scan(|event| {
            let id = match mode {
                IdMode::Session => Some(event.session_id),
                IdMode::User => event.user_id,
            };
            if let Some(id) = id {
                ids.insert(id);
            }
        })
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn events_for_ids(
        &mut self,
        ids: &[String],
        mode: IdMode,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StorageError> {
        let mut events = Vec::new();
        self.scan(|event| {
            if matches_ids(&event, ids, mode) && filter.admits(&event) {
                events.push(event);
            }
        })
        .await?;
        order_events(&mut events, &self.app_id);
        Ok(events)
    }

    fn storage_type(&self) -> &'static str {
        "JSONL"
    }
}
