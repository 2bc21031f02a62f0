use super::Processor;
use crate::models::{Event, ExportRow, FeatureValue};
use crate::registry::ExtractorRegistry;
use chrono::{DateTime, Utc};

/// Generator state for one session of one player
pub struct SessionProcessor {
    player_id: String,
    session_id: String,
    registry: ExtractorRegistry,
    last_index: Option<i64>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl SessionProcessor {
    pub fn new(player_id: &str, session_id: &str, registry: ExtractorRegistry) -> Self {
        Self {
            player_id: player_id.to_string(),
            session_id: session_id.to_string(),
            registry,
            last_index: None,
            last_timestamp: None,
        }
    }

    pub fn owner(&self) -> &str {
        &self.player_id
    }
}

impl Processor for SessionProcessor {
    fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    fn registry_mut(&mut self) -> &mut ExtractorRegistry {
        &mut self.registry
    }

    fn identity_columns(&self) -> Vec<String> {
        vec!["PlayerID".to_string(), "SessionID".to_string()]
    }

    fn identity_values(&self) -> ExportRow {
        vec![
            FeatureValue::from(self.player_id.as_str()),
            FeatureValue::from(self.session_id.as_str()),
        ]
    }

    /// Warn on out-of-sequence events; they are still processed as delivered
    fn observe(&mut self, event: &Event) {
        // Generated events reuse their trigger's index and timestamp
        if event.is_generated() {
            return;
        }
        if let (Some(last), Some(index)) = (self.last_index, event.event_sequence_index) {
            if index < last {
                log::warn!(
                    "⚠️  Session {} event {} has index {} after index {}",
                    self.session_id,
                    event.event_name,
                    index,
                    last
                );
            }
        } else if let Some(last) = self.last_timestamp {
            if event.timestamp < last {
                log::warn!(
                    "⚠️  Session {} event {} is timestamped before its predecessor",
                    self.session_id,
                    event.event_name
                );
            }
        }
        self.last_index = event.event_sequence_index.or(self.last_index);
        self.last_timestamp = Some(event.timestamp);
    }

    fn player_id(&self) -> Option<&str> {
        Some(&self.player_id)
    }

    fn session_id(&self) -> Option<&str> {
        Some(&self.session_id)
    }
}
