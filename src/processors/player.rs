use super::Processor;
use crate::models::{Event, ExportRow, FeatureValue};
use crate::registry::ExtractorRegistry;
use std::collections::HashSet;

/// Generator state for one player across all their sessions
pub struct PlayerProcessor {
    player_id: String,
    registry: ExtractorRegistry,
    sessions: HashSet<String>,
}

impl PlayerProcessor {
    pub fn new(player_id: &str, registry: ExtractorRegistry) -> Self {
        Self {
            player_id: player_id.to_string(),
            registry,
            sessions: HashSet::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Processor for PlayerProcessor {
    fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    fn registry_mut(&mut self) -> &mut ExtractorRegistry {
        &mut self.registry
    }

    fn identity_columns(&self) -> Vec<String> {
        vec!["PlayerID".to_string(), "SessionCount".to_string()]
    }

    fn identity_values(&self) -> ExportRow {
        vec![
            FeatureValue::from(self.player_id.as_str()),
            FeatureValue::from(self.sessions.len()),
        ]
    }

    fn observe(&mut self, event: &Event) {
        if !self.sessions.contains(&event.session_id) {
            self.sessions.insert(event.session_id.clone());
        }
    }

    fn player_id(&self) -> Option<&str> {
        Some(&self.player_id)
    }
}
