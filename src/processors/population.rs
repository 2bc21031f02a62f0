use super::Processor;
use crate::models::{Event, ExportRow, FeatureValue};
use crate::registry::ExtractorRegistry;
use std::collections::HashSet;

/// Generator state for every event of the run
pub struct PopulationProcessor {
    registry: ExtractorRegistry,
    players: HashSet<String>,
    sessions: HashSet<String>,
}

impl PopulationProcessor {
    pub fn new(registry: ExtractorRegistry) -> Self {
        Self {
            registry,
            players: HashSet::new(),
            sessions: HashSet::new(),
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Processor for PopulationProcessor {
    fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    fn registry_mut(&mut self) -> &mut ExtractorRegistry {
        &mut self.registry
    }

    fn identity_columns(&self) -> Vec<String> {
        vec!["PlayerCount".to_string(), "SessionCount".to_string()]
    }

    fn identity_values(&self) -> ExportRow {
        vec![
            FeatureValue::from(self.players.len()),
            FeatureValue::from(self.sessions.len()),
        ]
    }

    fn observe(&mut self, event: &Event) {
        if !self.players.contains(event.player_id()) {
            self.players.insert(event.player_id().to_string());
        }
        if !self.sessions.contains(&event.session_id) {
            self.sessions.insert(event.session_id.clone());
        }
    }
}
