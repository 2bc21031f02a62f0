//! Event Manager - raw and processed event streams plus detectors

use crate::config::GeneratorCollectionConfig;
use crate::generators::{ExtractionError, GeneratorLoader};
use crate::models::{Event, ExportRow};
use crate::registry::{DetectorRegistry, GeneratorPlan, PlanError};

pub struct EventManager {
    detectors: Option<DetectorRegistry>,
    /// GAME events only
    raw_lines: Vec<ExportRow>,
    /// GAME and GENERATED events, in processing order
    all_lines: Vec<ExportRow>,
}

impl EventManager {
    /// Detectors are loaded only when a loader is available
    pub fn new(
        detectors: Option<(&GeneratorCollectionConfig, &dyn GeneratorLoader)>,
        fail_fast: bool,
    ) -> Result<Self, PlanError> {
        let detectors = match detectors {
            Some((collection, loader)) => {
                let plan = GeneratorPlan::for_detectors(collection, loader, fail_fast)?;
                log::info!("✅ Detector plan loaded via {}: {} instances", loader.loader_name(), plan.len());
                Some(DetectorRegistry::from_plan(&plan, loader, fail_fast))
            }
            None => None,
        };

        Ok(Self {
            detectors,
            raw_lines: Vec::new(),
            all_lines: Vec::new(),
        })
    }

    pub fn has_detectors(&self) -> bool {
        self.detectors.as_ref().map(|d| !d.is_empty()).unwrap_or(false)
    }

    /// Record an event and append what detectors generated from it
    ///
    /// The event is always recorded. Events from healthy detectors stay in
    /// `generated` even when another detector returns an error.
    pub fn process_event(&mut self, event: &Event, generated: &mut Vec<Event>) -> Result<(), ExtractionError> {
        let row = event.column_values();
        if !event.is_generated() {
            self.raw_lines.push(row.clone());
        }
        self.all_lines.push(row);

        match self.detectors.as_mut() {
            Some(detectors) => detectors.process_event(event, generated),
            None => Ok(()),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        Event::column_names()
    }

    pub fn raw_lines(&self) -> &[ExportRow] {
        &self.raw_lines
    }

    pub fn all_lines(&self) -> &[ExportRow] {
        &self.all_lines
    }

    pub fn clear_lines(&mut self) {
        self.raw_lines.clear();
        self.all_lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::BuiltinLoader;
    use crate::models::EventSource;
    use chrono::Utc;

    #[test]
    fn test_streams_split_by_source() {
        let collection = GeneratorCollectionConfig::new("GAME");
        let loader = BuiltinLoader;
        let mut manager = EventManager::new(Some((&collection, &loader)), false).unwrap();
        assert!(!manager.has_detectors());

        let game = Event::new("S1", "GAME", Utc::now(), "start");
        let mut generated = Event::new("S1", "GAME", Utc::now(), "burst");
        generated.event_source = EventSource::Generated;

        let mut emitted = Vec::new();
        manager.process_event(&game, &mut emitted).unwrap();
        manager.process_event(&generated, &mut emitted).unwrap();
        assert!(emitted.is_empty());

        assert_eq!(manager.raw_lines().len(), 1);
        assert_eq!(manager.all_lines().len(), 2);
        assert_eq!(manager.column_names().len(), manager.all_lines()[0].len());

        manager.clear_lines();
        assert!(manager.raw_lines().is_empty());
        assert!(manager.all_lines().is_empty());
    }

    #[test]
    fn test_without_loader_records_events_only() {
        let mut manager = EventManager::new(None, true).unwrap();
        let event = Event::new("S1", "GAME", Utc::now(), "start");
        let mut emitted = Vec::new();
        manager.process_event(&event, &mut emitted).unwrap();
        assert!(emitted.is_empty());
        assert_eq!(manager.raw_lines().len(), 1);
    }
}
