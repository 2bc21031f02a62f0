//! Detector registry: dispatch plus the trigger protocol

use super::dispatch::GeneratorRegistry;
use super::plan::GeneratorPlan;
use crate::generators::{Detector, ExtractionError, GeneratorLoader};
use crate::models::Event;

pub type DetectorRegistry = GeneratorRegistry<dyn Detector>;

impl GeneratorRegistry<dyn Detector> {
    pub fn from_plan(plan: &GeneratorPlan, loader: &dyn GeneratorLoader, fail_fast: bool) -> Self {
        let mut registry = Self::new(plan.mode, fail_fast);
        for entry in plan.entries() {
            match loader.load_detector(entry.config.type_name(), entry.params.clone(), &entry.config.args) {
                Ok(detector) => registry.register(detector),
                Err(e) => log::error!(
                    "Planned detector {} failed to load: {}",
                    entry.params.instance_name,
                    e
                ),
            }
        }
        registry
    }

    /// Deliver an event and collect what armed detectors emit
    ///
    /// Each detector whose condition holds after the update triggers once.
    /// Generated events are appended to `generated` rather than re-entered.
    pub fn process_event(&mut self, event: &Event, generated: &mut Vec<Event>) -> Result<(), ExtractionError> {
        self.dispatch_event(event, |detector| {
            if detector.trigger_condition() {
                let emitted = detector.trigger(event);
                log::debug!(
                    "{} triggered {} from {}",
                    detector.instance_name(),
                    emitted.event_name,
                    event.event_name
                );
                generated.push(emitted);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{Generator, GeneratorParams};
    use crate::models::{EventSource, ExtractionMode};
    use chrono::Utc;
    use serde_json::{Map, Value};

    /// Arms after `threshold` moves
    struct MoveBurst {
        params: GeneratorParams,
        moves: usize,
        threshold: usize,
        armed: bool,
    }

    impl Generator for MoveBurst {
        fn params(&self) -> &GeneratorParams {
            &self.params
        }
        fn event_dependencies(&self, _mode: ExtractionMode) -> Vec<String> {
            vec!["move".to_string()]
        }
        fn update_from_event(&mut self, _event: &Event) -> Result<(), ExtractionError> {
            self.moves += 1;
            if self.moves == self.threshold {
                self.armed = true;
            }
            Ok(())
        }
    }

    impl Detector for MoveBurst {
        fn trigger_condition(&self) -> bool {
            self.armed
        }
        fn trigger(&mut self, triggering_event: &Event) -> Event {
            self.armed = false;
            let mut data = Map::new();
            data.insert("moves".to_string(), Value::from(self.moves));
            Event::generated(triggering_event, "move_burst", data)
        }
    }

    #[test]
    fn test_trigger_emits_once() {
        let mut registry = DetectorRegistry::new(ExtractionMode::Detector, false);
        registry.register(Box::new(MoveBurst {
            params: GeneratorParams::aggregate("Burst", ExtractionMode::Detector),
            moves: 0,
            threshold: 2,
            armed: false,
        }));

        let mut generated = Vec::new();
        for name in ["start", "move", "move", "move"] {
            registry
                .process_event(&Event::new("S1", "GAME", Utc::now(), name), &mut generated)
                .unwrap();
        }

        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].event_name, "move_burst");
        assert_eq!(generated[0].event_source, EventSource::Generated);
        assert_eq!(generated[0].event_data["moves"], Value::from(2));
    }

    /// Rejects every move that lacks `event_data.x`
    struct NeedsX {
        params: GeneratorParams,
    }

    impl Generator for NeedsX {
        fn params(&self) -> &GeneratorParams {
            &self.params
        }
        fn event_dependencies(&self, _mode: ExtractionMode) -> Vec<String> {
            vec!["move".to_string()]
        }
        fn update_from_event(&mut self, event: &Event) -> Result<(), ExtractionError> {
            event
                .event_data
                .get("x")
                .map(|_| ())
                .ok_or_else(|| ExtractionError::missing_field(self.instance_name(), "x"))
        }
    }

    impl Detector for NeedsX {
        fn trigger_condition(&self) -> bool {
            false
        }
        fn trigger(&mut self, triggering_event: &Event) -> Event {
            Event::generated(triggering_event, "never", Map::new())
        }
    }

    #[test]
    fn test_failing_detector_keeps_sibling_output() {
        // Test: One detector errors on a move; the other still emits and its event is kept
        let mut registry = DetectorRegistry::new(ExtractionMode::Detector, false);
        registry.register(Box::new(NeedsX {
            params: GeneratorParams::aggregate("Broken", ExtractionMode::Detector),
        }));
        registry.register(Box::new(MoveBurst {
            params: GeneratorParams::aggregate("Good", ExtractionMode::Detector),
            moves: 0,
            threshold: 1,
            armed: false,
        }));

        let mut generated = Vec::new();
        let result = registry.process_event(&Event::new("S1", "GAME", Utc::now(), "move"), &mut generated);

        assert!(matches!(result, Err(ExtractionError::MissingField { .. })));
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].event_name, "move_burst");
    }
}
