use crate::generators::generator::{ExtractionError, Feature, Generator, GeneratorParams};
use crate::generators::loader::{string_arg, LoaderError};
use crate::models::{Event, ExtractionMode, FeatureValue};
use serde_json::{Map, Value};

/// Counts occurrences of one event name
pub struct CountEvent {
    params: GeneratorParams,
    target_event: String,
    count: i64,
}

impl CountEvent {
    pub fn new(params: GeneratorParams, args: &Map<String, Value>) -> Result<Self, LoaderError> {
        let target_event = string_arg("CountEvent", args, "target_event", &["target"])?;
        Ok(Self {
            params,
            target_event,
            count: 0,
        })
    }
}

impl Generator for CountEvent {
    fn params(&self) -> &GeneratorParams {
        &self.params
    }

    fn event_dependencies(&self, _mode: ExtractionMode) -> Vec<String> {
        vec![self.target_event.clone()]
    }

    fn update_from_event(&mut self, event: &Event) -> Result<(), ExtractionError> {
        if event.event_name == self.target_event {
            self.count += 1;
        }
        Ok(())
    }
}

impl Feature for CountEvent {
    fn values(&self) -> Vec<FeatureValue> {
        vec![FeatureValue::Int(self.count)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counts_only_target() {
        let args = json!({"target_event": "move"}).as_object().cloned().unwrap();
        let mut feature =
            CountEvent::new(GeneratorParams::aggregate("Moves", ExtractionMode::Session), &args).unwrap();

        for name in ["start", "move", "move", "end"] {
            feature
                .update_from_event(&Event::new("S1", "GAME", chrono::Utc::now(), name))
                .unwrap();
        }
        assert_eq!(feature.values(), vec![FeatureValue::Int(2)]);
    }

    #[test]
    fn test_requires_target() {
        let result = CountEvent::new(GeneratorParams::aggregate("Moves", ExtractionMode::Session), &Map::new());
        assert!(matches!(result, Err(LoaderError::InvalidArgument { .. })));
    }
}
