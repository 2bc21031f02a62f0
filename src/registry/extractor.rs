//! Feature registry: dispatch plus value extraction

use super::dispatch::GeneratorRegistry;
use super::plan::GeneratorPlan;
use crate::generators::{ExtractionError, Feature, GeneratorLoader};
use crate::models::{ColumnDescription, FeatureData, FeatureValue};

pub type ExtractorRegistry = GeneratorRegistry<dyn Feature>;

impl GeneratorRegistry<dyn Feature> {
    /// Instantiate every planned feature through the loader
    pub fn from_plan(plan: &GeneratorPlan, loader: &dyn GeneratorLoader, fail_fast: bool) -> Self {
        let mut registry = Self::new(plan.mode, fail_fast);
        for entry in plan.entries() {
            match loader.load_feature(entry.config.type_name(), entry.params.clone(), &entry.config.args) {
                Ok(feature) => registry.register(feature),
                Err(e) => log::error!(
                    "Planned feature {} failed to load: {}",
                    entry.params.instance_name,
                    e
                ),
            }
        }
        registry
    }

    /// Deliver a feature value to every generator that depends on it
    ///
    /// Generators that restrict their dependency levels only receive data
    /// produced at one of those levels.
    pub fn update_from_feature_data(&mut self, feature: &FeatureData) -> Result<(), ExtractionError> {
        let Some(slots) = self.feature_index.get(&feature.name) else {
            return Ok(());
        };
        let mut first_error = None;
        for &slot in slots {
            let generator = &mut self.generators[slot];
            if !generator.feature_dependency_modes().contains(&feature.mode) {
                continue;
            }
            match generator.update_from_feature_data(feature) {
                Ok(()) => {}
                Err(e) if self.fail_fast => return Err(e),
                Err(e) => {
                    log::debug!("{} skipped feature {}: {}", generator.instance_name(), feature.name, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.generators.iter().flat_map(|g| g.column_names()).collect()
    }

    /// Every column paired with its generator's configured description
    pub fn column_descriptions(&self) -> Vec<ColumnDescription> {
        self.generators
            .iter()
            .flat_map(|g| {
                let description = g.params().description.clone();
                g.column_names()
                    .into_iter()
                    .map(move |name| ColumnDescription::new(name, description.clone()))
            })
            .collect()
    }

    /// All values in registration order, one per column
    pub fn values(&self) -> Vec<FeatureValue> {
        self.generators.iter().flat_map(|g| g.checked_values()).collect()
    }

    /// Current value of every first-order generator, tagged with its unit
    ///
    /// Generators that depend on other features are left out, so their
    /// values never propagate further.
    pub fn feature_data(&self, player_id: Option<&str>, session_id: Option<&str>) -> Vec<FeatureData> {
        self.generators
            .iter()
            .filter(|g| g.feature_dependencies(self.mode).is_empty())
            .map(|g| g.to_feature_data(player_id, session_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeneratorCollectionConfig, GeneratorConfig};
    use crate::generators::{BuiltinLoader, Generator, GeneratorParams};
    use crate::models::{Event, ExtractionMode};
    use chrono::Utc;

    /// Second-order feature holding the latest value of "Moves"
    struct MovesEcho {
        params: GeneratorParams,
        latest: FeatureValue,
        accept: Vec<ExtractionMode>,
    }

    impl Generator for MovesEcho {
        fn params(&self) -> &GeneratorParams {
            &self.params
        }
        fn event_dependencies(&self, _mode: ExtractionMode) -> Vec<String> {
            Vec::new()
        }
        fn feature_dependencies(&self, _mode: ExtractionMode) -> Vec<String> {
            vec!["Moves".to_string()]
        }
        fn update_from_event(&mut self, _event: &Event) -> Result<(), ExtractionError> {
            Ok(())
        }
    }

    impl Feature for MovesEcho {
        fn update_from_feature_data(&mut self, feature: &FeatureData) -> Result<(), ExtractionError> {
            self.latest = feature.value().clone();
            Ok(())
        }
        fn values(&self) -> Vec<FeatureValue> {
            vec![self.latest.clone()]
        }
        fn feature_dependency_modes(&self) -> Vec<ExtractionMode> {
            self.accept.clone()
        }
    }

    fn make_registry() -> ExtractorRegistry {
        let collection = GeneratorCollectionConfig::new("TEST")
            .with_aggregate_extractor(GeneratorConfig::new("Moves", "CountEvent").with_arg("target_event", "move"))
            .with_aggregate_extractor(
                GeneratorConfig::new("Duration", "Timespan")
                    .with_arg("start_event", "start")
                    .with_arg("end_event", "end"),
            );
        let plan =
            GeneratorPlan::for_features(&collection, ExtractionMode::Session, &BuiltinLoader, None, false)
                .unwrap();
        ExtractorRegistry::from_plan(&plan, &BuiltinLoader, false)
    }

    #[test]
    fn test_from_plan_columns_and_values() {
        let mut registry = make_registry();
        assert_eq!(registry.column_names(), vec!["Duration", "Moves"]);
        assert_eq!(registry.values(), vec![FeatureValue::Float(0.0), FeatureValue::Int(0)]);

        registry.update_from_event(&Event::new("S1", "GAME", Utc::now(), "move")).unwrap();
        assert_eq!(registry.values()[1], FeatureValue::Int(1));
    }

    #[test]
    fn test_feature_data_is_first_order_only() {
        // Test: Echo depends on Moves, so it is not offered for propagation
        let mut registry = make_registry();
        registry.register(Box::new(MovesEcho {
            params: GeneratorParams::aggregate("Echo", ExtractionMode::Session),
            latest: FeatureValue::Null,
            accept: ExtractionMode::FEATURE_LEVELS.to_vec(),
        }));

        let data = registry.feature_data(Some("P1"), Some("S1"));
        let names: Vec<&str> = data.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Duration", "Moves"]);
        assert_eq!(data[1].session_id.as_deref(), Some("S1"));
        assert_eq!(registry.column_names(), vec!["Duration", "Moves", "Echo"]);
    }

    #[test]
    fn test_feature_data_routing_respects_modes() {
        let mut registry = make_registry();
        registry.register(Box::new(MovesEcho {
            params: GeneratorParams::aggregate("Echo", ExtractionMode::Session),
            latest: FeatureValue::Null,
            accept: vec![ExtractionMode::Player],
        }));

        let mut moves = registry.feature_data(None, None).remove(1);
        moves.values = vec![FeatureValue::Int(7)];

        moves.mode = ExtractionMode::Population;
        registry.update_from_feature_data(&moves).unwrap();
        assert_eq!(registry.values()[2], FeatureValue::Null);

        moves.mode = ExtractionMode::Player;
        registry.update_from_feature_data(&moves).unwrap();
        assert_eq!(registry.values()[2], FeatureValue::Int(7));
    }
}
