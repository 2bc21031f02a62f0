//! Generator contract shared by features and detectors

use crate::models::{version_in_bounds, Event, ExtractionMode, FeatureData, FeatureValue};

/// Event dependency meaning "every event, unfiltered"
pub const ALL_EVENTS: &str = "all_events";

/// Errors raised while a generator consumes an event or feature value
#[derive(Debug)]
pub enum ExtractionError {
    MissingField { generator: String, field: String },
    InvalidField { generator: String, field: String, reason: String },
    Generator { generator: String, message: String },
}

impl ExtractionError {
    pub fn missing_field(generator: &str, field: &str) -> Self {
        ExtractionError::MissingField {
            generator: generator.to_string(),
            field: field.to_string(),
        }
    }

    pub fn invalid_field(generator: &str, field: &str, reason: impl Into<String>) -> Self {
        ExtractionError::InvalidField {
            generator: generator.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionError::MissingField { generator, field } => {
                write!(f, "{} requires missing field '{}'", generator, field)
            }
            ExtractionError::InvalidField { generator, field, reason } => {
                write!(f, "{} could not read field '{}': {}", generator, field, reason)
            }
            ExtractionError::Generator { generator, message } => {
                write!(f, "{} failed: {}", generator, message)
            }
        }
    }
}

impl std::error::Error for ExtractionError {}

/// The closed set of generator variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    Feature,
    Detector,
}

impl GeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorKind::Feature => "feature",
            GeneratorKind::Detector => "detector",
        }
    }
}

/// Construction parameters handed to every generator by its loader
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorParams {
    /// Configured name, shared by every per-count instance
    pub name: String,
    /// Column prefix: `name` for aggregates, `{prefix}{i}_{name}` per count
    pub instance_name: String,
    pub description: String,
    pub mode: ExtractionMode,
    pub count_index: Option<usize>,
}

impl GeneratorParams {
    pub fn aggregate(name: &str, mode: ExtractionMode) -> Self {
        Self {
            name: name.to_string(),
            instance_name: name.to_string(),
            description: String::new(),
            mode,
            count_index: None,
        }
    }

    pub fn per_count(name: &str, prefix: &str, index: usize, mode: ExtractionMode) -> Self {
        Self {
            name: name.to_string(),
            instance_name: format!("{}{}_{}", prefix, index, name),
            description: String::new(),
            mode,
            count_index: Some(index),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// Operations every generator exposes to a registry
pub trait Generator: Send {
    fn params(&self) -> &GeneratorParams;

    /// Event names of interest, or [`ALL_EVENTS`]
    fn event_dependencies(&self, mode: ExtractionMode) -> Vec<String>;

    /// Configured generator names whose values this instance must receive
    fn feature_dependencies(&self, _mode: ExtractionMode) -> Vec<String> {
        Vec::new()
    }

    /// Inclusive lower LogVersion bound
    fn min_version(&self) -> Option<&str> {
        None
    }

    /// Inclusive upper LogVersion bound
    fn max_version(&self) -> Option<&str> {
        None
    }

    /// Mutate internal state from one event
    ///
    /// Uninteresting input is ignored; only malformed required fields are
    /// reported as errors.
    fn update_from_event(&mut self, event: &Event) -> Result<(), ExtractionError>;

    fn instance_name(&self) -> &str {
        &self.params().instance_name
    }

    /// Version gate applied before `update_from_event`
    fn accepts_version(&self, event: &Event) -> bool {
        version_in_bounds(event.log_version.as_deref(), self.min_version(), self.max_version())
    }
}

/// Accumulate-then-report generator
pub trait Feature: Generator {
    /// Receive the value of a first-order generator this feature depends on
    ///
    /// Called once per propagation pass, so implementations should keep the
    /// latest value rather than accumulate across calls. A dependency that is
    /// itself second-order is never delivered.
    fn update_from_feature_data(&mut self, _feature: &FeatureData) -> Result<(), ExtractionError> {
        Ok(())
    }

    /// Current values: the base feature followed by one per sub-feature
    fn values(&self) -> Vec<FeatureValue>;

    fn subfeatures(&self) -> Vec<String> {
        Vec::new()
    }

    fn base_feature_suffix(&self) -> String {
        String::new()
    }

    /// Levels whose FeatureData this feature accepts
    fn feature_dependency_modes(&self) -> Vec<ExtractionMode> {
        ExtractionMode::FEATURE_LEVELS.to_vec()
    }

    /// Levels this feature can be instantiated for
    fn available_modes(&self) -> Vec<ExtractionMode> {
        ExtractionMode::FEATURE_LEVELS.to_vec()
    }

    fn column_names(&self) -> Vec<String> {
        let base = self.instance_name();
        let mut columns = vec![format!("{}{}", base, self.base_feature_suffix())];
        columns.extend(self.subfeatures().iter().map(|sub| format!("{}-{}", base, sub)));
        columns
    }

    /// Values padded or truncated to the declared column count
    ///
    /// An empty value list reports as nulls; a length mismatch is logged.
    fn checked_values(&self) -> Vec<FeatureValue> {
        let expected = self.subfeatures().len() + 1;
        let mut values = self.values();
        if values.is_empty() {
            values.push(FeatureValue::Null);
        }
        if values.len() != expected {
            log::error!(
                "{} reported {} values for {} columns",
                self.instance_name(),
                values.len(),
                expected
            );
            values.resize(expected, FeatureValue::Null);
        }
        values
    }

    fn to_feature_data(&self, player_id: Option<&str>, session_id: Option<&str>) -> FeatureData {
        let params = self.params();
        FeatureData {
            name: params.name.clone(),
            mode: params.mode,
            count_index: params.count_index,
            player_id: player_id.map(str::to_string),
            session_id: session_id.map(str::to_string),
            columns: self.column_names(),
            values: self.checked_values(),
            subfeatures: self.subfeatures(),
        }
    }
}

/// Stateful trigger emitting synthetic events
///
/// `IDLE -> ARMED` when an update makes `trigger_condition` true, then
/// `trigger` emits one GENERATED event and returns to `IDLE`.
pub trait Detector: Generator {
    fn trigger_condition(&self) -> bool;

    /// Only called while armed; must disarm before returning
    fn trigger(&mut self, triggering_event: &Event) -> Event;
}
