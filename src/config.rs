//! Export configuration
//!
//! Two sources:
//! - `ExportConfig`: runtime knobs from environment variables
//! - `GeneratorCollectionConfig`: the per-game JSON file listing which
//!   detectors and extractors to run, and with which arguments

use crate::models::ExtractionMode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::ops::Range;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendType {
    Tsv,
    Sqlite,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    MissingRange { generator: String, range: String },
    InvalidValue(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::MissingRange { generator, range } => {
                write!(f, "Generator {} uses undefined range {}", generator, range)
            }
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Runtime configuration for one export run
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Number of ids processed per slice
    pub batch_size: usize,

    /// Escalate every recoverable error to a failed run
    pub fail_fast: bool,

    /// Cap on detector-generated events queued behind a single source event
    pub max_generated_events: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            fail_fast: false,
            max_generated_events: 256,
        }
    }
}

impl ExportConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `PLAYFLOW_BATCH_SIZE` (default: 500)
    /// - `PLAYFLOW_FAIL_FAST` (default: false)
    /// - `PLAYFLOW_MAX_GENERATED_EVENTS` (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env::var("PLAYFLOW_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size)
                .max(1),

            fail_fast: env::var("PLAYFLOW_FAIL_FAST")
                .ok()
                .and_then(|s| s.to_lowercase().parse().ok())
                .unwrap_or(defaults.fail_fast),

            max_generated_events: env::var("PLAYFLOW_MAX_GENERATED_EVENTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_generated_events),
        }
    }
}

pub fn parse_backend_from_args() -> BackendType {
    let args: Vec<String> = env::args().collect();
    if let Some(idx) = args.iter().position(|x| x == "--backend") {
        match args.get(idx + 1).map(|s| s.as_str()) {
            Some("sqlite") => return BackendType::Sqlite,
            Some("tsv") => return BackendType::Tsv,
            Some(other) => log::warn!("Unknown backend '{}', defaulting to tsv", other),
            None => {}
        }
    }
    BackendType::Tsv
}

/// Inclusive-min, exclusive-max index range from the collection file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RangeConfig {
    pub min: usize,
    pub max: usize,
}

impl RangeConfig {
    pub fn indices(&self) -> Range<usize> {
        self.min..self.max.max(self.min)
    }
}

/// `enabled` is either a flag or an explicit list of levels
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EnabledModes {
    Flag(bool),
    Modes(Vec<ExtractionMode>),
}

impl Default for EnabledModes {
    fn default() -> Self {
        EnabledModes::Flag(true)
    }
}

impl EnabledModes {
    pub fn contains(&self, mode: ExtractionMode) -> bool {
        match self {
            EnabledModes::Flag(enabled) => *enabled,
            EnabledModes::Modes(modes) => modes.contains(&mode),
        }
    }
}

/// How many instances an iterated generator gets
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CountSpec {
    Fixed(usize),
    Range(String),
}

/// One detector or extractor entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratorConfig {
    /// Key of the entry in the collection file
    #[serde(skip)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub type_name: Option<String>,

    #[serde(default)]
    pub enabled: EnabledModes,

    #[serde(default)]
    pub description: String,

    /// Iterated generators only
    #[serde(default)]
    pub count: Option<CountSpec>,

    /// Iterated generators only
    #[serde(default)]
    pub prefix: Option<String>,

    /// Remaining keys, handed to the generator constructor
    #[serde(flatten)]
    pub args: Map<String, Value>,
}

impl GeneratorConfig {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: Some(type_name.into()),
            enabled: EnabledModes::default(),
            description: String::new(),
            count: None,
            prefix: None,
            args: Map::new(),
        }
    }

    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.args.insert(key.to_string(), value.into());
        self
    }

    pub fn with_enabled(mut self, enabled: EnabledModes) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_count(mut self, count: CountSpec, prefix: &str) -> Self {
        self.count = Some(count);
        self.prefix = Some(prefix.to_string());
        self
    }

    /// Loader type name; an entry without `type` names its own type
    pub fn type_name(&self) -> &str {
        self.type_name.as_deref().unwrap_or(&self.name)
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("pre")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeneratorMap {
    #[serde(default)]
    pub aggregate: BTreeMap<String, GeneratorConfig>,
    #[serde(default, alias = "per_count")]
    pub iterated: BTreeMap<String, GeneratorConfig>,
}

impl GeneratorMap {
    fn name_entries(&mut self) {
        for (name, config) in self.aggregate.iter_mut().chain(self.iterated.iter_mut()) {
            config.name = name.clone();
        }
    }

    pub fn get(&self, name: &str) -> Option<&GeneratorConfig> {
        self.aggregate.get(name).or_else(|| self.iterated.get(name))
    }
}

/// Per-game generator collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratorCollectionConfig {
    pub game_id: String,
    pub level_range: Option<RangeConfig>,
    pub other_ranges: HashMap<String, RangeConfig>,
    pub detectors: GeneratorMap,
    pub extractors: GeneratorMap,
}

impl GeneratorCollectionConfig {
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            ..Self::default()
        }
    }

    /// Parse a collection from JSON
    ///
    /// `level_range` is the primary sub-unit range; every other top-level
    /// key ending in `_range` is kept under its own name.
    pub fn from_json_str(game_id: &str, json: &str) -> Result<Self, ConfigError> {
        let root: Map<String, Value> = serde_json::from_str(json)?;
        let mut config = Self::new(game_id);

        for (key, value) in root {
            match key.as_str() {
                "level_range" => {
                    config.level_range = Some(serde_json::from_value(value)?);
                }
                "detectors" => {
                    config.detectors = serde_json::from_value(value)?;
                }
                "extractors" | "features" => {
                    config.extractors = serde_json::from_value(value)?;
                }
                k if k.ends_with("_range") => {
                    config.other_ranges.insert(key.clone(), serde_json::from_value(value)?);
                }
                _ => log::debug!("Ignoring unrecognized collection element '{}'", key),
            }
        }

        config.detectors.name_entries();
        config.extractors.name_entries();
        Ok(config)
    }

    pub fn from_file(game_id: &str, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(game_id, &json)
    }

    /// Add an aggregate extractor, replacing one of the same name
    pub fn with_aggregate_extractor(mut self, config: GeneratorConfig) -> Self {
        self.extractors.aggregate.insert(config.name.clone(), config);
        self
    }

    pub fn with_iterated_extractor(mut self, config: GeneratorConfig) -> Self {
        self.extractors.iterated.insert(config.name.clone(), config);
        self
    }

    pub fn with_aggregate_detector(mut self, config: GeneratorConfig) -> Self {
        self.detectors.aggregate.insert(config.name.clone(), config);
        self
    }

    pub fn with_level_range(mut self, min: usize, max: usize) -> Self {
        self.level_range = Some(RangeConfig { min, max });
        self
    }

    /// Count indices an iterated generator is instantiated for
    pub fn count_range(&self, config: &GeneratorConfig) -> Result<Range<usize>, ConfigError> {
        match &config.count {
            None => Err(ConfigError::InvalidValue(format!(
                "iterated generator {} has no count",
                config.name
            ))),
            Some(CountSpec::Fixed(n)) => Ok(0..*n),
            Some(CountSpec::Range(range)) => {
                let found = if range == "level_range" {
                    self.level_range
                } else {
                    self.other_ranges.get(range).copied()
                };
                found
                    .map(|r| r.indices())
                    .ok_or_else(|| ConfigError::MissingRange {
                        generator: config.name.clone(),
                        range: range.clone(),
                    })
            }
        }
    }
}
