//! Load plans - which generator instances a registry at one level holds
//!
//! Resolved once per level from the collection config and reused for every
//! processor created at that level, so all registries of a level share the
//! same composition and column order.

use crate::config::{ConfigError, GeneratorCollectionConfig, GeneratorConfig};
use crate::generators::{GeneratorKind, GeneratorLoader, GeneratorParams, LoaderError};
use crate::models::{ExtractionMode, IterationMode};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct PlannedGenerator {
    pub config: GeneratorConfig,
    pub params: GeneratorParams,
    pub iteration: IterationMode,
}

#[derive(Debug)]
pub enum PlanError {
    Config(ConfigError),
    Loader(LoaderError),
}

impl From<ConfigError> for PlanError {
    fn from(err: ConfigError) -> Self {
        PlanError::Config(err)
    }
}

impl From<LoaderError> for PlanError {
    fn from(err: LoaderError) -> Self {
        PlanError::Loader(err)
    }
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::Config(e) => write!(f, "Config error: {}", e),
            PlanError::Loader(e) => write!(f, "Loader error: {}", e),
        }
    }
}

impl std::error::Error for PlanError {}

/// Ordered generator instances for one level
#[derive(Debug, Clone)]
pub struct GeneratorPlan {
    pub mode: ExtractionMode,
    pub kind: GeneratorKind,
    entries: Vec<PlannedGenerator>,
}

impl GeneratorPlan {
    /// Plan with no generators, used when no loader exists
    pub fn empty(mode: ExtractionMode, kind: GeneratorKind) -> Self {
        Self {
            mode,
            kind,
            entries: Vec::new(),
        }
    }

    /// Resolve the feature generators for one level
    ///
    /// Starts from the enabled extractors (or `overrides` when given), then
    /// pulls in every configured extractor named as a feature dependency of
    /// a selected one. Types the loader does not support are skipped with a
    /// warning, or fail the plan under `fail_fast`.
    pub fn for_features(
        collection: &GeneratorCollectionConfig,
        mode: ExtractionMode,
        loader: &dyn GeneratorLoader,
        overrides: Option<&[String]>,
        fail_fast: bool,
    ) -> Result<Self, PlanError> {
        let extractors = &collection.extractors;
        let mut selected: BTreeSet<String> = match overrides {
            Some(names) => names
                .iter()
                .filter(|name| extractors.get(name).is_some())
                .cloned()
                .collect(),
            None => extractors
                .aggregate
                .values()
                .chain(extractors.iterated.values())
                .filter(|config| config.enabled.contains(mode))
                .map(|config| config.name.clone())
                .collect(),
        };

        let mut rejected: BTreeSet<String> = BTreeSet::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        loop {
            let pending: Vec<String> = selected
                .iter()
                .filter(|name| !visited.contains(*name) && !rejected.contains(*name))
                .cloned()
                .collect();
            if pending.is_empty() {
                break;
            }
            for name in pending {
                visited.insert(name.clone());
                let Some(config) = extractors.get(&name) else {
                    continue;
                };
                let params = GeneratorParams::aggregate(&name, mode);
                match loader.load_feature(config.type_name(), params, &config.args) {
                    Ok(feature) if !feature.available_modes().contains(&mode) => {
                        log::debug!("{} is not available at {} level", name, mode);
                        rejected.insert(name);
                    }
                    Ok(feature) => {
                        for dependency in feature.feature_dependencies(mode) {
                            if extractors.get(&dependency).is_some() {
                                selected.insert(dependency);
                            } else {
                                log::warn!(
                                    "⚠️  {} depends on {}, which is not configured",
                                    name,
                                    dependency
                                );
                            }
                        }
                    }
                    Err(e) if fail_fast => return Err(e.into()),
                    Err(e) => {
                        log::warn!("⚠️  Skipping {} at {} level: {}", name, mode, e);
                        rejected.insert(name);
                    }
                }
            }
        }

        let keep = |name: &str| selected.contains(name) && !rejected.contains(name);
        let mut entries = Vec::new();
        for (name, config) in extractors.aggregate.iter().filter(|(n, _)| keep(n.as_str())) {
            entries.push(PlannedGenerator {
                config: config.clone(),
                params: GeneratorParams::aggregate(name, mode).with_description(&config.description),
                iteration: IterationMode::Aggregate,
            });
        }
        for (_, config) in extractors.iterated.iter().filter(|(n, _)| keep(n.as_str())) {
            entries.extend(Self::per_count_entries(collection, config, mode)?);
        }

        log::debug!("{} level plan: {} feature instances", mode, entries.len());
        Ok(Self {
            mode,
            kind: GeneratorKind::Feature,
            entries,
        })
    }

    /// Resolve the detectors, which run at a single level
    pub fn for_detectors(
        collection: &GeneratorCollectionConfig,
        loader: &dyn GeneratorLoader,
        fail_fast: bool,
    ) -> Result<Self, PlanError> {
        let mode = ExtractionMode::Detector;
        let detectors = &collection.detectors;
        let mut entries = Vec::new();

        for (name, config) in detectors.aggregate.iter() {
            if !config.enabled.contains(mode) {
                continue;
            }
            let params = GeneratorParams::aggregate(name, mode).with_description(&config.description);
            match loader.load_detector(config.type_name(), params.clone(), &config.args) {
                Ok(_) => entries.push(PlannedGenerator {
                    config: config.clone(),
                    params,
                    iteration: IterationMode::Aggregate,
                }),
                Err(e) if fail_fast => return Err(e.into()),
                Err(e) => log::warn!("⚠️  Skipping detector {}: {}", name, e),
            }
        }
        for config in detectors.iterated.values() {
            if !config.enabled.contains(mode) {
                continue;
            }
            let instances = Self::per_count_entries(collection, config, mode)?;
            let Some(first) = instances.first() else {
                continue;
            };
            match loader.load_detector(config.type_name(), first.params.clone(), &config.args) {
                Ok(_) => entries.extend(instances),
                Err(e) if fail_fast => return Err(e.into()),
                Err(e) => log::warn!("⚠️  Skipping detector {}: {}", config.name, e),
            }
        }

        Ok(Self {
            mode,
            kind: GeneratorKind::Detector,
            entries,
        })
    }

    fn per_count_entries(
        collection: &GeneratorCollectionConfig,
        config: &GeneratorConfig,
        mode: ExtractionMode,
    ) -> Result<Vec<PlannedGenerator>, ConfigError> {
        Ok(collection
            .count_range(config)?
            .map(|index| PlannedGenerator {
                config: config.clone(),
                params: GeneratorParams::per_count(&config.name, config.prefix(), index, mode)
                    .with_description(&config.description),
                iteration: IterationMode::PerCount,
            })
            .collect())
    }

    pub fn entries(&self) -> &[PlannedGenerator] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
