//! Dependency-indexed dispatch over one aggregation unit's generators

use crate::generators::{ExtractionError, Generator, ALL_EVENTS};
use crate::models::{Event, ExtractionMode};
use std::collections::HashMap;

/// Owns the generators of one aggregation unit and routes input to the
/// interested subset, in registration order
pub struct GeneratorRegistry<G: ?Sized> {
    pub(crate) generators: Vec<Box<G>>,
    event_index: HashMap<String, Vec<usize>>,
    all_events: Vec<usize>,
    pub(crate) feature_index: HashMap<String, Vec<usize>>,
    pub(crate) mode: ExtractionMode,
    pub(crate) fail_fast: bool,
}

impl<G: Generator + ?Sized> GeneratorRegistry<G> {
    pub fn new(mode: ExtractionMode, fail_fast: bool) -> Self {
        Self {
            generators: Vec::new(),
            event_index: HashMap::new(),
            all_events: Vec::new(),
            feature_index: HashMap::new(),
            mode,
            fail_fast,
        }
    }

    /// Index a generator by its event and feature dependencies
    pub fn register(&mut self, generator: Box<G>) {
        let slot = self.generators.len();
        let mut events = generator.event_dependencies(self.mode);
        events.sort();
        events.dedup();
        for event_name in events {
            if event_name == ALL_EVENTS {
                self.all_events.push(slot);
            } else {
                self.event_index.entry(event_name).or_default().push(slot);
            }
        }
        let mut features = generator.feature_dependencies(self.mode);
        features.sort();
        features.dedup();
        for feature_name in features {
            self.feature_index.entry(feature_name).or_default().push(slot);
        }
        self.generators.push(generator);
    }

    /// Slots interested in an event name, each once, in registration order
    fn event_targets(&self, event_name: &str) -> Vec<usize> {
        let named = self.event_index.get(event_name).map(Vec::as_slice).unwrap_or(&[]);
        let mut targets: Vec<usize> = named.iter().chain(self.all_events.iter()).copied().collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    /// Deliver an event to every interested, version-compatible generator
    ///
    /// `after_update` runs on each generator that consumed the event. A
    /// failing generator does not stop the others unless `fail_fast` is
    /// set; the first error is returned once dispatch completes.
    pub(crate) fn dispatch_event<F>(&mut self, event: &Event, mut after_update: F) -> Result<(), ExtractionError>
    where
        F: FnMut(&mut G),
    {
        let mut first_error = None;
        for slot in self.event_targets(&event.event_name) {
            let generator = &mut self.generators[slot];
            if !generator.accepts_version(event) {
                continue;
            }
            match generator.update_from_event(event) {
                Ok(()) => after_update(generator.as_mut()),
                Err(e) if self.fail_fast => return Err(e),
                Err(e) => {
                    log::debug!("{} skipped event {}: {}", generator.instance_name(), event.event_name, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn update_from_event(&mut self, event: &Event) -> Result<(), ExtractionError> {
        self.dispatch_event(event, |_| {})
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    pub fn generator_names(&self) -> Vec<&str> {
        self.generators.iter().map(|g| g.instance_name()).collect()
    }
}
