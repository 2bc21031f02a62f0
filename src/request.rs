//! Export requests and their results

use crate::models::{ExportMode, IdMode};
use crate::outerface::Outerface;
use crate::storage::{EventFilter, EventStorage};
use std::collections::BTreeSet;
use std::time::Duration;

/// Which ids an export covers
#[derive(Debug, Clone)]
pub struct ExportRange {
    /// Explicit ids; `None` means every id the storage knows
    pub ids: Option<Vec<String>>,
    pub id_mode: IdMode,
    /// Keep only these log versions
    pub versions: Option<Vec<String>>,
}

impl ExportRange {
    pub fn all(id_mode: IdMode) -> Self {
        Self {
            ids: None,
            id_mode,
            versions: None,
        }
    }

    pub fn sessions<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            id_mode: IdMode::Session,
            versions: None,
        }
    }

    pub fn players<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            id_mode: IdMode::User,
            versions: None,
        }
    }

    pub fn with_versions(mut self, versions: Vec<String>) -> Self {
        self.versions = Some(versions);
        self
    }
}

/// One export run: what to read, what to compute and where to write it
pub struct ExportRequest {
    pub game_id: String,
    pub range: ExportRange,
    pub export_modes: BTreeSet<ExportMode>,
    pub storage: Box<dyn EventStorage>,
    pub outerfaces: Vec<Box<dyn Outerface>>,
    /// Restrict features to these names (plus their dependencies)
    pub feature_overrides: Option<Vec<String>>,
    pub excluded_events: Vec<String>,
}

impl ExportRequest {
    pub fn new(game_id: &str, range: ExportRange, storage: Box<dyn EventStorage>) -> Self {
        Self {
            game_id: game_id.to_string(),
            range,
            export_modes: ExportMode::all().into_iter().collect(),
            storage,
            outerfaces: Vec::new(),
            feature_overrides: None,
            excluded_events: Vec::new(),
        }
    }

    pub fn with_modes(mut self, modes: impl IntoIterator<Item = ExportMode>) -> Self {
        self.export_modes = modes.into_iter().collect();
        self
    }

    pub fn with_outerface(mut self, outerface: Box<dyn Outerface>) -> Self {
        self.outerfaces.push(outerface);
        self
    }

    pub fn with_feature_overrides(mut self, names: Vec<String>) -> Self {
        self.feature_overrides = Some(names);
        self
    }

    pub fn with_excluded_events(mut self, names: Vec<String>) -> Self {
        self.excluded_events = names;
        self
    }

    pub fn event_filter(&self) -> EventFilter {
        EventFilter {
            versions: self.range.versions.clone(),
            excluded_events: self.excluded_events.clone(),
        }
    }

    /// Drop a mode from the request and from every outerface
    pub fn remove_export_mode(&mut self, mode: ExportMode) {
        self.export_modes.remove(&mode);
        for outerface in self.outerfaces.iter_mut() {
            outerface.remove_export_mode(mode);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Failure,
}

/// Outcome of [`crate::managers::ExportManager::execute`]
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub status: RequestStatus,
    pub message: String,
    pub duration: Duration,
    pub session_count: usize,
    pub events_processed: usize,
    /// Events whose generators failed; the run continued without them
    pub events_failed: usize,
    /// Events the storage returned for ids outside the slice
    pub events_out_of_range: usize,
    pub generated_events: usize,
}

impl RequestResult {
    pub fn is_success(&self) -> bool {
        self.status == RequestStatus::Success
    }
}
