//! Export Manager - drives one request from storage to outerfaces
//!
//! ```text
//! PreProcess   resolve ids → build managers → open outerfaces → headers
//!     ↓
//! Slicing      per batch of ids:
//!                storage.events_for_ids
//!                  → EventManager   (detectors may generate events)
//!                  → FeatureManager (generated events follow their trigger)
//!                write events / all_events / session rows, then clear them
//!     ↓
//! PostProcess  write population and player rows, close outerfaces
//! ```
//!
//! Player and population processors survive every slice, so their rows
//! do not depend on the batch size.

use super::event_manager::EventManager;
use super::feature_manager::FeatureManager;
use crate::config::{ExportConfig, GeneratorCollectionConfig};
use crate::generators::{ExtractionError, GeneratorLoader};
use crate::models::{Event, ExportMode, ExportRow, IdMode};
use crate::outerface::{Outerface, OuterfaceError};
use crate::registry::PlanError;
use crate::request::{ExportRequest, RequestResult, RequestStatus};
use crate::storage::{EventFilter, StorageError};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Idle,
    PreProcess,
    Slicing,
    PostProcess,
    Done,
}

impl ExportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStage::Idle => "idle",
            ExportStage::PreProcess => "pre-process",
            ExportStage::Slicing => "slicing",
            ExportStage::PostProcess => "post-process",
            ExportStage::Done => "done",
        }
    }
}

impl std::fmt::Display for ExportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum ExportError {
    Storage(StorageError),
    Outerface(OuterfaceError),
    Plan(PlanError),
    Extraction(ExtractionError),
}

impl From<StorageError> for ExportError {
    fn from(err: StorageError) -> Self {
        ExportError::Storage(err)
    }
}

impl From<OuterfaceError> for ExportError {
    fn from(err: OuterfaceError) -> Self {
        ExportError::Outerface(err)
    }
}

impl From<PlanError> for ExportError {
    fn from(err: PlanError) -> Self {
        ExportError::Plan(err)
    }
}

impl From<ExtractionError> for ExportError {
    fn from(err: ExtractionError) -> Self {
        ExportError::Extraction(err)
    }
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Storage(e) => write!(f, "Storage error: {}", e),
            ExportError::Outerface(e) => write!(f, "Outerface error: {}", e),
            ExportError::Plan(e) => write!(f, "Plan error: {}", e),
            ExportError::Extraction(e) => write!(f, "Extraction error: {}", e),
        }
    }
}

impl std::error::Error for ExportError {}

struct GameRegistration {
    collection: GeneratorCollectionConfig,
    loader: Arc<dyn GeneratorLoader>,
}

/// Managers built for one run
struct RunManagers {
    events: Option<EventManager>,
    features: Option<FeatureManager>,
}

#[derive(Default)]
struct RunStats {
    sessions: HashSet<String>,
    events_processed: usize,
    events_failed: usize,
    events_out_of_range: usize,
    generated_events: usize,
}

const FEATURE_MODES: [ExportMode; 3] = [ExportMode::Session, ExportMode::Player, ExportMode::Population];

pub struct ExportManager {
    config: ExportConfig,
    games: HashMap<String, GameRegistration>,
    stage: ExportStage,
}

impl ExportManager {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            games: HashMap::new(),
            stage: ExportStage::Idle,
        }
    }

    /// Register the generator collection and loader of a game
    ///
    /// Requests for games without a registration export raw events only.
    pub fn register_game(&mut self, collection: GeneratorCollectionConfig, loader: Arc<dyn GeneratorLoader>) {
        log::info!(
            "✅ Registered {} with loader {}",
            collection.game_id,
            loader.loader_name()
        );
        self.games.insert(
            collection.game_id.clone(),
            GameRegistration { collection, loader },
        );
    }

    pub fn has_loader(&self, game_id: &str) -> bool {
        self.games.contains_key(game_id)
    }

    pub fn stage(&self) -> ExportStage {
        self.stage
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run a request to completion
    ///
    /// Never panics on run errors: they become a `Failure` result. Rows
    /// written before a failure stay in the outerfaces.
    pub async fn execute(&mut self, request: &mut ExportRequest) -> RequestResult {
        let start = Instant::now();
        let mut stats = RunStats::default();

        log::info!(
            "🚀 Export {} started: modes [{}], storage {}, {} outerfaces",
            request.game_id,
            request
                .export_modes
                .iter()
                .map(ExportMode::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            request.storage.storage_type(),
            request.outerfaces.len()
        );

        let outcome = self.run(request, &mut stats).await;
        let failed_stage = self.stage;
        let outcome = outcome.and(close_outerfaces(&mut request.outerfaces).await);
        let duration = start.elapsed();

        let (status, message) = match outcome {
            Ok(()) => {
                self.stage = ExportStage::Done;
                log::info!(
                    "✅ Export {} finished in {:.2?}: {} sessions, {} events ({} failed, {} generated)",
                    request.game_id,
                    duration,
                    stats.sessions.len(),
                    stats.events_processed,
                    stats.events_failed,
                    stats.generated_events
                );
                (
                    RequestStatus::Success,
                    format!(
                        "Exported {} sessions of {} ({} events)",
                        stats.sessions.len(),
                        request.game_id,
                        stats.events_processed
                    ),
                )
            }
            Err(e) => {
                log::error!("❌ Export {} failed during {}: {}", request.game_id, failed_stage, e);
                (
                    RequestStatus::Failure,
                    format!("Export of {} failed during {}: {}", request.game_id, failed_stage, e),
                )
            }
        };

        RequestResult {
            status,
            message,
            duration,
            session_count: stats.sessions.len(),
            events_processed: stats.events_processed,
            events_failed: stats.events_failed,
            events_out_of_range: stats.events_out_of_range,
            generated_events: stats.generated_events,
        }
    }

    async fn run(&mut self, request: &mut ExportRequest, stats: &mut RunStats) -> Result<(), ExportError> {
        self.stage = ExportStage::PreProcess;
        let mut managers = self.pre_process(request).await?;

        let ids = match request.range.ids.clone() {
            Some(ids) => ids,
            None => request.storage.all_ids(request.range.id_mode).await?,
        };

        self.stage = ExportStage::Slicing;
        let filter = request.event_filter();
        let batch_size = self.config.batch_size.max(1);
        let slice_count = ids.len().div_ceil(batch_size);

        for (i, slice) in ids.chunks(batch_size).enumerate() {
            let slice_start = Instant::now();
            let before = stats.events_processed;
            self.process_slice(request, &mut managers, slice, &filter, stats).await?;
            log::info!(
                "📥 Slice {}/{}: {} ids, {} events in {:.2?}",
                i + 1,
                slice_count,
                slice.len(),
                stats.events_processed - before,
                slice_start.elapsed()
            );
        }

        self.stage = ExportStage::PostProcess;
        self.post_process(request, &mut managers).await
    }

    async fn pre_process(&self, request: &mut ExportRequest) -> Result<RunManagers, ExportError> {
        let fail_fast = self.config.fail_fast;
        let game = self.games.get(&request.game_id);

        if game.is_none() {
            let disabled: Vec<&str> = ExportMode::generator_modes()
                .iter()
                .filter(|m| request.export_modes.contains(*m))
                .map(|m| m.as_str())
                .collect();
            if !disabled.is_empty() {
                log::warn!(
                    "⚠️  No generator loader for {}; disabling {}",
                    request.game_id,
                    disabled.join(", ")
                );
            }
            for mode in ExportMode::generator_modes() {
                request.remove_export_mode(mode);
            }
        }

        let modes = &request.export_modes;
        let wants_features = FEATURE_MODES.iter().any(|m| modes.contains(m));
        let wants_events = modes.contains(&ExportMode::Events) || modes.contains(&ExportMode::Detectors);

        let features = match game {
            Some(g) if wants_features => Some(FeatureManager::new(
                &g.collection,
                Arc::clone(&g.loader),
                request.feature_overrides.as_deref(),
                fail_fast,
            )?),
            _ => None,
        };

        // Detectors also feed generated events to the feature processors
        let needs_detectors = modes.contains(&ExportMode::Detectors) || wants_features;
        let events = if wants_events || needs_detectors {
            let detectors = game
                .filter(|_| needs_detectors)
                .map(|g| (&g.collection, g.loader.as_ref()));
            Some(EventManager::new(detectors, fail_fast)?)
        } else {
            None
        };

        for outerface in request.outerfaces.iter_mut() {
            outerface.open().await?;
            log::info!("📝 {} outerface opened", outerface.backend_type());
        }

        for mode in request.export_modes.iter().copied() {
            let descriptions = match mode {
                ExportMode::Events | ExportMode::Detectors => Event::column_descriptions(),
                ExportMode::Session => features.as_ref().map(|f| f.session_column_descriptions()).unwrap_or_default(),
                ExportMode::Player => features.as_ref().map(|f| f.player_column_descriptions()).unwrap_or_default(),
                ExportMode::Population => features.as_ref().map(|f| f.population_column_descriptions()).unwrap_or_default(),
            };
            let columns: Vec<String> = descriptions.iter().map(|c| c.name.clone()).collect();
            for outerface in request.outerfaces.iter_mut().filter(|o| o.accepts(mode)) {
                outerface.write_header(&columns, mode).await?;
                outerface.write_column_descriptions(&descriptions, mode).await?;
            }
        }

        Ok(RunManagers { events, features })
    }

    async fn process_slice(
        &self,
        request: &mut ExportRequest,
        managers: &mut RunManagers,
        slice: &[String],
        filter: &EventFilter,
        stats: &mut RunStats,
    ) -> Result<(), ExportError> {
        let id_mode = request.range.id_mode;
        let events = request.storage.events_for_ids(slice, id_mode, filter).await?;
        let wanted: HashSet<&str> = slice.iter().map(String::as_str).collect();

        for event in events {
            let in_slice = match id_mode {
                IdMode::Session => wanted.contains(event.session_id.as_str()),
                IdMode::User => event.user_id.as_deref().map(|u| wanted.contains(u)).unwrap_or(false),
            };
            if !in_slice {
                log::warn!(
                    "⚠️  Storage returned event {} of session {} outside the requested ids",
                    event.event_name,
                    event.session_id
                );
                stats.events_out_of_range += 1;
                continue;
            }

            stats.sessions.insert(event.session_id.clone());
            let name = event.event_name.clone();
            let session = event.session_id.clone();
            match self.process_with_generated(managers, event, stats) {
                Ok(()) => stats.events_processed += 1,
                Err(e) if self.config.fail_fast => return Err(e.into()),
                Err(e) => {
                    log::warn!("⚠️  Event {} of session {} skipped: {}", name, session, e);
                    stats.events_failed += 1;
                }
            }
        }

        let modes = &request.export_modes;
        if let Some(events) = managers.events.as_mut() {
            write_rows(&mut request.outerfaces, modes, ExportMode::Events, events.raw_lines()).await?;
            write_rows(&mut request.outerfaces, modes, ExportMode::Detectors, events.all_lines()).await?;
            events.clear_lines();
        }
        if let Some(features) = managers.features.as_mut() {
            // Finalizing here also hands session values to the players
            let sessions = features.session_lines()?;
            write_rows(&mut request.outerfaces, modes, ExportMode::Session, &sessions).await?;
            features.clear_session_lines();
        }
        Ok(())
    }

    /// Run one stored event and everything detectors generate behind it
    fn process_with_generated(
        &self,
        managers: &mut RunManagers,
        event: Event,
        stats: &mut RunStats,
    ) -> Result<(), ExtractionError> {
        let fail_fast = self.config.fail_fast;
        let mut budget = self.config.max_generated_events;
        let mut queue = VecDeque::from([event]);
        let mut first_error: Option<ExtractionError> = None;
        let mut capped = false;

        while let Some(current) = queue.pop_front() {
            if let Some(events) = managers.events.as_mut() {
                let mut generated = Vec::new();
                let result = events.process_event(&current, &mut generated);

                // Queue what healthy detectors emitted even if another one failed
                for event in generated {
                    if budget == 0 {
                        if !capped {
                            log::warn!(
                                "⚠️  Generated event cap {} reached in session {}; dropping further events",
                                self.config.max_generated_events,
                                current.session_id
                            );
                            capped = true;
                        }
                        continue;
                    }
                    budget -= 1;
                    stats.generated_events += 1;
                    queue.push_back(event);
                }

                match result {
                    Ok(()) => {}
                    Err(e) if fail_fast => return Err(e),
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }

            if let Some(features) = managers.features.as_mut() {
                match features.process_event(&current) {
                    Ok(()) => {}
                    Err(e) if fail_fast => return Err(e),
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn post_process(&self, request: &mut ExportRequest, managers: &mut RunManagers) -> Result<(), ExportError> {
        let modes = &request.export_modes;
        if let Some(features) = managers.features.as_mut() {
            let population = features.population_lines()?;
            write_rows(&mut request.outerfaces, modes, ExportMode::Population, &population).await?;

            let players = features.player_lines()?;
            write_rows(&mut request.outerfaces, modes, ExportMode::Player, &players).await?;

            log::info!(
                "✅ Post-process: {} players, {} population rows",
                players.len(),
                population.len()
            );
            features.clear_population_lines();
            features.clear_player_lines();
        }
        Ok(())
    }
}

/// Send rows of a requested mode to every outerface accepting it
async fn write_rows(
    outerfaces: &mut [Box<dyn Outerface>],
    modes: &BTreeSet<ExportMode>,
    mode: ExportMode,
    rows: &[ExportRow],
) -> Result<(), OuterfaceError> {
    if rows.is_empty() || !modes.contains(&mode) {
        return Ok(());
    }
    for outerface in outerfaces.iter_mut().filter(|o| o.accepts(mode)) {
        outerface.write_lines(rows, mode).await?;
    }
    Ok(())
}

/// Close everything, reporting the first failure
async fn close_outerfaces(outerfaces: &mut [Box<dyn Outerface>]) -> Result<(), ExportError> {
    let mut first_error = None;
    for outerface in outerfaces.iter_mut() {
        if let Err(e) = outerface.close().await {
            log::error!("Failed to close {} outerface: {}", outerface.backend_type(), e);
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
