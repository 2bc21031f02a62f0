//! Feature Manager - processor hierarchy and cross-level propagation
//!
//! Players and sessions live in arenas owned by the manager. Slot 0 of each
//! arena is the "null" sentinel: it always exists, exposes the level's
//! column names, and also absorbs events that lack a user id.
//!
//! ## Two-phase use
//!
//! ```text
//! process_event() ... process_event()    accumulate, drops any snapshot
//!     ↓
//! finalize()                             propagate once, cache FeatureSnapshot
//!     ↓
//! session_lines() / player_lines() / population_lines()
//! ```
//!
//! Finalizing again without new events returns the cached snapshot, so
//! second-order features never receive the same values twice.

use crate::generators::{ExtractionError, GeneratorLoader};
use crate::models::{ColumnDescription, Event, ExportRow, ExtractionMode, FeatureData, NULL_ID};
use crate::processors::{PlayerProcessor, PopulationProcessor, Processor, SessionProcessor};
use crate::registry::{ExtractorRegistry, GeneratorPlan, PlanError};
use crate::config::GeneratorCollectionConfig;
use std::collections::HashMap;
use std::sync::Arc;

const SENTINEL: usize = 0;

/// Rows of every level after one propagation pass
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSnapshot {
    pub population: ExportRow,
    pub players: Vec<ExportRow>,
    pub sessions: Vec<ExportRow>,
}

pub struct FeatureManager {
    loader: Arc<dyn GeneratorLoader>,
    population_plan: GeneratorPlan,
    player_plan: GeneratorPlan,
    session_plan: GeneratorPlan,
    fail_fast: bool,

    population: PopulationProcessor,

    players: Vec<PlayerProcessor>,
    player_slots: HashMap<String, usize>,
    null_player_used: bool,

    sessions: Vec<SessionProcessor>,
    session_slots: HashMap<(usize, String), usize>,
    sessions_by_player: HashMap<usize, Vec<usize>>,
    null_session_used: bool,

    snapshot: Option<FeatureSnapshot>,
}

impl FeatureManager {
    /// Resolve one plan per level and create the population and sentinels
    pub fn new(
        collection: &GeneratorCollectionConfig,
        loader: Arc<dyn GeneratorLoader>,
        overrides: Option<&[String]>,
        fail_fast: bool,
    ) -> Result<Self, PlanError> {
        let plan = |mode| GeneratorPlan::for_features(collection, mode, loader.as_ref(), overrides, fail_fast);
        let population_plan = plan(ExtractionMode::Population)?;
        let player_plan = plan(ExtractionMode::Player)?;
        let session_plan = plan(ExtractionMode::Session)?;

        log::info!(
            "✅ Feature plans loaded via {}: {} population, {} player, {} session instances",
            loader.loader_name(),
            population_plan.len(),
            player_plan.len(),
            session_plan.len()
        );

        let population = PopulationProcessor::new(ExtractorRegistry::from_plan(
            &population_plan,
            loader.as_ref(),
            fail_fast,
        ));

        let mut manager = Self {
            loader,
            population_plan,
            player_plan,
            session_plan,
            fail_fast,
            population,
            players: Vec::new(),
            player_slots: HashMap::new(),
            null_player_used: false,
            sessions: Vec::new(),
            session_slots: HashMap::new(),
            sessions_by_player: HashMap::new(),
            null_session_used: false,
            snapshot: None,
        };
        manager.reset_players();
        manager.reset_sessions();
        Ok(manager)
    }

    fn new_registry(&self, plan: &GeneratorPlan) -> ExtractorRegistry {
        ExtractorRegistry::from_plan(plan, self.loader.as_ref(), self.fail_fast)
    }

    fn reset_players(&mut self) {
        let sentinel = PlayerProcessor::new(NULL_ID, self.new_registry(&self.player_plan));
        self.players = vec![sentinel];
        self.player_slots = HashMap::from([(NULL_ID.to_string(), SENTINEL)]);
        self.null_player_used = false;
    }

    fn reset_sessions(&mut self) {
        let sentinel = SessionProcessor::new(NULL_ID, NULL_ID, self.new_registry(&self.session_plan));
        self.sessions = vec![sentinel];
        self.session_slots = HashMap::from([((SENTINEL, NULL_ID.to_string()), SENTINEL)]);
        self.sessions_by_player = HashMap::from([(SENTINEL, vec![SENTINEL])]);
        self.null_session_used = false;
    }

    /// Arena slot of a player, created on first sight
    fn player_slot(&mut self, player_id: &str) -> usize {
        if let Some(&slot) = self.player_slots.get(player_id) {
            if slot == SENTINEL {
                self.null_player_used = true;
            }
            return slot;
        }
        let processor = PlayerProcessor::new(player_id, self.new_registry(&self.player_plan));
        let slot = self.players.len();
        self.players.push(processor);
        self.player_slots.insert(player_id.to_string(), slot);
        log::debug!("New player processor {} at slot {}", player_id, slot);
        slot
    }

    fn session_slot(&mut self, player_slot: usize, session_id: &str) -> usize {
        let key = (player_slot, session_id.to_string());
        if let Some(&slot) = self.session_slots.get(&key) {
            if slot == SENTINEL {
                self.null_session_used = true;
            }
            return slot;
        }
        let owner = self.players[player_slot]
            .player_id()
            .unwrap_or(NULL_ID)
            .to_string();
        let processor = SessionProcessor::new(&owner, session_id, self.new_registry(&self.session_plan));
        let slot = self.sessions.len();
        self.sessions.push(processor);
        self.session_slots.insert(key, slot);
        self.sessions_by_player.entry(player_slot).or_default().push(slot);
        slot
    }

    /// Accumulate one event at population, player and session level
    ///
    /// Every level sees the event even when an earlier level failed; the
    /// first error is returned afterwards. Under fail-fast the first error
    /// returns immediately.
    pub fn process_event(&mut self, event: &Event) -> Result<(), ExtractionError> {
        self.snapshot = None;
        let mut first_error = None;

        let result = self.population.process_event(event);
        self.absorb(result, &mut first_error)?;

        let player = self.player_slot(event.player_id());
        let result = self.players[player].process_event(event);
        self.absorb(result, &mut first_error)?;

        let session = self.session_slot(player, &event.session_id);
        let result = self.sessions[session].process_event(event);
        self.absorb(result, &mut first_error)?;

        first_error.map_or(Ok(()), Err)
    }

    fn absorb(
        &self,
        result: Result<(), ExtractionError>,
        first_error: &mut Option<ExtractionError>,
    ) -> Result<(), ExtractionError> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if self.fail_fast => Err(e),
            Err(e) => {
                first_error.get_or_insert(e);
                Ok(())
            }
        }
    }

    fn deliver(&self, result: Result<(), ExtractionError>) -> Result<(), ExtractionError> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if self.fail_fast => Err(e),
            Err(e) => {
                log::warn!("⚠️  Feature propagation skipped a value: {}", e);
                Ok(())
            }
        }
    }

    /// Run the propagation pass unless a snapshot for the current state exists
    ///
    /// First-order values of all three levels are read up front, then
    /// delivered in order:
    /// 1. population values → population, every player, every session
    /// 2. each player's values → population, that player, its sessions
    /// 3. each session's values → population, its owner, itself
    ///
    /// The "null" player and session sentinels only take part once they have
    /// absorbed events; until then population values skip them.
    pub fn finalize(&mut self) -> Result<&FeatureSnapshot, ExtractionError> {
        let snapshot = match self.snapshot.take() {
            Some(snapshot) => snapshot,
            None => {
                self.propagate()?;
                self.build_snapshot()
            }
        };
        let snapshot: &FeatureSnapshot = self.snapshot.insert(snapshot);
        Ok(snapshot)
    }

    /// Player slots holding real data, in first-seen order
    fn live_players(&self) -> Vec<usize> {
        (0..self.players.len())
            .filter(|slot| *slot != SENTINEL || self.null_player_used)
            .collect()
    }

    fn live_sessions_of(&self, player: usize) -> Vec<usize> {
        self.sessions_by_player
            .get(&player)
            .map(|slots| {
                slots
                    .iter()
                    .copied()
                    .filter(|slot| *slot != SENTINEL || self.null_session_used)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn propagate(&mut self) -> Result<(), ExtractionError> {
        let players = self.live_players();

        // Read every first-order value before delivering any
        let population_data = self.population.feature_data();
        let player_data: Vec<(usize, Vec<FeatureData>)> = players
            .iter()
            .map(|&p| (p, self.players[p].feature_data()))
            .collect();
        let session_data: Vec<(usize, usize, Vec<FeatureData>)> = players
            .iter()
            .flat_map(|&p| self.live_sessions_of(p).into_iter().map(move |s| (p, s)))
            .map(|(p, s)| (p, s, self.sessions[s].feature_data()))
            .collect();
        let sessions: Vec<usize> = session_data.iter().map(|(_, s, _)| *s).collect();

        for feature in &population_data {
            let result = self.population.process_feature_data(feature);
            self.deliver(result)?;
            for &p in &players {
                let result = self.players[p].process_feature_data(feature);
                self.deliver(result)?;
            }
            for &s in &sessions {
                let result = self.sessions[s].process_feature_data(feature);
                self.deliver(result)?;
            }
        }

        for (p, data) in &player_data {
            let owned = self.live_sessions_of(*p);
            for feature in data {
                self.fan_out(feature, *p, &owned)?;
            }
        }

        for (owner, s, data) in &session_data {
            for feature in data {
                self.fan_out(feature, *owner, &[*s])?;
            }
        }
        Ok(())
    }

    /// Deliver to population, one player, and the given sessions
    fn fan_out(&mut self, feature: &FeatureData, player: usize, sessions: &[usize]) -> Result<(), ExtractionError> {
        let result = self.population.process_feature_data(feature);
        self.deliver(result)?;
        let result = self.players[player].process_feature_data(feature);
        self.deliver(result)?;
        for &s in sessions {
            let result = self.sessions[s].process_feature_data(feature);
            self.deliver(result)?;
        }
        Ok(())
    }

    fn build_snapshot(&self) -> FeatureSnapshot {
        let players = self.live_players();
        let sessions = players
            .iter()
            .flat_map(|p| self.live_sessions_of(*p))
            .map(|s| self.sessions[s].line())
            .collect();
        let players = players.iter().map(|p| self.players[*p].line()).collect();
        FeatureSnapshot {
            population: self.population.line(),
            players,
            sessions,
        }
    }

    pub fn population_columns(&self) -> Vec<String> {
        self.population.column_names()
    }

    pub fn player_columns(&self) -> Vec<String> {
        self.players[SENTINEL].column_names()
    }

    pub fn session_columns(&self) -> Vec<String> {
        self.sessions[SENTINEL].column_names()
    }

    pub fn population_column_descriptions(&self) -> Vec<ColumnDescription> {
        self.population.column_descriptions()
    }

    pub fn player_column_descriptions(&self) -> Vec<ColumnDescription> {
        self.players[SENTINEL].column_descriptions()
    }

    pub fn session_column_descriptions(&self) -> Vec<ColumnDescription> {
        self.sessions[SENTINEL].column_descriptions()
    }

    pub fn session_lines(&mut self) -> Result<Vec<ExportRow>, ExtractionError> {
        Ok(self.finalize()?.sessions.clone())
    }

    pub fn player_lines(&mut self) -> Result<Vec<ExportRow>, ExtractionError> {
        Ok(self.finalize()?.players.clone())
    }

    pub fn population_lines(&mut self) -> Result<Vec<ExportRow>, ExtractionError> {
        Ok(vec![self.finalize()?.population.clone()])
    }

    /// Drop every session back to the sentinel, at the end of a slice
    ///
    /// Player and population state is untouched, so a cached snapshot stays
    /// valid for them and the next read does not propagate again.
    pub fn clear_session_lines(&mut self) {
        self.reset_sessions();
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.sessions.clear();
        }
    }

    /// Drop every player back to the sentinel, at the end of the run
    pub fn clear_player_lines(&mut self) {
        self.reset_players();
        self.reset_sessions();
        self.snapshot = None;
    }

    pub fn clear_population_lines(&mut self) {
        self.population = PopulationProcessor::new(self.new_registry(&self.population_plan));
        self.snapshot = None;
    }

    /// Live player processors, sentinel excluded unless it received events
    pub fn player_count(&self) -> usize {
        self.players.len() - 1 + usize::from(self.null_player_used)
    }

    /// Live session processors, sentinel excluded unless it received events
    pub fn session_count(&self) -> usize {
        self.sessions.len() - 1 + usize::from(self.null_session_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnabledModes, GeneratorConfig};
    use crate::generators::{
        BuiltinLoader, Detector, Feature, Generator, GeneratorKind, GeneratorParams, LoaderError,
        WithBuiltins,
    };
    use crate::models::FeatureValue;
    use chrono::{TimeZone, Utc};
    use serde_json::{Map, Value};

    /// Sums every value of `source` it is handed
    struct SumOf {
        params: GeneratorParams,
        source: String,
        total: i64,
        deliveries: i64,
    }

    impl Generator for SumOf {
        fn params(&self) -> &GeneratorParams {
            &self.params
        }
        fn event_dependencies(&self, _mode: ExtractionMode) -> Vec<String> {
            Vec::new()
        }
        fn feature_dependencies(&self, _mode: ExtractionMode) -> Vec<String> {
            vec![self.source.clone()]
        }
        fn update_from_event(&mut self, _event: &Event) -> Result<(), ExtractionError> {
            Ok(())
        }
    }

    impl Feature for SumOf {
        fn update_from_feature_data(&mut self, feature: &FeatureData) -> Result<(), ExtractionError> {
            self.total += feature.value().as_i64().unwrap_or(0);
            self.deliveries += 1;
            Ok(())
        }
        fn values(&self) -> Vec<FeatureValue> {
            vec![FeatureValue::Int(self.total), FeatureValue::Int(self.deliveries)]
        }
        fn subfeatures(&self) -> Vec<String> {
            vec!["Deliveries".to_string()]
        }
    }

    struct TestLoader;

    impl GeneratorLoader for TestLoader {
        fn load_feature(
            &self,
            type_name: &str,
            params: GeneratorParams,
            args: &Map<String, Value>,
        ) -> Result<Box<dyn Feature>, LoaderError> {
            match type_name {
                "SumOf" => Ok(Box::new(SumOf {
                    params,
                    source: args.get("source").and_then(Value::as_str).unwrap_or_default().to_string(),
                    total: 0,
                    deliveries: 0,
                })),
                _ => Err(LoaderError::unsupported(GeneratorKind::Feature, type_name)),
            }
        }
        fn load_detector(
            &self,
            type_name: &str,
            _params: GeneratorParams,
            _args: &Map<String, Value>,
        ) -> Result<Box<dyn Detector>, LoaderError> {
            Err(LoaderError::unsupported(GeneratorKind::Detector, type_name))
        }
        fn loader_name(&self) -> &str {
            "test"
        }
    }

    fn make_collection() -> GeneratorCollectionConfig {
        GeneratorCollectionConfig::new("TEST")
            .with_aggregate_extractor(GeneratorConfig::new("Moves", "CountEvent").with_arg("target_event", "move"))
            .with_aggregate_extractor(
                GeneratorConfig::new("MoveTotal", "SumOf")
                    .with_arg("source", "Moves")
                    .with_enabled(EnabledModes::Modes(vec![ExtractionMode::Population])),
            )
    }

    fn make_manager() -> FeatureManager {
        FeatureManager::new(&make_collection(), Arc::new(WithBuiltins::new(TestLoader)), None, false).unwrap()
    }

    fn make_event(session: &str, user: Option<&str>, name: &str) -> Event {
        let mut event = Event::new(session, "GAME", Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(), name);
        event.user_id = user.map(str::to_string);
        event
    }

    #[test]
    fn test_sentinel_columns_before_any_event() {
        // Test: Headers are available before any data arrives
        let manager = make_manager();
        assert_eq!(manager.session_columns(), vec!["PlayerID", "SessionID", "Moves"]);
        assert_eq!(manager.player_columns(), vec!["PlayerID", "SessionCount", "Moves"]);
        assert_eq!(
            manager.population_columns(),
            vec!["PlayerCount", "SessionCount", "MoveTotal", "MoveTotal-Deliveries", "Moves"]
        );
        assert_eq!(manager.player_count(), 0);
        assert_eq!(manager.session_count(), 0);
    }

    #[test]
    fn test_one_processor_per_unit() {
        let mut manager = make_manager();
        manager.process_event(&make_event("S1", Some("P1"), "start")).unwrap();
        manager.process_event(&make_event("S1", Some("P1"), "move")).unwrap();
        manager.process_event(&make_event("S2", Some("P1"), "move")).unwrap();

        assert_eq!(manager.player_count(), 1);
        assert_eq!(manager.session_count(), 2);

        let players = manager.player_lines().unwrap();
        assert_eq!(players, vec![vec!["P1".into(), FeatureValue::Int(2), FeatureValue::Int(2)]]);
    }

    #[test]
    fn test_events_without_user_use_null_player() {
        let mut manager = make_manager();
        manager.process_event(&make_event("S9", None, "move")).unwrap();

        assert_eq!(manager.player_count(), 1);
        let players = manager.player_lines().unwrap();
        assert_eq!(players[0][0], FeatureValue::from(NULL_ID));
        let sessions = manager.session_lines().unwrap();
        assert_eq!(sessions, vec![vec![NULL_ID.into(), "S9".into(), FeatureValue::Int(1)]]);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        // Test: A second finalize without new events does not re-deliver to second-order features
        let mut manager = make_manager();
        manager.process_event(&make_event("S1", Some("P1"), "move")).unwrap();
        manager.process_event(&make_event("S2", Some("P2"), "move")).unwrap();

        let first = manager.population_lines().unwrap();
        let second = manager.population_lines().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_propagation_reaches_population_from_every_level() {
        let mut manager = make_manager();
        manager.process_event(&make_event("S1", Some("P1"), "move")).unwrap();
        manager.process_event(&make_event("S1", Some("P1"), "move")).unwrap();
        manager.process_event(&make_event("S2", Some("P2"), "move")).unwrap();

        let population = manager.population_lines().unwrap().remove(0);
        // population Moves (3) + P1 (2) + P2 (1) + S1 (2) + S2 (1)
        assert_eq!(population[2], FeatureValue::Int(9));
        assert_eq!(population[3], FeatureValue::Int(5));
        assert_eq!(population[4], FeatureValue::Int(3));
    }

    #[test]
    fn test_second_order_values_do_not_propagate() {
        // Test: Echo depends on MoveTotal, which is itself computed from Moves, so Echo gets nothing
        let collection = make_collection().with_aggregate_extractor(
            GeneratorConfig::new("Echo", "SumOf")
                .with_arg("source", "MoveTotal")
                .with_enabled(EnabledModes::Modes(vec![ExtractionMode::Population])),
        );
        let mut manager =
            FeatureManager::new(&collection, Arc::new(WithBuiltins::new(TestLoader)), None, false).unwrap();
        manager.process_event(&make_event("S1", Some("P1"), "move")).unwrap();

        let columns = manager.population_columns();
        let population = manager.population_lines().unwrap().remove(0);
        let column = |name: &str| {
            let idx = columns.iter().position(|c| c == name).unwrap();
            population[idx].clone()
        };
        assert_eq!(column("MoveTotal"), FeatureValue::Int(3));
        assert_eq!(column("Echo"), FeatureValue::Int(0));
        assert_eq!(column("Echo-Deliveries"), FeatureValue::Int(0));
    }

    #[test]
    fn test_unused_sentinels_receive_nothing() {
        // Test: Only P1 and S1 are live; the "null" player gets no population values
        let collection = GeneratorCollectionConfig::new("TEST")
            .with_aggregate_extractor(GeneratorConfig::new("Moves", "CountEvent").with_arg("target_event", "move"))
            .with_aggregate_extractor(
                GeneratorConfig::new("Echo", "SumOf")
                    .with_arg("source", "Moves")
                    .with_enabled(EnabledModes::Modes(vec![ExtractionMode::Player])),
            );
        let mut manager =
            FeatureManager::new(&collection, Arc::new(WithBuiltins::new(TestLoader)), None, false).unwrap();
        manager.process_event(&make_event("S1", Some("P1"), "move")).unwrap();

        let columns = manager.player_columns();
        let deliveries = columns.iter().position(|c| c == "Echo-Deliveries").unwrap();
        let players = manager.player_lines().unwrap();
        assert_eq!(players.len(), 1);
        // population, P1 and S1 values
        assert_eq!(players[0][deliveries], FeatureValue::Int(3));
        assert_eq!(manager.players[SENTINEL].line()[deliveries], FeatureValue::Int(0));
    }

    #[test]
    fn test_clearing_sessions_does_not_propagate_again() {
        // Test: Session rows read mid-run, then population at the end, deliver once
        let mut manager = make_manager();
        manager.process_event(&make_event("S1", Some("P1"), "move")).unwrap();

        assert_eq!(manager.session_lines().unwrap().len(), 1);
        manager.clear_session_lines();

        let population = manager.population_lines().unwrap().remove(0);
        // population (1) + P1 (1) + S1 (1), delivered in a single pass
        assert_eq!(population[2], FeatureValue::Int(3));
        assert_eq!(population[3], FeatureValue::Int(3));
    }

    #[test]
    fn test_clear_session_lines_keeps_players() {
        let mut manager = make_manager();
        manager.process_event(&make_event("S1", Some("P1"), "move")).unwrap();
        manager.clear_session_lines();

        assert_eq!(manager.session_count(), 0);
        assert!(manager.session_lines().unwrap().is_empty());
        assert_eq!(manager.player_count(), 1);

        manager.clear_player_lines();
        assert_eq!(manager.player_count(), 0);
    }

    #[test]
    fn test_fail_fast_plan_rejects_unknown_type() {
        let collection = make_collection()
            .with_aggregate_extractor(GeneratorConfig::new("Ghost", "Phantom"));
        let result = FeatureManager::new(&collection, Arc::new(BuiltinLoader), None, true);
        assert!(result.is_err());
    }
}
