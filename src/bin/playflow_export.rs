//! Export Binary - batch feature export for one game
//!
//! Reads stored events, runs the game's detectors and extractors and writes
//! the requested modes to TSV files or SQLite tables.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin playflow_export -- --backend sqlite
//! ```
//!
//! ## Environment Variables
//!
//! - PLAYFLOW_GAME_ID - Game to export (required)
//! - PLAYFLOW_EVENTS_PATH - Event source, `.jsonl` file or SQLite database (default: data/events.db)
//! - PLAYFLOW_GENERATORS_PATH - Generator collection JSON (optional; without it only raw events export)
//! - PLAYFLOW_OUTPUT_PATH - TSV directory or SQLite file (default: exports or exports/playflow.db)
//! - PLAYFLOW_EXPORT_MODES - Comma list of events, all_events, session, player, population (default: all)
//! - PLAYFLOW_SESSIONS - Comma list of session ids (optional; default: every session)
//! - PLAYFLOW_BATCH_SIZE, PLAYFLOW_FAIL_FAST, PLAYFLOW_MAX_GENERATED_EVENTS - see ExportConfig
//! - RUST_LOG - Logging level (optional, default: info)

use playflow::config::{parse_backend_from_args, BackendType, ExportConfig, GeneratorCollectionConfig};
use playflow::generators::BuiltinLoader;
use playflow::models::{ExportMode, IdMode};
use playflow::outerface::outerface_for_backend;
use playflow::storage::{EventStorage, JsonlEventReader, SqliteEventReader};
use playflow::{ExportManager, ExportRange, ExportRequest};
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
struct ExportCliConfig {
    backend: BackendType,
    game_id: String,
    events_path: PathBuf,
    generators_path: Option<PathBuf>,
    output_path: PathBuf,
    modes: BTreeSet<ExportMode>,
    sessions: Option<Vec<String>>,
}

fn comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl ExportCliConfig {
    fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let backend = parse_backend_from_args();

        let game_id = env::var("PLAYFLOW_GAME_ID").map_err(|_| "PLAYFLOW_GAME_ID must be set")?;

        let output_path = env::var("PLAYFLOW_OUTPUT_PATH").unwrap_or_else(|_| match backend {
            BackendType::Sqlite => "exports/playflow.db".to_string(),
            BackendType::Tsv => "exports".to_string(),
        });

        let modes = match env::var("PLAYFLOW_EXPORT_MODES") {
            Ok(raw) => {
                let mut modes = BTreeSet::new();
                for name in comma_list(&raw) {
                    let mode = ExportMode::from_str(&name).ok_or_else(|| format!("Unknown export mode '{}'", name))?;
                    modes.insert(mode);
                }
                modes
            }
            Err(_) => ExportMode::all().into_iter().collect(),
        };

        Ok(Self {
            backend,
            game_id,
            events_path: env::var("PLAYFLOW_EVENTS_PATH")
                .unwrap_or_else(|_| "data/events.db".to_string())
                .into(),
            generators_path: env::var("PLAYFLOW_GENERATORS_PATH").ok().map(PathBuf::from),
            output_path: output_path.into(),
            modes,
            sessions: env::var("PLAYFLOW_SESSIONS").ok().map(|raw| comma_list(&raw)),
        })
    }
}

fn open_storage(
    path: &Path,
    game_id: &str,
    fail_fast: bool,
) -> Result<Box<dyn EventStorage>, Box<dyn std::error::Error>> {
    let is_jsonl = path
        .extension()
        .map(|ext| ext == "jsonl" || ext == "json")
        .unwrap_or(false);
    if is_jsonl {
        Ok(Box::new(JsonlEventReader::new(path, game_id, fail_fast)))
    } else {
        Ok(Box::new(SqliteEventReader::new(path, game_id, fail_fast)?))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let cli = ExportCliConfig::from_env()?;
    let export_config = ExportConfig::from_env();

    log::info!("🚀 Starting playflow export for {}", cli.game_id);
    log::info!("   Events: {}", cli.events_path.display());
    log::info!("   Output: {} ({:?})", cli.output_path.display(), cli.backend);
    log::info!("   Batch size: {}", export_config.batch_size);
    log::info!("   Fail fast: {}", export_config.fail_fast);

    let fail_fast = export_config.fail_fast;
    let mut manager = ExportManager::new(export_config);

    match &cli.generators_path {
        Some(path) => {
            let collection = GeneratorCollectionConfig::from_file(&cli.game_id, path)?;
            manager.register_game(collection, Arc::new(BuiltinLoader));
        }
        None => log::warn!("⚠️  PLAYFLOW_GENERATORS_PATH not set; exporting raw events only"),
    }

    if let (BackendType::Tsv, false) = (&cli.backend, cli.output_path.exists()) {
        std::fs::create_dir_all(&cli.output_path)?;
    }
    if let (BackendType::Sqlite, Some(parent)) = (&cli.backend, cli.output_path.parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let storage = open_storage(&cli.events_path, &cli.game_id, fail_fast)?;
    let outerface = outerface_for_backend(cli.backend.clone(), &cli.game_id, &cli.output_path, cli.modes.clone())?;

    let range = match cli.sessions.clone() {
        Some(ids) => ExportRange::sessions(ids),
        None => ExportRange::all(IdMode::Session),
    };
    let mut request = ExportRequest::new(&cli.game_id, range, storage)
        .with_modes(cli.modes.iter().copied())
        .with_outerface(outerface);

    let result = manager.execute(&mut request).await;

    log::info!("📊 {}", result.message);
    log::info!(
        "   {} sessions, {} events processed, {} failed, {} generated in {:.2?}",
        result.session_count,
        result.events_processed,
        result.events_failed,
        result.generated_events,
        result.duration
    );

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
