//! Outerfaces - destinations for exported rows
//!
//! ```text
//! ExportManager ──→ open()
//!               ──→ write_header(columns, mode)   once per enabled mode
//!               ──→ write_column_descriptions()   right after each header
//!               ──→ write_lines(rows, mode)       per slice / post-process
//!               ──→ close()
//! ```
//!
//! Each outerface declares the modes it accepts; the manager never sends
//! it rows of any other mode.

pub mod memory;
pub mod sqlite_writer;
pub mod tsv_writer;

pub use memory::{ExportTables, MemoryOuterface};
pub use sqlite_writer::SqliteOuterface;
pub use tsv_writer::TsvOuterface;

use crate::config::BackendType;
use crate::models::{ColumnDescription, ExportMode, ExportRow};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug)]
pub enum OuterfaceError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Database(String),
}

impl From<std::io::Error> for OuterfaceError {
    fn from(err: std::io::Error) -> Self {
        OuterfaceError::Io(err)
    }
}

impl From<serde_json::Error> for OuterfaceError {
    fn from(err: serde_json::Error) -> Self {
        OuterfaceError::Serialization(err)
    }
}

impl From<rusqlite::Error> for OuterfaceError {
    fn from(err: rusqlite::Error) -> Self {
        OuterfaceError::Database(err.to_string())
    }
}

impl std::fmt::Display for OuterfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OuterfaceError::Io(e) => write!(f, "IO error: {}", e),
            OuterfaceError::Serialization(e) => write!(f, "Serialization error: {}", e),
            OuterfaceError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for OuterfaceError {}

/// Backend trait for export destinations
#[async_trait]
pub trait Outerface: Send {
    /// Modes this outerface accepts
    fn export_modes(&self) -> &BTreeSet<ExportMode>;

    /// Stop accepting a mode, e.g. when no generator loader is available
    fn remove_export_mode(&mut self, mode: ExportMode);

    fn accepts(&self, mode: ExportMode) -> bool {
        self.export_modes().contains(&mode)
    }

    async fn open(&mut self) -> Result<(), OuterfaceError>;

    async fn write_header(&mut self, columns: &[String], mode: ExportMode) -> Result<(), OuterfaceError>;

    /// Document the columns of a mode; outerfaces without a README ignore it
    async fn write_column_descriptions(
        &mut self,
        _columns: &[ColumnDescription],
        _mode: ExportMode,
    ) -> Result<(), OuterfaceError> {
        Ok(())
    }

    async fn write_lines(&mut self, rows: &[ExportRow], mode: ExportMode) -> Result<(), OuterfaceError>;

    /// Flush and release resources; rows written so far stay
    async fn close(&mut self) -> Result<(), OuterfaceError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// Build a file-backed outerface for the selected backend
///
/// TSV writes one file per mode under `output_path`; SQLite writes one
/// table per mode into the database at `output_path`.
pub fn outerface_for_backend(
    backend: BackendType,
    game_id: &str,
    output_path: &Path,
    modes: BTreeSet<ExportMode>,
) -> Result<Box<dyn Outerface>, OuterfaceError> {
    match backend {
        BackendType::Tsv => Ok(Box::new(TsvOuterface::new(output_path, game_id, modes))),
        BackendType::Sqlite => Ok(Box::new(SqliteOuterface::new(output_path, game_id, modes)?)),
    }
}
