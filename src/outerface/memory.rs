//! In-memory outerface; the tables handle stays readable after the run

use super::{Outerface, OuterfaceError};
use crate::models::{ExportMode, ExportRow};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default, Clone)]
pub struct ExportTables {
    pub headers: HashMap<ExportMode, Vec<String>>,
    pub rows: HashMap<ExportMode, Vec<ExportRow>>,
    pub opened: bool,
    pub closed: bool,
}

impl ExportTables {
    pub fn rows(&self, mode: ExportMode) -> &[ExportRow] {
        self.rows.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn header(&self, mode: ExportMode) -> Option<&[String]> {
        self.headers.get(&mode).map(Vec::as_slice)
    }

    /// Index of a column in a mode's header
    pub fn column(&self, mode: ExportMode, name: &str) -> Option<usize> {
        self.header(mode)?.iter().position(|c| c == name)
    }
}

pub struct MemoryOuterface {
    modes: BTreeSet<ExportMode>,
    tables: Arc<Mutex<ExportTables>>,
}

impl MemoryOuterface {
    pub fn new(modes: BTreeSet<ExportMode>) -> Self {
        Self {
            modes,
            tables: Arc::new(Mutex::new(ExportTables::default())),
        }
    }

    /// Shared handle to what has been written
    pub fn tables(&self) -> Arc<Mutex<ExportTables>> {
        Arc::clone(&self.tables)
    }

    fn lock(&self) -> MutexGuard<'_, ExportTables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Outerface for MemoryOuterface {
    fn export_modes(&self) -> &BTreeSet<ExportMode> {
        &self.modes
    }

    fn remove_export_mode(&mut self, mode: ExportMode) {
        self.modes.remove(&mode);
    }

    async fn open(&mut self) -> Result<(), OuterfaceError> {
        self.lock().opened = true;
        Ok(())
    }

    async fn write_header(&mut self, columns: &[String], mode: ExportMode) -> Result<(), OuterfaceError> {
        self.lock().headers.insert(mode, columns.to_vec());
        Ok(())
    }

    async fn write_lines(&mut self, rows: &[ExportRow], mode: ExportMode) -> Result<(), OuterfaceError> {
        self.lock().rows.entry(mode).or_default().extend_from_slice(rows);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), OuterfaceError> {
        self.lock().closed = true;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "Memory"
    }
}
