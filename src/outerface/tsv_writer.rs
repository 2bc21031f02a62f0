//! TSV outerface - one `{game}_{mode}.tsv` file per export mode
//!
//! Column descriptions collected from the headers are written to
//! `{game}_README.md` on close.

use super::{Outerface, OuterfaceError};
use crate::models::{ColumnDescription, ExportMode, ExportRow, FeatureValue};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct TsvOuterface {
    base_path: PathBuf,
    game_id: String,
    modes: BTreeSet<ExportMode>,
    writers: HashMap<ExportMode, BufWriter<File>>,
    descriptions: BTreeMap<ExportMode, Vec<ColumnDescription>>,
}

impl TsvOuterface {
    pub fn new(base_path: impl Into<PathBuf>, game_id: &str, modes: BTreeSet<ExportMode>) -> Self {
        Self {
            base_path: base_path.into(),
            game_id: game_id.to_string(),
            modes,
            writers: HashMap::new(),
            descriptions: BTreeMap::new(),
        }
    }

    pub fn file_path(&self, mode: ExportMode) -> PathBuf {
        tsv_path(&self.base_path, &self.game_id, mode)
    }

    fn writer(&mut self, mode: ExportMode) -> Result<&mut BufWriter<File>, OuterfaceError> {
        self.writers.get_mut(&mode).ok_or_else(|| {
            OuterfaceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No open TSV file for mode {}", mode),
            ))
        })
    }

    pub fn readme_path(&self) -> PathBuf {
        self.base_path.join(format!("{}_README.md", self.game_id))
    }

    /// One section per described mode, in mode order
    fn write_readme(&mut self) -> Result<(), OuterfaceError> {
        if self.descriptions.is_empty() {
            return Ok(());
        }
        let path = self.readme_path();
        let mut readme = BufWriter::new(File::create(&path)?);
        writeln!(readme, "# Game: {}", self.game_id)?;
        for (mode, columns) in &self.descriptions {
            writeln!(readme)?;
            writeln!(readme, "## {}", mode)?;
            writeln!(readme)?;
            writeln!(readme, "| Column | Description |")?;
            writeln!(readme, "|---|---|")?;
            for column in columns {
                writeln!(readme, "| {} | {} |", markdown_cell(&column.name), markdown_cell(&column.description))?;
            }
        }
        readme.flush()?;
        log::info!("📝 Wrote column descriptions to: {}", path.display());
        self.descriptions.clear();
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Tabs and line breaks inside a cell would shift columns
fn cell(value: &FeatureValue) -> String {
    value
        .to_string()
        .replace(['\t', '\n'], " ")
        .replace('\r', "")
}

fn markdown_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn write_record<W: Write>(writer: &mut W, cells: impl Iterator<Item = String>) -> std::io::Result<()> {
    let line: Vec<String> = cells.collect();
    writeln!(writer, "{}", line.join("\t"))
}

#[async_trait]
impl Outerface for TsvOuterface {
    fn export_modes(&self) -> &BTreeSet<ExportMode> {
        &self.modes
    }

    fn remove_export_mode(&mut self, mode: ExportMode) {
        self.modes.remove(&mode);
        self.writers.remove(&mode);
    }

    async fn open(&mut self) -> Result<(), OuterfaceError> {
        std::fs::create_dir_all(&self.base_path)?;
        let modes: Vec<ExportMode> = self.modes.iter().copied().collect();
        for mode in modes {
            let path = self.file_path(mode);
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)?;
            log::info!("📝 Writing {} rows to: {}", mode, path.display());
            self.writers.insert(mode, BufWriter::new(file));
        }
        Ok(())
    }

    async fn write_header(&mut self, columns: &[String], mode: ExportMode) -> Result<(), OuterfaceError> {
        let writer = self.writer(mode)?;
        write_record(writer, columns.iter().map(|c| c.replace(['\t', '\n'], " ")))?;
        Ok(())
    }

    async fn write_column_descriptions(
        &mut self,
        columns: &[ColumnDescription],
        mode: ExportMode,
    ) -> Result<(), OuterfaceError> {
        if self.modes.contains(&mode) {
            self.descriptions.insert(mode, columns.to_vec());
        }
        Ok(())
    }

    async fn write_lines(&mut self, rows: &[ExportRow], mode: ExportMode) -> Result<(), OuterfaceError> {
        let writer = self.writer(mode)?;
        for row in rows {
            write_record(writer, row.iter().map(cell))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), OuterfaceError> {
        self.flush()?;
        self.writers.clear();
        self.write_readme()
    }

    fn backend_type(&self) -> &'static str {
        "TSV"
    }
}

impl Drop for TsvOuterface {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::error!("Failed to flush TSV files for {}: {}", self.game_id, e);
        }
    }
}

/// Where the TSV file of one mode lands
pub fn tsv_path(base_path: &Path, game_id: &str, mode: ExportMode) -> PathBuf {
    base_path.join(format!("{}_{}.tsv", game_id, mode.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_writes_one_file_per_mode() {
        let dir = tempdir().unwrap();
        let modes = BTreeSet::from([ExportMode::Session, ExportMode::Population]);
        let mut tsv = TsvOuterface::new(dir.path(), "LAKELAND", modes);
        tsv.open().await.unwrap();

        tsv.write_header(&["SessionID".to_string(), "Moves".to_string()], ExportMode::Session)
            .await
            .unwrap();
        tsv.write_lines(
            &[vec![FeatureValue::from("S1"), FeatureValue::Int(3)], vec![FeatureValue::from("a\tb"), FeatureValue::Null]],
            ExportMode::Session,
        )
        .await
        .unwrap();
        tsv.close().await.unwrap();

        let content = std::fs::read_to_string(tsv_path(dir.path(), "LAKELAND", ExportMode::Session)).unwrap();
        assert_eq!(content, "SessionID\tMoves\nS1\t3\na b\t\n");
        assert!(tsv_path(dir.path(), "LAKELAND", ExportMode::Population).exists());
        assert!(!tsv_path(dir.path(), "LAKELAND", ExportMode::Player).exists());
    }

    #[tokio::test]
    async fn test_readme_lists_described_columns() {
        // Test: Descriptions handed over with the headers end up in the README on close
        let dir = tempdir().unwrap();
        let modes = BTreeSet::from([ExportMode::Session, ExportMode::Player]);
        let mut tsv = TsvOuterface::new(dir.path(), "LAKELAND", modes);
        tsv.open().await.unwrap();

        let session = vec![
            ColumnDescription::new("SessionID", "Session the row belongs to"),
            ColumnDescription::new("Moves", "Moves made | per session"),
        ];
        tsv.write_header(&["SessionID".to_string(), "Moves".to_string()], ExportMode::Session)
            .await
            .unwrap();
        tsv.write_column_descriptions(&session, ExportMode::Session).await.unwrap();
        tsv.write_column_descriptions(&[ColumnDescription::new("X", "")], ExportMode::Events)
            .await
            .unwrap();
        assert!(!tsv.readme_path().exists());
        tsv.close().await.unwrap();

        let readme = std::fs::read_to_string(dir.path().join("LAKELAND_README.md")).unwrap();
        assert!(readme.starts_with("# Game: LAKELAND\n"));
        assert!(readme.contains("## session\n"));
        assert!(readme.contains("| SessionID | Session the row belongs to |"));
        assert!(readme.contains("| Moves | Moves made \\| per session |"));
        assert!(!readme.contains("## events"));
        assert!(!readme.contains("## player"));
    }

    #[tokio::test]
    async fn test_unaccepted_mode_errors() {
        let dir = tempdir().unwrap();
        let mut tsv = TsvOuterface::new(dir.path(), "G", BTreeSet::from([ExportMode::Events]));
        tsv.open().await.unwrap();
        tsv.remove_export_mode(ExportMode::Events);
        assert!(!tsv.accepts(ExportMode::Events));
        assert!(tsv.write_lines(&[], ExportMode::Events).await.is_err());
    }
}
