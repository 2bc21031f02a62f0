//! SQLite outerface - one `{game}_{mode}` table per export mode
//!
//! Tables are recreated by `write_header`; cells keep SQLite's dynamic
//! typing so ints stay ints and text stays text.

use super::{Outerface, OuterfaceError};
use crate::models::{ExportMode, ExportRow, FeatureValue};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

pub struct SqliteOuterface {
    conn: Connection,
    game_id: String,
    modes: BTreeSet<ExportMode>,
    widths: HashMap<ExportMode, usize>,
}

impl SqliteOuterface {
    pub fn new(db_path: impl AsRef<Path>, game_id: &str, modes: BTreeSet<ExportMode>) -> Result<Self, OuterfaceError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(Self::from_connection(conn, game_id, modes))
    }

    pub fn from_connection(conn: Connection, game_id: &str, modes: BTreeSet<ExportMode>) -> Self {
        Self {
            conn,
            game_id: game_id.to_string(),
            modes,
            widths: HashMap::new(),
        }
    }

    pub fn table_name(&self, mode: ExportMode) -> String {
        format!("{}_{}", self.game_id, mode.as_str())
    }

    /// Borrow the connection, e.g. to read results back in tests
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql_value(value: &FeatureValue) -> SqlValue {
    match value {
        FeatureValue::Null => SqlValue::Null,
        FeatureValue::Bool(v) => SqlValue::Integer(i64::from(*v)),
        FeatureValue::Int(v) => SqlValue::Integer(*v),
        FeatureValue::Float(v) => SqlValue::Real(*v),
        FeatureValue::Text(v) => SqlValue::Text(v.clone()),
        FeatureValue::Timestamp(v) => SqlValue::Text(v.to_rfc3339()),
        FeatureValue::Json(v) => SqlValue::Text(v.to_string()),
    }
}

#[async_trait]
impl Outerface for SqliteOuterface {
    fn export_modes(&self) -> &BTreeSet<ExportMode> {
        &self.modes
    }

    fn remove_export_mode(&mut self, mode: ExportMode) {
        self.modes.remove(&mode);
        self.widths.remove(&mode);
    }

    async fn open(&mut self) -> Result<(), OuterfaceError> {
        log::info!("✅ SQLite outerface ready for {} ({} modes)", self.game_id, self.modes.len());
        Ok(())
    }

    async fn write_header(&mut self, columns: &[String], mode: ExportMode) -> Result<(), OuterfaceError> {
        let table = quote_ident(&self.table_name(mode));
        let column_defs: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({cols});",
            table = table,
            cols = column_defs.join(", ")
        ))?;
        self.widths.insert(mode, columns.len());
        log::info!("📝 Writing {} rows to table {}", mode, table);
        Ok(())
    }

    async fn write_lines(&mut self, rows: &[ExportRow], mode: ExportMode) -> Result<(), OuterfaceError> {
        let width = *self
            .widths
            .get(&mode)
            .ok_or_else(|| OuterfaceError::Database(format!("No table created for mode {}", mode)))?;
        if rows.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(&self.table_name(mode)),
            vec!["?"; width].join(", ")
        );

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for row in rows {
                if row.len() != width {
                    return Err(OuterfaceError::Database(format!(
                        "Row has {} values but {} has {} columns",
                        row.len(),
                        mode,
                        width
                    )));
                }
                stmt.execute(params_from_iter(row.iter().map(to_sql_value)))?;
            }
        }
        tx.commit()?;

        log::debug!("✅ {} {} rows written", rows.len(), mode);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), OuterfaceError> {
        self.conn.execute_batch("PRAGMA optimize;")?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_table_per_mode() {
        let dir = tempdir().unwrap();
        let mut out = SqliteOuterface::new(
            dir.path().join("export.db"),
            "LAKELAND",
            BTreeSet::from([ExportMode::Player]),
        )
        .unwrap();
        out.open().await.unwrap();
        out.write_header(&["PlayerID".to_string(), "Moves".to_string()], ExportMode::Player)
            .await
            .unwrap();
        out.write_lines(
            &[
                vec![FeatureValue::from("P1"), FeatureValue::Int(4)],
                vec![FeatureValue::from("P2"), FeatureValue::Null],
            ],
            ExportMode::Player,
        )
        .await
        .unwrap();
        out.close().await.unwrap();

        let rows: Vec<(String, Option<i64>)> = out
            .connection()
            .prepare("SELECT PlayerID, Moves FROM LAKELAND_player ORDER BY PlayerID")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows, vec![("P1".to_string(), Some(4)), ("P2".to_string(), None)]);
    }

    #[tokio::test]
    async fn test_row_width_mismatch_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let mut out = SqliteOuterface::from_connection(conn, "G", BTreeSet::from([ExportMode::Session]));
        out.write_header(&["SessionID".to_string()], ExportMode::Session).await.unwrap();
        let result = out
            .write_lines(&[vec![FeatureValue::from("S1"), FeatureValue::Int(1)]], ExportMode::Session)
            .await;
        assert!(matches!(result, Err(OuterfaceError::Database(_))));
    }
}
