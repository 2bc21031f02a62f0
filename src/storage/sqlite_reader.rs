//! SQLite event reader
//!
//! Reads the `events` table one slice of ids at a time. Rows that cannot
//! be turned into an [`Event`] are skipped with a warning, or fail the
//! slice under fail-fast.

use super::{order_events, EventFilter, EventStorage, StorageError};
use crate::models::{Event, EventSource, IdMode};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::{Map, Value};
use std::path::Path;

/// Ids bound per query, below SQLite's host parameter limit
const MAX_IDS_PER_QUERY: usize = 500;

/// Column list shared by the reader and the schema helper
const EVENT_COLUMNS: &str = "session_id, app_id, timestamp, event_name, event_data, event_source,
     app_version, app_branch, log_version, time_offset, user_id, user_data, game_state,
     event_sequence_index";

/// Raw text of one row, converted outside the rusqlite closure
struct RawEvent {
    session_id: Option<String>,
    app_id: Option<String>,
    timestamp: Option<String>,
    event_name: Option<String>,
    event_data: Option<String>,
    event_source: Option<String>,
    app_version: Option<String>,
    app_branch: Option<String>,
    log_version: Option<String>,
    time_offset: Option<String>,
    user_id: Option<String>,
    user_data: Option<String>,
    game_state: Option<String>,
    event_sequence_index: Option<String>,
}

pub struct SqliteEventReader {
    conn: Connection,
    app_id: String,
    fail_fast: bool,
}

impl SqliteEventReader {
    pub fn new(db_path: impl AsRef<Path>, app_id: &str, fail_fast: bool) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        conn.execute("PRAGMA query_only = ON", [])?;
        log::info!("📥 SQLite event reader opened for {}", app_id);
        Ok(Self::from_connection(conn, app_id, fail_fast))
    }

    pub fn from_connection(conn: Connection, app_id: &str, fail_fast: bool) -> Self {
        Self {
            conn,
            app_id: app_id.to_string(),
            fail_fast,
        }
    }

    /// Schema the reader expects
    pub fn create_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                session_id TEXT NOT NULL,
                app_id TEXT,
                timestamp TEXT NOT NULL,
                event_name TEXT NOT NULL,
                event_data TEXT,
                event_source TEXT,
                app_version TEXT,
                app_branch TEXT,
                log_version TEXT,
                time_offset TEXT,
                user_id TEXT,
                user_data TEXT,
                game_state TEXT,
                event_sequence_index INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);
            CREATE INDEX IF NOT EXISTS idx_events_user ON events(user_id);",
        )?;
        Ok(())
    }

    fn id_column(mode: IdMode) -> &'static str {
        match mode {
            IdMode::Session => "session_id",
            IdMode::User => "user_id",
        }
    }
}

/// Any scalar column as text; integer versions and ids are common
fn text_column(row: &Row, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_map(column: &str, raw: Option<String>) -> Result<Map<String, Value>, StorageError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(Map::new()),
        Some(text) => match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(StorageError::Malformed(format!("{} is not an object: {}", column, other))),
        },
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Sequence index stored as an integer, or as text holding one
fn parse_index(raw: Option<String>, session_id: &str) -> Result<Option<i64>, StorageError> {
    let Some(text) = blank_to_none(raw) else {
        return Ok(None);
    };
    let text = text.trim();
    if let Ok(index) = text.parse::<i64>() {
        return Ok(Some(index));
    }
    match text.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 => Ok(Some(f as i64)),
        _ => Err(StorageError::Malformed(format!(
            "bad event_sequence_index '{}' in session {}",
            text, session_id
        ))),
    }
}

impl RawEvent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: text_column(row, 0)?,
            app_id: text_column(row, 1)?,
            timestamp: text_column(row, 2)?,
            event_name: text_column(row, 3)?,
            event_data: text_column(row, 4)?,
            event_source: text_column(row, 5)?,
            app_version: text_column(row, 6)?,
            app_branch: text_column(row, 7)?,
            log_version: text_column(row, 8)?,
            time_offset: text_column(row, 9)?,
            user_id: text_column(row, 10)?,
            user_data: text_column(row, 11)?,
            game_state: text_column(row, 12)?,
            event_sequence_index: text_column(row, 13)?,
        })
    }

    fn into_event(self) -> Result<Event, StorageError> {
        let session_id = blank_to_none(self.session_id)
            .ok_or_else(|| StorageError::Malformed("missing session_id".to_string()))?;
        let event_name = blank_to_none(self.event_name)
            .ok_or_else(|| StorageError::Malformed(format!("missing event_name in session {}", session_id)))?;
        let raw_ts = self.timestamp.unwrap_or_default();
        let timestamp = parse_timestamp(&raw_ts)
            .ok_or_else(|| StorageError::Malformed(format!("bad timestamp '{}' in session {}", raw_ts, session_id)))?;

        let event_source = match self.event_source.as_deref() {
            Some("GENERATED") => EventSource::Generated,
            _ => EventSource::Game,
        };

        Ok(Event {
            app_id: self.app_id.unwrap_or_default(),
            timestamp,
            event_name,
            event_data: parse_map("event_data", self.event_data)?,
            event_source,
            app_version: blank_to_none(self.app_version),
            app_branch: blank_to_none(self.app_branch),
            log_version: blank_to_none(self.log_version),
            time_offset: blank_to_none(self.time_offset),
            user_id: blank_to_none(self.user_id),
            user_data: parse_map("user_data", self.user_data)?,
            game_state: parse_map("game_state", self.game_state)?,
            event_sequence_index: parse_index(self.event_sequence_index, &session_id)?,
            session_id,
        })
    }
}

#[async_trait]
impl EventStorage for SqliteEventReader {
    async fn all_ids(&mut self, mode: IdMode) -> Result<Vec<String>, StorageError> {
        let column = Self::id_column(mode);
        let sql = format!(
            "SELECT DISTINCT {col} FROM events WHERE {col} IS NOT NULL ORDER BY {col} ASC",
            col = column
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| text_column(row, 0))?
            .filter_map(|id| id.transpose())
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    async fn events_for_ids(
        &mut self,
        ids: &[String],
        mode: IdMode,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {} FROM events WHERE {} IN ({})",
                EVENT_COLUMNS,
                Self::id_column(mode),
                placeholders
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let chunk_rows = stmt
                .query_map(params_from_iter(chunk.iter()), RawEvent::from_row)?
                .collect::<Result<Vec<RawEvent>, _>>()?;
            rows.extend(chunk_rows);
        }

        let mut events = Vec::with_capacity(rows.len());
        for raw in rows {
            match raw.into_event() {
                Ok(event) => {
                    if filter.admits(&event) {
                        events.push(event);
                    }
                }
                Err(e) if self.fail_fast => return Err(e),
                Err(e) => log::warn!("⚠️  Skipping event row: {}", e),
            }
        }

        order_events(&mut events, &self.app_id);
        log::debug!("📥 Read {} events for {} ids", events.len(), ids.len());
        Ok(events)
    }

    fn storage_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;
    use tempfile::tempdir;

    fn make_db(path: &Path) -> Connection {
        let conn = Connection::open(path).unwrap();
        SqliteEventReader::create_schema(&conn).unwrap();
        conn
    }

    fn insert(conn: &Connection, session: &str, user: &str, ts: &str, name: &str, version: i64, index: Option<i64>) {
        conn.execute(
            "INSERT INTO events (session_id, timestamp, event_name, event_data, user_id, log_version, event_sequence_index)
             VALUES (?1, ?2, ?3, '{\"x\": 1}', ?4, ?5, ?6)",
            params![session, ts, name, user, version, index],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_read_slice_in_session_order() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("events.db");
        let conn = make_db(&db_path);
        insert(&conn, "S2", "P1", "2024-01-01T00:00:05Z", "end", 1, Some(2));
        insert(&conn, "S1", "P1", "2024-01-01 00:00:01", "start", 1, Some(1));
        insert(&conn, "S2", "P1", "2024-01-01T00:00:03Z", "start", 1, Some(1));
        insert(&conn, "S3", "P2", "2024-01-01T00:00:03Z", "start", 1, None);
        drop(conn);

        let mut reader = SqliteEventReader::new(&db_path, "GAME", false).unwrap();
        assert_eq!(reader.all_ids(IdMode::Session).await.unwrap(), vec!["S1", "S2", "S3"]);
        assert_eq!(reader.all_ids(IdMode::User).await.unwrap(), vec!["P1", "P2"]);

        let ids = vec!["S2".to_string(), "S1".to_string()];
        let events = reader
            .events_for_ids(&ids, IdMode::Session, &EventFilter::default())
            .await
            .unwrap();

        let order: Vec<(&str, &str)> = events
            .iter()
            .map(|e| (e.session_id.as_str(), e.event_name.as_str()))
            .collect();
        assert_eq!(order, vec![("S1", "start"), ("S2", "start"), ("S2", "end")]);
        assert_eq!(events[0].app_id, "GAME");
        assert_eq!(events[0].log_version.as_deref(), Some("1"));
        assert_eq!(events[0].event_data.get("x"), Some(&Value::from(1)));
    }

    #[tokio::test]
    async fn test_malformed_rows_skipped_or_fatal() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("events.db");
        let conn = make_db(&db_path);
        insert(&conn, "S1", "P1", "2024-01-01T00:00:01Z", "start", 1, Some(1));
        insert(&conn, "S1", "P1", "not a time", "move", 1, Some(2));
        drop(conn);

        let ids = vec!["S1".to_string()];
        let mut lenient = SqliteEventReader::new(&db_path, "GAME", false).unwrap();
        let events = lenient
            .events_for_ids(&ids, IdMode::Session, &EventFilter::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);

        let mut strict = SqliteEventReader::new(&db_path, "GAME", true).unwrap();
        let result = strict
            .events_for_ids(&ids, IdMode::Session, &EventFilter::default())
            .await;
        assert!(matches!(result, Err(StorageError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_non_integer_index_is_a_malformed_row() {
        // Test: A text sequence index skips that row only, or fails under fail-fast
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("events.db");
        let conn = make_db(&db_path);
        insert(&conn, "S1", "P1", "2024-01-01T00:00:01Z", "start", 1, Some(1));
        conn.execute(
            "INSERT INTO events (session_id, timestamp, event_name, user_id, event_sequence_index)
             VALUES ('S1', '2024-01-01T00:00:02Z', 'move', 'P1', 'abc')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO events (session_id, timestamp, event_name, user_id, event_sequence_index)
             VALUES ('S1', '2024-01-01T00:00:03Z', 'end', 'P1', '3')",
            [],
        )
        .unwrap();
        drop(conn);

        let ids = vec!["S1".to_string()];
        let mut lenient = SqliteEventReader::new(&db_path, "GAME", false).unwrap();
        let events = lenient
            .events_for_ids(&ids, IdMode::Session, &EventFilter::default())
            .await
            .unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.event_name.as_str()).collect();
        assert_eq!(names, vec!["start", "end"]);
        assert_eq!(events[1].event_sequence_index, Some(3));

        let mut strict = SqliteEventReader::new(&db_path, "GAME", true).unwrap();
        let result = strict
            .events_for_ids(&ids, IdMode::Session, &EventFilter::default())
            .await;
        assert!(matches!(result, Err(StorageError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_large_slice_spans_several_queries() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("events.db");
        let conn = make_db(&db_path);
        let ids: Vec<String> = (0..MAX_IDS_PER_QUERY * 2 + 7).map(|i| format!("S{:05}", i)).collect();
        conn.execute_batch("BEGIN").unwrap();
        for id in &ids {
            insert(&conn, id, "P1", "2024-01-01T00:00:01Z", "start", 1, Some(1));
        }
        conn.execute_batch("COMMIT").unwrap();
        drop(conn);

        let mut reader = SqliteEventReader::new(&db_path, "GAME", false).unwrap();
        let events = reader
            .events_for_ids(&ids, IdMode::Session, &EventFilter::default())
            .await
            .unwrap();
        assert_eq!(events.len(), ids.len());
        assert_eq!(events.first().map(|e| e.session_id.as_str()), Some("S00000"));
    }

    #[tokio::test]
    async fn test_version_filter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("events.db");
        let conn = make_db(&db_path);
        insert(&conn, "S1", "P1", "2024-01-01T00:00:01Z", "start", 1, Some(1));
        insert(&conn, "S1", "P1", "2024-01-01T00:00:02Z", "move", 2, Some(2));
        drop(conn);

        let mut reader = SqliteEventReader::new(&db_path, "GAME", false).unwrap();
        let filter = EventFilter {
            versions: Some(vec!["2".to_string()]),
            excluded_events: Vec::new(),
        };
        let events = reader
            .events_for_ids(&["S1".to_string()], IdMode::Session, &filter)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name, "move");
    }
}
