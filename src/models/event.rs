//! Event model - one logged occurrence from a game session

use super::value::{ColumnDescription, ExportRow, FeatureValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Where an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventSource {
    #[default]
    Game,
    Generated,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Game => "GAME",
            EventSource::Generated => "GENERATED",
        }
    }
}

/// Logged event
///
/// Constructed by a storage reader or by a detector trigger. Only
/// `app_id` and `event_sequence_index` may be filled in after construction,
/// through [`Event::fill_defaults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub session_id: String,
    #[serde(default)]
    pub app_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_name: String,
    #[serde(default)]
    pub event_data: Map<String, Value>,
    #[serde(default)]
    pub event_source: EventSource,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub app_branch: Option<String>,
    #[serde(default)]
    pub log_version: Option<String>,
    #[serde(default)]
    pub time_offset: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_data: Map<String, Value>,
    #[serde(default)]
    pub game_state: Map<String, Value>,
    #[serde(default, rename = "index")]
    pub event_sequence_index: Option<i64>,
}

impl Event {
    pub fn new(
        session_id: impl Into<String>,
        app_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        event_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            app_id: app_id.into(),
            timestamp,
            event_name: event_name.into(),
            event_data: Map::new(),
            event_source: EventSource::Game,
            app_version: None,
            app_branch: None,
            log_version: None,
            time_offset: None,
            user_id: None,
            user_data: Map::new(),
            game_state: Map::new(),
            event_sequence_index: None,
        }
    }

    /// Build a GENERATED event that inherits identity and versioning from
    /// the event that triggered it
    pub fn generated(
        trigger: &Event,
        event_name: impl Into<String>,
        event_data: Map<String, Value>,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            event_data,
            event_source: EventSource::Generated,
            ..trigger.clone()
        }
    }

    /// Parse one JSONL line
    pub fn from_jsonl(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Fill the two fields readers are allowed to default
    pub fn fill_defaults(&mut self, app_id: &str, fallback_index: i64) {
        if self.app_id.is_empty() {
            self.app_id = app_id.to_string();
        }
        if self.event_sequence_index.is_none() {
            self.event_sequence_index = Some(fallback_index);
        }
    }

    pub fn is_generated(&self) -> bool {
        self.event_source == EventSource::Generated
    }

    /// Player id used for routing; missing ids fall back to the null player
    pub fn player_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(NULL_ID)
    }

    pub fn column_names() -> Vec<String> {
        EVENT_COLUMNS.iter().map(|(name, _)| name.to_string()).collect()
    }

    pub fn column_descriptions() -> Vec<ColumnDescription> {
        EVENT_COLUMNS
            .iter()
            .map(|(name, description)| ColumnDescription::new(*name, *description))
            .collect()
    }

    pub fn column_values(&self) -> ExportRow {
        vec![
            FeatureValue::from(self.session_id.as_str()),
            FeatureValue::from(self.app_id.as_str()),
            FeatureValue::Timestamp(self.timestamp),
            FeatureValue::from(self.event_name.as_str()),
            FeatureValue::Json(Value::Object(self.event_data.clone())),
            FeatureValue::from(self.event_source.as_str()),
            FeatureValue::from(self.app_version.clone()),
            FeatureValue::from(self.app_branch.clone()),
            FeatureValue::from(self.log_version.clone()),
            FeatureValue::from(self.time_offset.clone()),
            FeatureValue::from(self.user_id.clone()),
            FeatureValue::Json(Value::Object(self.user_data.clone())),
            FeatureValue::Json(Value::Object(self.game_state.clone())),
            FeatureValue::from(self.event_sequence_index),
        ]
    }
}

/// Id used by the sentinel player and session
pub const NULL_ID: &str = "null";

/// Events stream columns, in `column_values` order
const EVENT_COLUMNS: [(&str, &str); 14] = [
    ("session_id", "Session the event belongs to"),
    ("app_id", "Game that logged the event"),
    ("timestamp", "UTC time the event was logged"),
    ("event_name", "Type of event"),
    ("event_data", "Event-specific payload, as JSON"),
    ("event_source", "GAME for logged events, GENERATED for detector output"),
    ("app_version", "Game build version"),
    ("app_branch", "Game build branch"),
    ("log_version", "Version of the game's logging schema"),
    ("offset", "Local time offset of the player"),
    ("user_id", "Player id, if the game logged one"),
    ("user_data", "Player-specific payload, as JSON"),
    ("game_state", "Game state at the time of the event, as JSON"),
    ("index", "Position of the event within its session"),
];

/// Compare two dotted-integer version strings
///
/// Components are compared left to right; when one version is a prefix of
/// the other, the shorter one is lesser. Returns `None` and logs an error
/// when either version has a non-numeric component.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let parse = |v: &str| -> Option<Vec<u64>> {
        v.trim()
            .split('.')
            .map(|part| part.trim().parse::<u64>().ok())
            .collect()
    };

    match (parse(a), parse(b)) {
        (Some(left), Some(right)) => Some(left.cmp(&right)),
        (left, right) => {
            if left.is_none() {
                log::error!("Could not compare versions, {:?} is not a dotted-integer version", a);
            }
            if right.is_none() {
                log::error!("Could not compare versions, {:?} is not a dotted-integer version", b);
            }
            None
        }
    }
}

/// Check a log version against inclusive optional bounds
///
/// An unbounded generator accepts everything, including events without a
/// log version. A bounded generator rejects events whose version is missing
/// or cannot be compared.
pub fn version_in_bounds(log_version: Option<&str>, min: Option<&str>, max: Option<&str>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let version = match log_version {
        Some(v) if !v.is_empty() && v != "None" => v,
        _ => return false,
    };
    if let Some(min) = min {
        match compare_versions(version, min) {
            Some(Ordering::Less) | None => return false,
            _ => {}
        }
    }
    if let Some(max) = max {
        match compare_versions(version, max) {
            Some(Ordering::Greater) | None => return false,
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_event(name: &str) -> Event {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Event::new("S1", "GAME", ts, name)
    }

    #[test]
    fn test_compare_versions_ordering() {
        assert_eq!(compare_versions("1.2", "1.10"), Some(Ordering::Less));
        assert_eq!(compare_versions("2", "2.0"), Some(Ordering::Less));
        assert_eq!(compare_versions("3.1.4", "3.1.4"), Some(Ordering::Equal));
        assert_eq!(compare_versions("10", "9.9"), Some(Ordering::Greater));
    }

    #[test]
    fn test_compare_versions_malformed() {
        // Test: Malformed components fail the comparison instead of panicking
        assert_eq!(compare_versions("1.x", "1.0"), None);
        assert_eq!(compare_versions("1.0", ""), None);
    }

    #[test]
    fn test_version_bounds() {
        assert!(version_in_bounds(None, None, None));
        assert!(version_in_bounds(Some("4"), Some("1"), None));
        assert!(version_in_bounds(Some("1"), Some("1"), Some("1")));
        assert!(!version_in_bounds(Some("0.9"), Some("1"), None));
        assert!(!version_in_bounds(Some("5"), None, Some("4.2")));
        assert!(!version_in_bounds(None, Some("1"), None));
        assert!(!version_in_bounds(Some("None"), Some("1"), None));
        assert!(!version_in_bounds(Some("abc"), Some("1"), None));
    }

    #[test]
    fn test_generated_event_inherits_identity() {
        let mut trigger = make_event("move");
        trigger.user_id = Some("P1".to_string());
        trigger.event_sequence_index = Some(7);

        let mut data = Map::new();
        data.insert("moves".to_string(), Value::from(3));
        let generated = Event::generated(&trigger, "idle", data);

        assert_eq!(generated.event_source, EventSource::Generated);
        assert_eq!(generated.event_name, "idle");
        assert_eq!(generated.session_id, "S1");
        assert_eq!(generated.user_id.as_deref(), Some("P1"));
        assert_eq!(generated.event_sequence_index, Some(7));
        assert_eq!(generated.event_data["moves"], Value::from(3));
    }

    #[test]
    fn test_fill_defaults_only_fills_missing() {
        let mut event = make_event("start");
        event.app_id.clear();
        event.fill_defaults("FALLBACK", 4);
        assert_eq!(event.app_id, "FALLBACK");
        assert_eq!(event.event_sequence_index, Some(4));

        event.fill_defaults("OTHER", 9);
        assert_eq!(event.app_id, "FALLBACK");
        assert_eq!(event.event_sequence_index, Some(4));
    }

    #[test]
    fn test_from_jsonl() {
        let line = r#"{"session_id":"S9","timestamp":"2024-03-01T12:00:00Z","event_name":"start","event_data":{"level":2},"user_id":"P4","index":0}"#;
        let event = Event::from_jsonl(line).unwrap();
        assert_eq!(event.session_id, "S9");
        assert_eq!(event.event_source, EventSource::Game);
        assert_eq!(event.player_id(), "P4");
        assert_eq!(event.event_sequence_index, Some(0));
        assert_eq!(event.event_data["level"], Value::from(2));
    }

    #[test]
    fn test_column_values_match_names() {
        let event = make_event("start");
        assert_eq!(Event::column_names().len(), event.column_values().len());
        assert_eq!(event.player_id(), NULL_ID);
    }
}
