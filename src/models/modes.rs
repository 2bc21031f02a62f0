//! Mode enums shared by every layer of the pipeline

use serde::{Deserialize, Serialize};

/// Aggregation level a generator is extracting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExtractionMode {
    Population,
    Player,
    Session,
    Detector,
}

impl ExtractionMode {
    /// The three levels that hold Feature generators
    pub const FEATURE_LEVELS: [ExtractionMode; 3] = [
        ExtractionMode::Population,
        ExtractionMode::Player,
        ExtractionMode::Session,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Population => "POPULATION",
            ExtractionMode::Player => "PLAYER",
            ExtractionMode::Session => "SESSION",
            ExtractionMode::Detector => "DETECTOR",
        }
    }
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output stream an Outerface can be asked to write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportMode {
    /// Raw GAME events
    Events,
    /// Processed events: GAME plus detector-GENERATED
    Detectors,
    Session,
    Player,
    Population,
}

impl ExportMode {
    pub fn all() -> [ExportMode; 5] {
        [
            ExportMode::Events,
            ExportMode::Detectors,
            ExportMode::Session,
            ExportMode::Player,
            ExportMode::Population,
        ]
    }

    /// Modes that require a generator loader
    pub fn generator_modes() -> [ExportMode; 4] {
        [
            ExportMode::Detectors,
            ExportMode::Session,
            ExportMode::Player,
            ExportMode::Population,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Events => "events",
            ExportMode::Detectors => "all_events",
            ExportMode::Session => "session",
            ExportMode::Player => "player",
            ExportMode::Population => "population",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "events" => Some(ExportMode::Events),
            "detectors" | "all_events" => Some(ExportMode::Detectors),
            "session" | "sessions" => Some(ExportMode::Session),
            "player" | "players" => Some(ExportMode::Player),
            "population" => Some(ExportMode::Population),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the ids of an export range refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdMode {
    Session,
    User,
}

/// Whether a generator is instantiated once or once per count index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IterationMode {
    Aggregate,
    PerCount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_mode_from_str() {
        // Test: CLI-style names map onto export modes
        assert_eq!(ExportMode::from_str("events"), Some(ExportMode::Events));
        assert_eq!(ExportMode::from_str(" Detectors "), Some(ExportMode::Detectors));
        assert_eq!(ExportMode::from_str("sessions"), Some(ExportMode::Session));
        assert_eq!(ExportMode::from_str("population"), Some(ExportMode::Population));
        assert_eq!(ExportMode::from_str("histogram"), None);
    }

    #[test]
    fn test_extraction_mode_serde_uppercase() {
        let mode: ExtractionMode = serde_json::from_str("\"SESSION\"").unwrap();
        assert_eq!(mode, ExtractionMode::Session);
        assert_eq!(serde_json::to_string(&ExtractionMode::Player).unwrap(), "\"PLAYER\"");
    }
}
