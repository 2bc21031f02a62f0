//! Processors - one registry bound to one aggregation unit
//!
//! ```text
//! PopulationProcessor  (one per run)
//!     └── PlayerProcessor  (one per user id, "null" sentinel)
//!             └── SessionProcessor  (one per session id, "null" sentinel)
//! ```

pub mod player;
pub mod population;
pub mod session;

pub use player::PlayerProcessor;
pub use population::PopulationProcessor;
pub use session::SessionProcessor;

use crate::generators::ExtractionError;
use crate::models::{ColumnDescription, Event, ExportRow, FeatureData};
use crate::registry::ExtractorRegistry;

/// Shared behavior of the three feature levels
pub trait Processor {
    fn registry(&self) -> &ExtractorRegistry;

    fn registry_mut(&mut self) -> &mut ExtractorRegistry;

    /// Leading identity columns of this level's rows
    fn identity_columns(&self) -> Vec<String>;

    fn identity_values(&self) -> ExportRow;

    /// Unit bookkeeping before the event reaches the generators
    fn observe(&mut self, event: &Event);

    fn player_id(&self) -> Option<&str> {
        None
    }

    fn session_id(&self) -> Option<&str> {
        None
    }

    fn process_event(&mut self, event: &Event) -> Result<(), ExtractionError> {
        self.observe(event);
        self.registry_mut().update_from_event(event)
    }

    fn process_feature_data(&mut self, feature: &FeatureData) -> Result<(), ExtractionError> {
        self.registry_mut().update_from_feature_data(feature)
    }

    fn feature_data(&self) -> Vec<FeatureData> {
        self.registry()
            .feature_data(self.player_id(), self.session_id())
    }

    fn column_names(&self) -> Vec<String> {
        let mut columns = self.identity_columns();
        columns.extend(self.registry().column_names());
        columns
    }

    fn column_descriptions(&self) -> Vec<ColumnDescription> {
        let mut columns: Vec<ColumnDescription> = self
            .identity_columns()
            .into_iter()
            .map(|name| {
                let description = identity_description(&name);
                ColumnDescription::new(name, description)
            })
            .collect();
        columns.extend(self.registry().column_descriptions());
        columns
    }

    /// The unit's exported row
    fn line(&self) -> ExportRow {
        let mut row = self.identity_values();
        row.extend(self.registry().values());
        row
    }
}

fn identity_description(column: &str) -> &'static str {
    match column {
        "PlayerID" => "Player the row belongs to, or \"null\" for events without one",
        "SessionID" => "Session the row belongs to",
        "SessionCount" => "Distinct sessions seen",
        "PlayerCount" => "Distinct players seen",
        _ => "",
    }
}
