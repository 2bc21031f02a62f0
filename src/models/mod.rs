//! Value types passed through the whole pipeline
//!
//! ```text
//! storage row ──► Event ──► generators ──► FeatureData ──► propagation
//!                   │                          │
//!                   └──── ExportRow ◄──────────┘ (Vec<FeatureValue>)
//! ```

pub mod event;
pub mod feature_data;
pub mod modes;
pub mod value;

pub use event::{compare_versions, version_in_bounds, Event, EventSource, NULL_ID};
pub use feature_data::FeatureData;
pub use modes::{ExportMode, ExtractionMode, IdMode, IterationMode};
pub use value::{ColumnDescription, ExportRow, FeatureValue};
