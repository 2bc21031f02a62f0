//! Registries - per-unit generator ownership and dependency-indexed dispatch
//!
//! # Architecture
//!
//! ```text
//! GeneratorCollectionConfig ──► GeneratorPlan (once per level)
//!                                    ↓ from_plan (once per processor)
//! Event ──► event_index[name] ∪ all_events ──► update_from_event
//! FeatureData ──► feature_index[name] ──► update_from_feature_data
//! values() / column_names() ──► registration order
//! ```

pub mod detector;
pub mod dispatch;
pub mod extractor;
pub mod plan;

pub use detector::DetectorRegistry;
pub use dispatch::GeneratorRegistry;
pub use extractor::ExtractorRegistry;
pub use plan::{GeneratorPlan, PlanError, PlannedGenerator};
