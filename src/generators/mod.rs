//! Generators - stateful units of computation over events and feature values
//!
//! # Architecture
//!
//! ```text
//! GeneratorCollectionConfig entry
//!     ↓
//! GeneratorLoader (per game, WithBuiltins fallback → BuiltinLoader)
//!     ↓
//! Box<dyn Feature>  ── update_from_event / update_from_feature_data / values
//! Box<dyn Detector> ── update_from_event / trigger_condition / trigger → GENERATED Event
//! ```

pub mod builtin;
pub mod generator;
pub mod loader;

pub use generator::{
    Detector, ExtractionError, Feature, Generator, GeneratorKind, GeneratorParams, ALL_EVENTS,
};
pub use loader::{BuiltinLoader, GeneratorLoader, LoaderError, WithBuiltins};
