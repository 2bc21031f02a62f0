//! playflow - game telemetry feature export
//!
//! ```text
//! EventStorage ──→ ExportManager ──→ EventManager   ──→ Outerface(s)
//!                                └─→ FeatureManager ──┘
//! ```
//!
//! Games plug in their generators through a [`generators::GeneratorLoader`];
//! the builtin loader covers the common counting and timing features.

pub mod config;
pub mod generators;
pub mod managers;
pub mod models;
pub mod outerface;
pub mod processors;
pub mod registry;
pub mod request;
pub mod storage;

pub use managers::{ExportError, ExportManager, ExportStage};
pub use request::{ExportRange, ExportRequest, RequestResult, RequestStatus};
