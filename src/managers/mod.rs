//! Managers - the orchestration layer
//!
//! ```text
//! ExportManager (one per export run)
//!     ├── EventManager    raw/all event rows, detectors
//!     └── FeatureManager  population → players → sessions
//! ```

pub mod event_manager;
pub mod export_manager;
pub mod feature_manager;

pub use event_manager::EventManager;
pub use export_manager::{ExportError, ExportManager, ExportStage};
pub use feature_manager::{FeatureManager, FeatureSnapshot};
