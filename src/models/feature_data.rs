//! FeatureData - the externally visible value of one generator instance

use super::modes::ExtractionMode;
use super::value::FeatureValue;

/// Snapshot of a feature's values, produced on demand during propagation
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureData {
    /// Configured generator name, shared by all per-count instances
    pub name: String,
    /// Level the producing generator belongs to
    pub mode: ExtractionMode,
    /// `None` for aggregate generators
    pub count_index: Option<usize>,
    pub player_id: Option<String>,
    pub session_id: Option<String>,
    /// Column names, one per value
    pub columns: Vec<String>,
    pub values: Vec<FeatureValue>,
    pub subfeatures: Vec<String>,
}

impl FeatureData {
    /// First value, the base feature
    pub fn value(&self) -> &FeatureValue {
        self.values.first().unwrap_or(&FeatureValue::Null)
    }

    /// Value of a named sub-feature
    pub fn subfeature(&self, name: &str) -> Option<&FeatureValue> {
        self.subfeatures
            .iter()
            .position(|s| s == name)
            .and_then(|i| self.values.get(i + 1))
    }
}
