//! Typed cell values carried by feature values and export rows

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One exported row, one value per column
pub type ExportRow = Vec<FeatureValue>;

/// An exported column and what it holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    pub description: String,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A single typed value reported by a generator or copied from an event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl FeatureValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FeatureValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FeatureValue::Int(v) => Some(*v),
            FeatureValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Int(v) => Some(*v as f64),
            FeatureValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureValue::Null => Ok(()),
            FeatureValue::Bool(v) => write!(f, "{}", v),
            FeatureValue::Int(v) => write!(f, "{}", v),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::Text(v) => f.write_str(v),
            FeatureValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            FeatureValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<usize> for FeatureValue {
    fn from(v: usize) -> Self {
        FeatureValue::Int(v as i64)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

impl From<DateTime<Utc>> for FeatureValue {
    fn from(v: DateTime<Utc>) -> Self {
        FeatureValue::Timestamp(v)
    }
}

impl<T: Into<FeatureValue>> From<Option<T>> for FeatureValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FeatureValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_for_tabular_output() {
        assert_eq!(FeatureValue::Null.to_string(), "");
        assert_eq!(FeatureValue::Int(3).to_string(), "3");
        assert_eq!(FeatureValue::Float(1.5).to_string(), "1.5");
        assert_eq!(FeatureValue::from("lvl").to_string(), "lvl");
        assert_eq!(
            FeatureValue::Json(serde_json::json!({"a": 1})).to_string(),
            "{\"a\":1}"
        );
    }

    #[test]
    fn test_optional_values_become_null() {
        let missing: Option<String> = None;
        assert!(FeatureValue::from(missing).is_null());
        assert_eq!(FeatureValue::from(Some(4_i64)), FeatureValue::Int(4));
    }

    #[test]
    fn test_untagged_serialization() {
        let row: ExportRow = vec![FeatureValue::Null, 2_i64.into(), "x".into()];
        assert_eq!(serde_json::to_string(&row).unwrap(), "[null,2,\"x\"]");
    }
}
