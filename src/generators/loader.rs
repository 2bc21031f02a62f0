//! Generator loaders - per-game factories from (type name, params) to instances

use super::builtin::{CountEvent, StopwatchTimer, Timespan};
use super::generator::{Detector, Feature, GeneratorKind, GeneratorParams};
use serde_json::{Map, Value};

#[derive(Debug)]
pub enum LoaderError {
    UnsupportedType { kind: GeneratorKind, type_name: String },
    InvalidArgument { type_name: String, argument: String, reason: String },
}

impl LoaderError {
    pub fn unsupported(kind: GeneratorKind, type_name: &str) -> Self {
        LoaderError::UnsupportedType {
            kind,
            type_name: type_name.to_string(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, LoaderError::UnsupportedType { .. })
    }
}

impl std::fmt::Display for LoaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderError::UnsupportedType { kind, type_name } => {
                write!(f, "Unsupported {} type: {}", kind.as_str(), type_name)
            }
            LoaderError::InvalidArgument { type_name, argument, reason } => {
                write!(f, "Invalid argument '{}' for {}: {}", argument, type_name, reason)
            }
        }
    }
}

impl std::error::Error for LoaderError {}

/// Factory for the generators of one game
pub trait GeneratorLoader: Send + Sync {
    fn load_feature(
        &self,
        type_name: &str,
        params: GeneratorParams,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn Feature>, LoaderError>;

    fn load_detector(
        &self,
        type_name: &str,
        params: GeneratorParams,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn Detector>, LoaderError>;

    /// Loader name for logging
    fn loader_name(&self) -> &str;
}

/// Loader for the generators every game can use
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinLoader;

impl GeneratorLoader for BuiltinLoader {
    fn load_feature(
        &self,
        type_name: &str,
        params: GeneratorParams,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn Feature>, LoaderError> {
        match type_name {
            "CountEvent" => Ok(Box::new(CountEvent::new(params, args)?)),
            "Timespan" => Ok(Box::new(Timespan::new(params, args)?)),
            "StopwatchTimer" => Ok(Box::new(StopwatchTimer::new(params, args)?)),
            _ => Err(LoaderError::unsupported(GeneratorKind::Feature, type_name)),
        }
    }

    fn load_detector(
        &self,
        type_name: &str,
        _params: GeneratorParams,
        _args: &Map<String, Value>,
    ) -> Result<Box<dyn Detector>, LoaderError> {
        Err(LoaderError::unsupported(GeneratorKind::Detector, type_name))
    }

    fn loader_name(&self) -> &str {
        "builtin"
    }
}

/// Game loader that falls back to the builtin generators for types it
/// does not know
pub struct WithBuiltins<L> {
    inner: L,
}

impl<L: GeneratorLoader> WithBuiltins<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

impl<L: GeneratorLoader> GeneratorLoader for WithBuiltins<L> {
    fn load_feature(
        &self,
        type_name: &str,
        params: GeneratorParams,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn Feature>, LoaderError> {
        match self.inner.load_feature(type_name, params.clone(), args) {
            Err(e) if e.is_unsupported() => BuiltinLoader.load_feature(type_name, params, args),
            other => other,
        }
    }

    fn load_detector(
        &self,
        type_name: &str,
        params: GeneratorParams,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn Detector>, LoaderError> {
        match self.inner.load_detector(type_name, params.clone(), args) {
            Err(e) if e.is_unsupported() => BuiltinLoader.load_detector(type_name, params, args),
            other => other,
        }
    }

    fn loader_name(&self) -> &str {
        self.inner.loader_name()
    }
}

/// Required string argument; `aliases` are tried after `key`
pub fn string_arg(
    type_name: &str,
    args: &Map<String, Value>,
    key: &str,
    aliases: &[&str],
) -> Result<String, LoaderError> {
    std::iter::once(key)
        .chain(aliases.iter().copied())
        .find_map(|k| args.get(k))
        .ok_or_else(|| LoaderError::InvalidArgument {
            type_name: type_name.to_string(),
            argument: key.to_string(),
            reason: "missing".to_string(),
        })
        .and_then(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| LoaderError::InvalidArgument {
                type_name: type_name.to_string(),
                argument: key.to_string(),
                reason: format!("expected a string, got {}", v),
            })
        })
}

/// Optional list-of-strings argument, empty when absent
pub fn string_list_arg(
    type_name: &str,
    args: &Map<String, Value>,
    key: &str,
) -> Result<Vec<String>, LoaderError> {
    let invalid = |v: &Value| LoaderError::InvalidArgument {
        type_name: type_name.to_string(),
        argument: key.to_string(),
        reason: format!("expected a list of strings, got {}", v),
    };
    match args.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(|| invalid(item)))
            .collect(),
        Some(other) => Err(invalid(other)),
    }
}
