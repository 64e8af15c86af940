//! Error types for schema extraction.
//!
//! Every failure here has a degraded continuation one level up: an
//! unloadable module becomes an empty cache, a type whose members cannot be
//! read becomes an empty variant. The errors exist so callers can log why.

use std::path::PathBuf;

use thiserror::Error;

/// A single type's members could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot introspect type {type_name}: {reason}")]
pub struct TypeIntrospectionError {
    pub type_name: String,
    pub reason: String,
}

impl TypeIntrospectionError {
    pub fn new(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while loading a module or extracting its schemas.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The module manifest is missing, unreadable or malformed.
    #[error("cannot load module {}: {reason}", path.display())]
    ModuleLoad { path: PathBuf, reason: String },

    #[error(transparent)]
    TypeIntrospection(#[from] TypeIntrospectionError),

    /// Extraction configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl ExtractError {
    pub(crate) fn module_load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::ModuleLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias for results with [`ExtractError`].
pub type Result<T> = std::result::Result<T, ExtractError>;
