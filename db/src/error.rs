//! Error types for cache store and library operations.

use thiserror::Error;

use defschema_extract::ExtractError;

/// Errors that can occur while persisting or assembling schema caches.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A persisted cache exists but cannot be used.
    #[error("corrupt cache: {0}")]
    CacheCorruption(String),

    /// Loading or extracting a module failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;
