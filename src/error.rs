//! Store error types for typed error handling.
//!
//! Key, serialization and validation errors are raised synchronously by the
//! in-memory operations. Adapter errors (`NotInitialized`, `AdapterIo`) surface
//! from `init`, `sync` and `create_backup` and are never swallowed.

/// Boxed error used as the source of adapter I/O failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Store errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Key cannot be used with this store.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// Value cannot be represented as JSON.
    #[error("value for key '{key}' is not serializable: {source}")]
    NotSerializable {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Validator rejected the value.
    #[error("validation failed for key '{key}': {message}")]
    ValidationFailed { key: String, message: String },

    /// Adapter method called before a successful `init`.
    #[error("{adapter} adapter is not initialized")]
    NotInitialized { adapter: &'static str },

    /// Underlying storage medium failed.
    #[error("{context}: {source}")]
    AdapterIo {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Invalid store or adapter configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an adapter I/O error with context.
    pub fn adapter_io(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::AdapterIo {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Create a not-initialized error for the named adapter.
    pub fn not_initialized(adapter: &'static str) -> Self {
        Self::NotInitialized { adapter }
    }

    /// Create a validation failure carrying the validator's message.
    pub fn validation_failed(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error came from the storage medium rather than the caller's input.
    #[must_use]
    pub fn is_adapter_error(&self) -> bool {
        matches!(self, Self::NotInitialized { .. } | Self::AdapterIo { .. })
    }
}
