use std::path::PathBuf;

use thiserror::Error;

/// Validation errors for domain values built from user or provider input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("unknown frequency '{value}', expected one of q, quarter, quarterly, y, year, yearly, annual")]
    UnknownFrequency { value: String },
    #[error("unknown data category '{value}'")]
    UnknownCategory { value: String },
    #[error("unknown cache mode '{value}', expected use, refresh or bypass")]
    UnknownCacheMode { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
}

/// Configuration failures. These abort a run before any data is fetched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cache ttl for '{category}' must be a positive number of hours")]
    InvalidTtl { category: &'static str },

    #[error("invalid threshold '{input}': {reason}")]
    InvalidThreshold { input: String, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{field} must be greater than zero")]
    NonPositive { field: &'static str },

    #[error("notification template must contain '{{triggered_count}}' or '{{details}}'")]
    EmptyTemplate,
}

/// Failures raised by the on-disk cache when it cannot persist or remove data.
///
/// Unreadable records never surface as errors; they are logged and treated
/// as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("payload of kind '{found}' cannot be stored under category '{expected}'")]
    CategoryMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
