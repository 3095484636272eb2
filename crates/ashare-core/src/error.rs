use std::path::PathBuf;

use thiserror::Error;

use crate::SecurityCode;

/// Validation and contract errors exposed by `ashare-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("security code cannot be empty")]
    EmptyCode,
    #[error("security code must be 6 ASCII digits: '{value}'")]
    InvalidCode { value: String },

    #[error("{field} fragment must be at most {max} characters: '{value}'")]
    FragmentTooLong {
        field: &'static str,
        value: String,
        max: usize,
    },

    #[error("invalid source '{value}', expected one of tencent, eastmoney, sina")]
    InvalidSource { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("trace_id must be 32 hex characters")]
    InvalidTraceId,
    #[error("schema_version must match vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },

    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}

/// Catalog load failures. Callers are expected to degrade to an empty
/// catalog instead of aborting.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog source '{}' is unreadable: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("catalog source '{}' has no '{column}' column", path.display())]
    MissingColumn { path: PathBuf, column: String },
}

impl CatalogError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, error: impl std::fmt::Display) -> Self {
        Self::Unreadable {
            path: path.into(),
            message: error.to_string(),
        }
    }
}

/// Snapshot cache read failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("no quote data for {code}: {reason}")]
    NoData { code: SecurityCode, reason: String },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("csv input has no '{column}' column")]
    MissingColumn { column: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
