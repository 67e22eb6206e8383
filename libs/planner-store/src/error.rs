//! Store error types.

use planner_core::ValidationError;
use thiserror::Error;

/// Result type alias using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot open store: {0}")]
    Connection(String),

    /// The advisory lease is held by another live instance. The holder has
    /// been asked to release; retry after it closes.
    #[error("store is locked by another instance ({holder})")]
    Blocked { holder: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("referential integrity violated: {0}")]
    Referential(String),

    /// A multi-collection transaction failed and was rolled back; no partial
    /// writes were committed.
    #[error("transaction '{operation}' aborted: {source}")]
    TransactionAbort {
        operation: &'static str,
        #[source]
        source: Box<StoreError>,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}
