//! Error types for the data-mapper layer
//!
//! `ModelError` is what every public operation returns. Failures coming from a
//! driver are kept as `DriverError` so that write paths can wrap them into
//! `ModelError::Persistence` without losing the driver cause.

use std::fmt;
use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Write operation that failed inside the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "inserting"),
            Operation::Update => write!(f, "updating"),
            Operation::Delete => write!(f, "deleting"),
        }
    }
}

/// Errors raised by a `Driver` or `DocumentStore` implementation
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Query error: {0}")]
    Query(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unsupported value for column '{column}': {reason}")]
    UnsupportedValue { column: String, reason: String },

    #[error("Store failure on '{target}': {message}")]
    Store { target: String, message: String },
}

/// Error types for data object operations
#[derive(Debug, Error)]
pub enum ModelError {
    /// `get_one` / `find_one` matched nothing
    #[error("Record not found in '{0}'")]
    NotFound(String),

    #[error("Object was deleted")]
    AlreadyDeleted,

    #[error("No value for key part: {0}")]
    MissingKeyPart(String),

    #[error("Unknown extension '{0}'")]
    UnknownExtension(String),

    #[error("Extension '{0}' is not loaded")]
    ExtensionNotLoaded(String),

    #[error("I'm not the owner of plugin '{0}'")]
    NotPluginOwner(String),

    #[error("Language is not set for '{0}'")]
    LocaleNotSet(String),

    #[error("Structure of '{0}' was already initialised")]
    StructureLocked(String),

    #[error("Structure of '{0}' is not initialised")]
    StructureNotInitialised(String),

    /// A write against the store failed; `source` is the driver failure
    #[error("Error while {operation} data")]
    Persistence {
        operation: Operation,
        #[source]
        source: DriverError,
    },

    #[error("Connection was initialised")]
    ConnectionAlreadyInitialised,

    #[error("Connection is not initialised")]
    ConnectionNotInitialised,

    #[error("Paginator can not be changed after the count was taken")]
    PaginatorLocked,

    #[error("Invalid page {page} with page size {page_size}")]
    InvalidPage { page: i64, page_size: i64 },

    #[error("Path '{0}' not found")]
    PathNotFound(String),

    #[error("Object is not attached to a repository")]
    Detached,

    #[error("Repository '{0}' is not registered on the connection")]
    UnregisteredRepository(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    pub(crate) fn persistence(operation: Operation) -> impl FnOnce(DriverError) -> ModelError {
        move |source| ModelError::Persistence { operation, source }
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        ModelError::Driver(DriverError::Database(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_persistence_error_keeps_cause() {
        let err = ModelError::persistence(Operation::Update)(DriverError::Query("boom".into()));

        assert_eq!(err.to_string(), "Error while updating data");
        let source = err.source().expect("cause is preserved");
        assert_eq!(source.to_string(), "Query error: boom");
    }

    #[test]
    fn test_missing_key_part_names_field() {
        let err = ModelError::MissingKeyPart("b".into());
        assert_eq!(err.to_string(), "No value for key part: b");
    }
}
