//! Error types.

use autoledger_resilience::ExecutionError;
use autoledger_schema::SchemaError;
use thiserror::Error;

/// Data core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The storage file could not be opened.
    #[error("could not open database at {location}: {source}")]
    Open {
        /// Where the database was expected.
        location: String,
        /// The storage error.
        source: rusqlite::Error,
    },

    /// The schema could not be brought to its canonical shape. The
    /// application cannot proceed.
    #[error("schema startup failed: {0}")]
    Startup(#[source] ExecutionError),

    /// A wrapped operation failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Schema error outside of startup.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Storage error outside a wrapped operation.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl Error {
    /// Check if the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Startup(err) | Error::Execution(err) => err.is_cancelled(),
            _ => false,
        }
    }

    /// The execution error, if the failure came from a wrapped operation.
    pub fn execution(&self) -> Option<&ExecutionError> {
        match self {
            Error::Startup(err) | Error::Execution(err) => Some(err),
            _ => None,
        }
    }
}

/// Result alias.
pub type Result<T> = std::result::Result<T, Error>;
