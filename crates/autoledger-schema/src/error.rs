//! Schema error types.

use rusqlite::ffi;
use thiserror::Error;

/// A canonical definition could not be loaded.
///
/// Retrying cannot produce a missing resource, so these are always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    /// No definition is registered under the logical name.
    #[error("canonical definition not found: {logical_name}")]
    MissingDefinition {
        /// The logical name that was requested.
        logical_name: String,
    },

    /// The definition exists but cannot be used.
    #[error("canonical definition {logical_name} is invalid: {reason}")]
    InvalidDefinition {
        /// The logical name of the definition.
        logical_name: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Schema migrator errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Canonical definition missing or unreadable.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    /// A step of a structural migration failed. The migration was rolled
    /// back and the table is in its pre-migration state.
    #[error("migration of {table} failed at step {step_index} ({step}): {source}")]
    Migration {
        /// The table being migrated.
        table: String,
        /// Index of the failing step.
        step_index: usize,
        /// Name of the failing step.
        step: &'static str,
        /// The storage error.
        source: rusqlite::Error,
    },

    /// The copy step did not carry over every row. Rolled back.
    #[error("migration of {table} copied {copied} of {expected} rows")]
    RowCountMismatch {
        /// The table being migrated.
        table: String,
        /// Rows present before the migration.
        expected: usize,
        /// Rows inserted into the new table.
        copied: usize,
    },

    /// The canonical table could not be created.
    #[error("could not create {table}: {source}")]
    Create {
        /// The table being created.
        table: String,
        /// The storage error.
        source: rusqlite::Error,
    },

    /// The migration committed but the connection pragmas it overrode could
    /// not be put back.
    #[error("migrated {table} but could not restore connection pragmas: {source}")]
    Restore {
        /// The table that was migrated.
        table: String,
        /// The storage error.
        source: rusqlite::Error,
    },

    /// Storage error outside a migration step.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The logical name is not part of the schema catalog.
    #[error("unknown table: {0}")]
    UnknownTable(String),
}

impl SchemaError {
    /// The underlying storage engine error, if any.
    pub fn sqlite(&self) -> Option<&rusqlite::Error> {
        match self {
            SchemaError::Migration { source, .. }
            | SchemaError::Create { source, .. }
            | SchemaError::Restore { source, .. } => Some(source),
            SchemaError::Storage(err) => Some(err),
            _ => None,
        }
    }

    /// Check if the error was caused by a missing or invalid definition.
    pub fn is_bootstrap(&self) -> bool {
        matches!(self, SchemaError::Bootstrap(_))
    }

    /// Check if another connection holding a lock caused the error.
    pub fn is_contention(&self) -> bool {
        self.sqlite().is_some_and(is_contention)
    }
}

/// Extended result code of an engine error.
pub fn sqlite_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(ffi, _) => Some(ffi.extended_code),
        rusqlite::Error::SqlInputError { error, .. } => Some(error.extended_code),
        _ => None,
    }
}

/// Check if an engine error is a busy or locked database.
pub fn is_contention(err: &rusqlite::Error) -> bool {
    match sqlite_code(err) {
        Some(ffi::SQLITE_IOERR_LOCK | ffi::SQLITE_IOERR_SHMLOCK) => true,
        Some(code) => matches!(code & 0xff, ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED),
        None => false,
    }
}
