//! Storage engine errors as classified failures.

use autoledger_resilience::Failure;
use autoledger_schema::SchemaError;

pub use autoledger_schema::sqlite_code;

/// Classify a storage error.
///
/// Engine errors go through their result code; anything else (type
/// conversion, missing rows) is a permanent failure.
pub fn storage_failure(err: &rusqlite::Error) -> Failure {
    match sqlite_code(err) {
        Some(code) => Failure::storage_code(code, err.to_string()),
        None => Failure::storage(err.to_string()),
    }
}

/// Classify a schema error.
///
/// Missing definitions and row-count mismatches are permanent. Engine errors
/// keep their classification, so a busy or locked database is retried.
pub fn schema_failure(err: &SchemaError) -> Failure {
    match err.sqlite().and_then(sqlite_code) {
        Some(code) if !err.is_bootstrap() => Failure::storage_code(code, err.to_string()),
        _ => Failure::storage(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoledger_resilience::FailureKind;
    use autoledger_schema::BootstrapError;
    use rusqlite::ffi;

    fn engine_error(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_is_retryable() {
        let failure = storage_failure(&engine_error(ffi::SQLITE_BUSY));
        assert_eq!(failure.kind, FailureKind::Busy);
        assert!(failure.retryable);
        assert_eq!(failure.code, Some(ffi::SQLITE_BUSY));
    }

    #[test]
    fn test_constraint_is_permanent() {
        let failure = storage_failure(&engine_error(ffi::SQLITE_CONSTRAINT_UNIQUE));
        assert_eq!(failure.kind, FailureKind::Constraint);
        assert!(!failure.retryable);
    }

    #[test]
    fn test_input_error_keeps_engine_code() {
        let err = rusqlite::Error::SqlInputError {
            error: ffi::Error::new(ffi::SQLITE_LOCKED),
            msg: "database table is locked".to_string(),
            sql: "CREATE TABLE Region (Id INTEGER)".to_string(),
            offset: 0,
        };
        let failure = storage_failure(&err);
        assert_eq!(failure.kind, FailureKind::Locked);
        assert!(failure.retryable);
        assert_eq!(failure.code, Some(ffi::SQLITE_LOCKED));
    }

    #[test]
    fn test_non_engine_error_is_permanent() {
        let failure = storage_failure(&rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(failure.kind, FailureKind::Storage);
        assert!(!failure.retryable);
        assert!(failure.code.is_none());
    }

    #[test]
    fn test_schema_failures() {
        let bootstrap = SchemaError::from(BootstrapError::MissingDefinition {
            logical_name: "vehicle".to_string(),
        });
        assert!(!schema_failure(&bootstrap).retryable);

        let locked = SchemaError::Storage(engine_error(ffi::SQLITE_LOCKED));
        let failure = schema_failure(&locked);
        assert!(failure.retryable);
        assert!(failure.message.contains("storage error"));

        let mismatch = SchemaError::RowCountMismatch {
            table: "Vehicle".to_string(),
            expected: 2,
            copied: 1,
        };
        assert!(!schema_failure(&mismatch).retryable);
    }
}
