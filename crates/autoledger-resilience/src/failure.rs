//! Classified failures.
//!
//! A [`Failure`] carries its domain and whether it may be retried. Both are
//! decided where the failure is produced, so the executor never has to
//! inspect error types to make a retry decision.

use thiserror::Error;

/// SQLite primary result code for `SQLITE_BUSY`.
pub const STORAGE_BUSY: i32 = 5;
/// SQLite primary result code for `SQLITE_LOCKED`.
pub const STORAGE_LOCKED: i32 = 6;
/// SQLite primary result code for `SQLITE_CORRUPT`.
pub const STORAGE_CORRUPT: i32 = 11;
/// SQLite primary result code for `SQLITE_CONSTRAINT`.
pub const STORAGE_CONSTRAINT: i32 = 19;
/// SQLite primary result code for `SQLITE_NOTADB`.
pub const STORAGE_NOT_A_DATABASE: i32 = 26;
/// SQLite extended result code `SQLITE_IOERR_LOCK`.
pub const STORAGE_IOERR_LOCK: i32 = 10 | (15 << 8);
/// SQLite extended result code `SQLITE_IOERR_SHMLOCK`.
pub const STORAGE_IOERR_SHMLOCK: i32 = 10 | (20 << 8);

/// The axis that decides which retry policy applies to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureDomain {
    /// Local relational storage.
    Storage,
    /// Remote services reached over the network.
    Network,
    /// Input validation. Deterministic, never retried.
    Validation,
}

impl std::fmt::Display for FailureDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureDomain::Storage => write!(f, "storage"),
            FailureDomain::Network => write!(f, "network"),
            FailureDomain::Validation => write!(f, "validation"),
        }
    }
}

/// What went wrong, within a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Storage resource busy.
    Busy,
    /// Storage resource locked by another connection or statement.
    Locked,
    /// Lock-level I/O contention on the storage file.
    IoContention,
    /// Constraint violation.
    Constraint,
    /// Corrupted storage or not a database.
    Corrupt,
    /// Any other storage failure.
    Storage,
    /// Could not connect to the remote endpoint.
    Connect,
    /// The remote endpoint did not answer in time.
    Timeout,
    /// The remote endpoint rejected the request (4xx-style).
    ClientError(u16),
    /// The remote endpoint failed (5xx-style).
    ServerError(u16),
    /// Request or response could not be (de)serialized.
    Serialization,
    /// Input failed validation.
    Invalid,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Busy => write!(f, "busy"),
            FailureKind::Locked => write!(f, "locked"),
            FailureKind::IoContention => write!(f, "io contention"),
            FailureKind::Constraint => write!(f, "constraint violation"),
            FailureKind::Corrupt => write!(f, "corrupt"),
            FailureKind::Storage => write!(f, "storage failure"),
            FailureKind::Connect => write!(f, "connection failed"),
            FailureKind::Timeout => write!(f, "timed out"),
            FailureKind::ClientError(status) => write!(f, "client error {}", status),
            FailureKind::ServerError(status) => write!(f, "server error {}", status),
            FailureKind::Serialization => write!(f, "serialization failure"),
            FailureKind::Invalid => write!(f, "invalid input"),
        }
    }
}

/// A failure produced by a caller-supplied operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{domain} {kind}: {message}")]
pub struct Failure {
    /// Failure domain.
    pub domain: FailureDomain,
    /// Failure kind.
    pub kind: FailureKind,
    /// Whether another attempt could succeed.
    pub retryable: bool,
    /// Raw engine or status code, when there is one.
    pub code: Option<i32>,
    /// Human-readable description.
    pub message: String,
}

impl Failure {
    /// Create a failure with an explicit classification.
    pub fn new(
        domain: FailureDomain,
        kind: FailureKind,
        retryable: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            kind,
            retryable,
            code: None,
            message: message.into(),
        }
    }

    /// Classify a storage engine result code.
    ///
    /// Accepts either a primary or an extended SQLite result code. Busy,
    /// locked and lock-level I/O errors are retryable; everything else is
    /// fatal.
    pub fn storage_code(code: i32, message: impl Into<String>) -> Self {
        let kind = match (code, code & 0xff) {
            (STORAGE_IOERR_LOCK | STORAGE_IOERR_SHMLOCK, _) => FailureKind::IoContention,
            (_, STORAGE_BUSY) => FailureKind::Busy,
            (_, STORAGE_LOCKED) => FailureKind::Locked,
            (_, STORAGE_CONSTRAINT) => FailureKind::Constraint,
            (_, STORAGE_CORRUPT | STORAGE_NOT_A_DATABASE) => FailureKind::Corrupt,
            _ => FailureKind::Storage,
        };
        let retryable = matches!(
            kind,
            FailureKind::Busy | FailureKind::Locked | FailureKind::IoContention
        );

        Self {
            domain: FailureDomain::Storage,
            kind,
            retryable,
            code: Some(code),
            message: message.into(),
        }
    }

    /// A storage failure that carries no engine code. Always fatal.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(FailureDomain::Storage, FailureKind::Storage, false, message)
    }

    /// Classify a network failure. Only connection failures and timeouts
    /// are retryable.
    pub fn network(kind: FailureKind, message: impl Into<String>) -> Self {
        let retryable = matches!(kind, FailureKind::Connect | FailureKind::Timeout);
        let code = match kind {
            FailureKind::ClientError(status) | FailureKind::ServerError(status) => {
                Some(i32::from(status))
            }
            _ => None,
        };

        Self {
            domain: FailureDomain::Network,
            kind,
            retryable,
            code,
            message: message.into(),
        }
    }

    /// A validation failure. Never retryable.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureDomain::Validation, FailureKind::Invalid, false, message)
    }

    /// Check if this failure is transient resource contention.
    pub fn is_contention(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::Busy | FailureKind::Locked | FailureKind::IoContention | FailureKind::Timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_busy_and_locked_are_retryable() {
        let busy = Failure::storage_code(STORAGE_BUSY, "database is busy");
        assert_eq!(busy.kind, FailureKind::Busy);
        assert!(busy.retryable);

        // SQLITE_BUSY_SNAPSHOT keeps the busy primary code.
        let snapshot = Failure::storage_code(STORAGE_BUSY | (2 << 8), "busy snapshot");
        assert_eq!(snapshot.kind, FailureKind::Busy);

        let locked = Failure::storage_code(STORAGE_LOCKED, "table is locked");
        assert_eq!(locked.kind, FailureKind::Locked);
        assert!(locked.retryable);
    }

    #[test]
    fn test_storage_io_contention_is_retryable() {
        let lock = Failure::storage_code(STORAGE_IOERR_LOCK, "io lock");
        assert_eq!(lock.kind, FailureKind::IoContention);
        assert!(lock.retryable);

        // A plain I/O error is not contention.
        let io = Failure::storage_code(10, "disk I/O error");
        assert_eq!(io.kind, FailureKind::Storage);
        assert!(!io.retryable);
    }

    #[test]
    fn test_storage_permanent_codes() {
        let constraint = Failure::storage_code(STORAGE_CONSTRAINT | (8 << 8), "UNIQUE failed");
        assert_eq!(constraint.kind, FailureKind::Constraint);
        assert!(!constraint.retryable);

        let corrupt = Failure::storage_code(STORAGE_NOT_A_DATABASE, "file is not a database");
        assert_eq!(corrupt.kind, FailureKind::Corrupt);
        assert!(!corrupt.retryable);

        assert!(!Failure::storage("no such column").retryable);
    }

    #[test]
    fn test_network_classification() {
        assert!(Failure::network(FailureKind::Connect, "refused").retryable);
        assert!(Failure::network(FailureKind::Timeout, "deadline").retryable);

        let not_found = Failure::network(FailureKind::ClientError(404), "no such plate");
        assert!(!not_found.retryable);
        assert_eq!(not_found.code, Some(404));

        assert!(!Failure::network(FailureKind::Serialization, "bad json").retryable);
        assert!(!Failure::network(FailureKind::ServerError(500), "boom").retryable);
    }

    #[test]
    fn test_validation_never_retryable() {
        let failure = Failure::validation("plate must have 7 characters");
        assert_eq!(failure.domain, FailureDomain::Validation);
        assert!(!failure.retryable);
    }

    #[test]
    fn test_failure_display() {
        let failure = Failure::storage_code(STORAGE_BUSY, "database is locked");
        assert_eq!(failure.to_string(), "storage busy: database is locked");
    }
}
