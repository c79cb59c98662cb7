//! Executor error types.

use crate::failure::Failure;
use thiserror::Error;

/// Terminal outcome of a resilient execution that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Every allowed attempt failed with a retryable failure.
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Operation name.
        operation: String,
        /// Attempts performed.
        attempts: u32,
        /// The last failure.
        source: Failure,
    },

    /// The operation failed with a failure that must not be retried.
    #[error("{operation} failed permanently on attempt {attempt}: {source}")]
    Permanent {
        /// Operation name.
        operation: String,
        /// Attempt that failed.
        attempt: u32,
        /// The failure.
        source: Failure,
    },

    /// The invocation was cancelled.
    #[error("{operation} cancelled before attempt {attempt}")]
    Cancelled {
        /// Operation name.
        operation: String,
        /// The attempt that would have run next.
        attempt: u32,
    },
}

impl ExecutionError {
    /// The underlying failure, if the operation actually failed.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            ExecutionError::Exhausted { source, .. } | ExecutionError::Permanent { source, .. } => {
                Some(source)
            }
            ExecutionError::Cancelled { .. } => None,
        }
    }

    /// Number of attempts actually performed.
    pub fn attempts(&self) -> u32 {
        match self {
            ExecutionError::Exhausted { attempts, .. } => *attempts,
            ExecutionError::Permanent { attempt, .. } => *attempt,
            ExecutionError::Cancelled { attempt, .. } => attempt.saturating_sub(1),
        }
    }

    /// Check if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::Cancelled { .. })
    }

    /// The operation name.
    pub fn operation(&self) -> &str {
        match self {
            ExecutionError::Exhausted { operation, .. }
            | ExecutionError::Permanent { operation, .. }
            | ExecutionError::Cancelled { operation, .. } => operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExecutionError::Exhausted {
            operation: "vehicle.insert".to_string(),
            attempts: 5,
            source: Failure::storage_code(crate::failure::STORAGE_BUSY, "database is locked"),
        };
        assert_eq!(
            err.to_string(),
            "vehicle.insert failed after 5 attempt(s): storage busy: database is locked"
        );
        assert_eq!(err.attempts(), 5);
        assert!(err.failure().is_some());
    }

    #[test]
    fn test_cancelled_has_no_failure() {
        let err = ExecutionError::Cancelled {
            operation: "placard.lookup".to_string(),
            attempt: 3,
        };
        assert!(err.is_cancelled());
        assert!(err.failure().is_none());
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.operation(), "placard.lookup");
    }
}
