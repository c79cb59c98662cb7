//! Retry policies.

use crate::failure::{Failure, FailureDomain, FailureKind};
use std::time::Duration;

/// Default attempt ceiling for storage operations.
pub const DEFAULT_STORAGE_ATTEMPTS: u32 = 5;

/// Default base delay for storage operations.
pub const DEFAULT_STORAGE_BASE_DELAY: Duration = Duration::from_millis(50);

/// Default attempt ceiling for network operations.
pub const DEFAULT_NETWORK_ATTEMPTS: u32 = 4;

/// Default base delay for network operations.
pub const DEFAULT_NETWORK_BASE_DELAY: Duration = Duration::from_millis(200);

/// Default upper bound for a single backoff wait.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Always wait `base`.
    Fixed,
    /// Wait `base * attempt`.
    Linear,
    /// Wait `base * 2^attempt`.
    Exponential,
}

impl Backoff {
    /// Delay after the given (1-based) failed attempt, before capping.
    pub fn delay(&self, base: Duration, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed => base,
            Backoff::Linear => base.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        }
    }
}

impl FailureDomain {
    /// Fixed retry taxonomy for this domain.
    ///
    /// A failure tagged with another domain is never retried under this one.
    pub fn classify(&self, failure: &Failure) -> bool {
        if failure.domain != *self {
            return false;
        }
        match self {
            FailureDomain::Storage => matches!(
                failure.kind,
                FailureKind::Busy | FailureKind::Locked | FailureKind::IoContention
            ),
            FailureDomain::Network => {
                matches!(failure.kind, FailureKind::Connect | FailureKind::Timeout)
            }
            FailureDomain::Validation => false,
        }
    }
}

fn retry_flagged(failure: &Failure) -> bool {
    failure.retryable
}

fn never_retry(_failure: &Failure) -> bool {
    false
}

/// Retry policy for one failure domain.
///
/// Policies are built once and shared; the builder methods consume the
/// policy, so a constructed value never changes.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff: Backoff,
    is_retryable: fn(&Failure) -> bool,
}

impl RetryPolicy {
    /// Create a policy that trusts each failure's `retryable` flag.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
            backoff,
            is_retryable: retry_flagged,
        }
    }

    /// Policy for local storage: short linear backoff, since a lock is
    /// usually released quickly.
    pub fn storage() -> Self {
        Self::new(
            DEFAULT_STORAGE_ATTEMPTS,
            DEFAULT_STORAGE_BASE_DELAY,
            Backoff::Linear,
        )
    }

    /// Policy for network calls: exponential backoff.
    pub fn network() -> Self {
        Self::new(
            DEFAULT_NETWORK_ATTEMPTS,
            DEFAULT_NETWORK_BASE_DELAY,
            Backoff::Exponential,
        )
    }

    /// Policy for validation: a single attempt.
    pub fn validation() -> Self {
        Self::new(1, Duration::ZERO, Backoff::Fixed).with_classifier(never_retry)
    }

    /// Default policy for a domain.
    pub fn for_domain(domain: FailureDomain) -> Self {
        match domain {
            FailureDomain::Storage => Self::storage(),
            FailureDomain::Network => Self::network(),
            FailureDomain::Validation => Self::validation(),
        }
    }

    /// Set the attempt ceiling (at least 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the upper bound for a single wait.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the backoff curve.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the retry classifier.
    pub fn with_classifier(mut self, is_retryable: fn(&Failure) -> bool) -> Self {
        self.is_retryable = is_retryable;
        self
    }

    /// Maximum number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base delay.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Backoff curve.
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Whether the failure may be retried under this policy.
    pub fn is_retryable(&self, failure: &Failure) -> bool {
        (self.is_retryable)(failure)
    }

    /// Wait after the given failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff
            .delay(self.base_delay, attempt)
            .min(self.max_delay)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::storage()
    }
}
