//! Attempt observability.
//!
//! Observers are one-way sinks. Their methods return nothing, so nothing a
//! sink does can change a retry decision or an operation's result.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Per-invocation context. Used for observability only.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Operation name.
    pub name: String,
    /// Current attempt, starting at 1.
    pub attempt: u32,
    /// When the invocation started.
    pub started_at: Instant,
}

impl OperationContext {
    /// Start a new invocation.
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempt: 1,
            started_at: Instant::now(),
        }
    }

    /// Time since the invocation started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The operation succeeded.
    Success,
    /// The operation failed; another attempt follows after a backoff wait.
    Retry,
    /// The operation failed retryably but the attempt ceiling was reached.
    Exhausted,
    /// The operation failed and must not be retried.
    Permanent,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::Retry => write!(f, "retry"),
            AttemptOutcome::Exhausted => write!(f, "exhausted"),
            AttemptOutcome::Permanent => write!(f, "permanent"),
        }
    }
}

/// Emitted once per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptEvent {
    /// Operation name.
    pub operation: String,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    /// Attempt outcome.
    pub outcome: AttemptOutcome,
    /// Time spent in this attempt.
    pub elapsed: Duration,
}

/// Emitted when an attempt takes longer than the configured threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowOperationEvent {
    /// Operation name.
    pub operation: String,
    /// Attempt number.
    pub attempt: u32,
    /// Time spent in the attempt.
    pub elapsed: Duration,
    /// Threshold that was exceeded.
    pub threshold: Duration,
}

/// Sink for executor events.
pub trait AttemptObserver: Send + Sync {
    /// Record a finished attempt.
    fn on_attempt(&self, event: &AttemptEvent);

    /// Record a slow attempt.
    fn on_slow(&self, event: &SlowOperationEvent);
}

/// Observer that emits `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AttemptObserver for TracingObserver {
    fn on_attempt(&self, event: &AttemptEvent) {
        let elapsed_ms = event.elapsed.as_millis() as u64;
        match event.outcome {
            AttemptOutcome::Success => tracing::debug!(
                operation = %event.operation,
                attempt = event.attempt,
                outcome = %event.outcome,
                elapsed_ms,
                "operation attempt"
            ),
            _ => tracing::info!(
                operation = %event.operation,
                attempt = event.attempt,
                outcome = %event.outcome,
                elapsed_ms,
                "operation attempt"
            ),
        }
    }

    fn on_slow(&self, event: &SlowOperationEvent) {
        tracing::warn!(
            operation = %event.operation,
            attempt = event.attempt,
            elapsed_ms = event.elapsed.as_millis() as u64,
            threshold_ms = event.threshold.as_millis() as u64,
            "slow operation"
        );
    }
}

/// In-memory observer for testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryObserver {
    attempts: Arc<Mutex<Vec<AttemptEvent>>>,
    slow: Arc<Mutex<Vec<SlowOperationEvent>>>,
}

impl MemoryObserver {
    /// Create a new memory observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded attempt events.
    pub fn attempts(&self) -> Vec<AttemptEvent> {
        self.attempts.lock().clone()
    }

    /// All recorded slow-operation events.
    pub fn slow_events(&self) -> Vec<SlowOperationEvent> {
        self.slow.lock().clone()
    }

    /// Number of recorded attempt events.
    pub fn len(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Check if no attempt was recorded.
    pub fn is_empty(&self) -> bool {
        self.attempts.lock().is_empty()
    }

    /// Clear all events.
    pub fn clear(&self) {
        self.attempts.lock().clear();
        self.slow.lock().clear();
    }
}

impl AttemptObserver for MemoryObserver {
    fn on_attempt(&self, event: &AttemptEvent) {
        self.attempts.lock().push(event.clone());
    }

    fn on_slow(&self, event: &SlowOperationEvent) {
        self.slow.lock().push(event.clone());
    }
}

/// Observer that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl AttemptObserver for NullObserver {
    fn on_attempt(&self, _event: &AttemptEvent) {}

    fn on_slow(&self, _event: &SlowOperationEvent) {}
}
