//! Resilient operation executor.
//!
//! Runs a caller-supplied operation, classifies each failure and retries
//! with the policy's backoff. Waiting uses `tokio::time::sleep`, so only the
//! calling task is suspended.

use crate::cancel::CancelToken;
use crate::error::ExecutionError;
use crate::failure::{Failure, FailureDomain};
use crate::observer::{
    AttemptEvent, AttemptObserver, AttemptOutcome, OperationContext, SlowOperationEvent,
    TracingObserver,
};
use crate::policy::RetryPolicy;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Executes fallible operations with retries.
///
/// Cloning is cheap; clones share the observer.
#[derive(Clone)]
pub struct ResilientExecutor {
    observer: Arc<dyn AttemptObserver>,
    slow_threshold: Option<Duration>,
    cancel: CancelToken,
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("slow_threshold", &self.slow_threshold)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Default for ResilientExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilientExecutor {
    /// Create an executor that logs attempts through `tracing`.
    pub fn new() -> Self {
        Self {
            observer: Arc::new(TracingObserver),
            slow_threshold: None,
            cancel: CancelToken::new(),
        }
    }

    /// Replace the observer.
    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Emit a slow-operation event when an attempt exceeds `threshold`.
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// Use the given cancellation signal.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cancellation signal checked by this executor.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run `op`, returning `default` once the policy gives up.
    ///
    /// The swallowed failure is logged at warn level. Cancellation is still
    /// reported as an error; it is never turned into the default value.
    pub async fn execute_or_default<T, F, Fut>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        default: T,
        op: F,
    ) -> Result<T, ExecutionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        match self.execute_or_throw(name, policy, op).await {
            Ok(value) => Ok(value),
            Err(err @ ExecutionError::Cancelled { .. }) => Err(err),
            Err(err) => {
                tracing::warn!(
                    operation = name,
                    attempts = err.attempts(),
                    error = %err,
                    "operation failed, using default value"
                );
                Ok(default)
            }
        }
    }

    /// Run `op`, surfacing the last failure once the policy gives up.
    pub async fn execute_or_throw<T, F, Fut>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        op: F,
    ) -> Result<T, ExecutionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        self.run(name, policy, policy.max_attempts(), |f| policy.is_retryable(f), op)
            .await
    }

    /// Run `op`, classifying failures with the fixed taxonomy of `domain`
    /// instead of the policy's classifier.
    pub async fn execute_domain<T, F, Fut>(
        &self,
        name: &str,
        domain: FailureDomain,
        policy: &RetryPolicy,
        max_attempts: u32,
        op: F,
    ) -> Result<T, ExecutionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        self.run(name, policy, max_attempts.max(1), |f| domain.classify(f), op)
            .await
    }

    async fn run<T, F, Fut, R>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        max_attempts: u32,
        retryable: R,
        mut op: F,
    ) -> Result<T, ExecutionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
        R: Fn(&Failure) -> bool,
    {
        let mut ctx = OperationContext::start(name);

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(&ctx));
            }

            let attempt_started = Instant::now();
            let result = op().await;
            let elapsed = attempt_started.elapsed();
            self.check_slow(&ctx, elapsed);

            let failure = match result {
                Ok(value) => {
                    self.record(&ctx, AttemptOutcome::Success, elapsed);
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if !retryable(&failure) {
                self.record(&ctx, AttemptOutcome::Permanent, elapsed);
                return Err(ExecutionError::Permanent {
                    operation: ctx.name,
                    attempt: ctx.attempt,
                    source: failure,
                });
            }

            if ctx.attempt >= max_attempts {
                self.record(&ctx, AttemptOutcome::Exhausted, elapsed);
                return Err(ExecutionError::Exhausted {
                    operation: ctx.name,
                    attempts: ctx.attempt,
                    source: failure,
                });
            }

            self.record(&ctx, AttemptOutcome::Retry, elapsed);
            let delay = policy.delay_for(ctx.attempt);
            tracing::debug!(
                operation = %ctx.name,
                attempt = ctx.attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "retrying after backoff"
            );

            ctx.attempt += 1;
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(&ctx));
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return Err(self.cancelled(&ctx)),
            }
        }
    }

    fn record(&self, ctx: &OperationContext, outcome: AttemptOutcome, elapsed: Duration) {
        self.observer.on_attempt(&AttemptEvent {
            operation: ctx.name.clone(),
            attempt: ctx.attempt,
            outcome,
            elapsed,
        });
    }

    fn check_slow(&self, ctx: &OperationContext, elapsed: Duration) {
        if let Some(threshold) = self.slow_threshold {
            if elapsed > threshold {
                self.observer.on_slow(&SlowOperationEvent {
                    operation: ctx.name.clone(),
                    attempt: ctx.attempt,
                    elapsed,
                    threshold,
                });
            }
        }
    }

    fn cancelled(&self, ctx: &OperationContext) -> ExecutionError {
        tracing::info!(
            operation = %ctx.name,
            attempt = ctx.attempt,
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "operation cancelled"
        );
        ExecutionError::Cancelled {
            operation: ctx.name.clone(),
            attempt: ctx.attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::{FailureKind, STORAGE_BUSY, STORAGE_CONSTRAINT};
    use crate::observer::MemoryObserver;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor() -> (ResilientExecutor, MemoryObserver) {
        let observer = MemoryObserver::new();
        let executor = ResilientExecutor::new().with_observer(Arc::new(observer.clone()));
        (executor, observer)
    }

    fn busy() -> Failure {
        Failure::storage_code(STORAGE_BUSY, "database is locked")
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let (executor, observer) = executor();
        let value = executor
            .execute_or_throw("count", &RetryPolicy::storage(), || async { Ok::<_, Failure>(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(observer.len(), 1);
        assert_eq!(observer.attempts()[0].outcome, AttemptOutcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_failure() {
        let (executor, observer) = executor();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::storage().with_max_attempts(3);

        let err = executor
            .execute_or_throw("insert", &policy, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(busy()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, ExecutionError::Exhausted { attempts: 3, .. }));
        assert_eq!(err.failure().unwrap().kind, FailureKind::Busy);

        let outcomes: Vec<_> = observer.attempts().iter().map(|e| e.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                AttemptOutcome::Retry,
                AttemptOutcome::Retry,
                AttemptOutcome::Exhausted
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_accumulate() {
        let (executor, _) = executor();
        let policy = RetryPolicy::storage()
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(100));

        let started = Instant::now();
        let _ = executor
            .execute_or_throw("insert", &policy, || async { Err::<(), _>(busy()) })
            .await;

        // Linear: 100ms after attempt 1, 200ms after attempt 2.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300));
        assert!(waited < Duration::from_millis(310));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_single_attempt() {
        let (executor, observer) = executor();
        let calls = AtomicU32::new(0);

        let err = executor
            .execute_or_throw("insert", &RetryPolicy::storage().with_max_attempts(10), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Failure::storage_code(STORAGE_CONSTRAINT, "UNIQUE failed")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ExecutionError::Permanent { attempt: 1, .. }));
        assert_eq!(observer.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_or_default_swallows_failure() {
        let (executor, _) = executor();
        let policy = RetryPolicy::storage().with_max_attempts(2);

        let value = executor
            .execute_or_default("list", &policy, Vec::<i64>::new(), || async {
                Err(busy())
            })
            .await
            .unwrap();

        assert!(value.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_or_default_does_not_hide_cancellation() {
        let (executor, _) = executor();
        executor.cancel_token().cancel();

        let err = executor
            .execute_or_default("list", &RetryPolicy::storage(), 0u32, || async { Ok(1) })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_taxonomy_overrides_flag() {
        let (executor, _) = executor();
        let calls = AtomicU32::new(0);

        // Flagged retryable, but a storage failure is never retried under the
        // network taxonomy.
        let err = executor
            .execute_domain(
                "lookup",
                FailureDomain::Network,
                &RetryPolicy::network(),
                5,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(busy()) }
                },
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ExecutionError::Permanent { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_max_attempts_override() {
        let (executor, _) = executor();
        let calls = AtomicU32::new(0);

        let err = executor
            .execute_domain(
                "lookup",
                FailureDomain::Network,
                &RetryPolicy::network().with_max_attempts(10),
                2,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(Failure::network(FailureKind::Timeout, "deadline")) }
                },
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(err, ExecutionError::Exhausted { attempts: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_domain_short_circuits() {
        let (executor, observer) = executor();

        let err = executor
            .execute_domain(
                "plate",
                FailureDomain::Validation,
                &RetryPolicy::validation(),
                5,
                || async { Err::<(), _>(Failure::validation("empty plate")) },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Permanent { attempt: 1, .. }));
        assert_eq!(observer.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_emits_warning_event() {
        let observer = MemoryObserver::new();
        let executor = ResilientExecutor::new()
            .with_observer(Arc::new(observer.clone()))
            .with_slow_threshold(Duration::from_millis(500));

        executor
            .execute_or_throw("report", &RetryPolicy::storage(), || async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, Failure>(())
            })
            .await
            .unwrap();

        let slow = observer.slow_events();
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].threshold, Duration::from_millis(500));
        assert!(slow[0].elapsed >= Duration::from_secs(1));
        assert_eq!(observer.attempts()[0].outcome, AttemptOutcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let (executor, observer) = executor();
        executor.cancel_token().cancel();
        let calls = AtomicU32::new(0);

        let err = executor
            .execute_or_throw("insert", &RetryPolicy::storage(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Failure>(()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Cancelled { attempt: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(observer.is_empty());
    }
}
