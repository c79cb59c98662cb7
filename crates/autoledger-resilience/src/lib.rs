//! autoledger resilience - retry and backoff execution.
//!
//! Wraps fallible storage and network calls so that callers observe either
//! a success or a terminal, classified failure.
//!
//! # Example
//!
//! ```ignore
//! use autoledger_resilience::{Failure, ResilientExecutor, RetryPolicy};
//!
//! let executor = ResilientExecutor::new();
//! let rows = executor
//!     .execute_or_throw("vehicle.count", &RetryPolicy::storage(), || async {
//!         count_rows().map_err(|e| Failure::storage_code(e.code, e.message))
//!     })
//!     .await?;
//! ```

pub mod cancel;
pub mod error;
pub mod executor;
pub mod failure;
pub mod observer;
pub mod policy;

pub use cancel::CancelToken;
pub use error::ExecutionError;
pub use executor::ResilientExecutor;
pub use failure::{Failure, FailureDomain, FailureKind};
pub use observer::{
    AttemptEvent, AttemptObserver, AttemptOutcome, MemoryObserver, NullObserver,
    OperationContext, SlowOperationEvent, TracingObserver,
};
pub use policy::{Backoff, RetryPolicy};
