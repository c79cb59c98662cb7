//! Placard lookup.
//!
//! The registry service behind a license plate is an external collaborator.
//! [`PlacardService`] validates plates and calls it through the executor
//! in the network domain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use autoledger_resilience::{
    Failure, FailureDomain, FailureKind, ResilientExecutor, RetryPolicy,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// Length of a normalized plate.
pub const PLATE_LEN: usize = 7;

/// Registry data for a plate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacardInfo {
    pub plate: String,
    pub model: String,
    pub model_year: Option<i32>,
    pub region_code: String,
}

impl PlacardInfo {
    pub fn new(
        plate: impl Into<String>,
        model: impl Into<String>,
        model_year: Option<i32>,
        region_code: impl Into<String>,
    ) -> Self {
        Self {
            plate: plate.into(),
            model: model.into(),
            model_year,
            region_code: region_code.into(),
        }
    }
}

/// A plate registry.
#[async_trait]
pub trait PlacardLookup: Send + Sync {
    /// Look up a normalized plate.
    async fn lookup(&self, plate: &str) -> std::result::Result<PlacardInfo, Failure>;
}

/// In-memory registry.
///
/// Can be armed to fail the next calls with a network failure.
#[derive(Debug, Default)]
pub struct StubPlacardLookup {
    entries: HashMap<String, PlacardInfo>,
    armed: Mutex<Option<(u32, FailureKind)>>,
    calls: AtomicU32,
}

impl StubPlacardLookup {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a few demo plates.
    pub fn sample() -> Self {
        Self::new()
            .with_entry(PlacardInfo::new("ABC1D23", "Hatch", Some(2019), "SP"))
            .with_entry(PlacardInfo::new("XYZ9K87", "Pickup", Some(2021), "MG"))
            .with_entry(PlacardInfo::new("JKL4M56", "Sedan", None, "RJ"))
    }

    /// Add an entry.
    pub fn with_entry(mut self, info: PlacardInfo) -> Self {
        self.entries.insert(info.plate.clone(), info);
        self
    }

    /// Fail the next `times` calls with `kind`.
    pub fn fail_next(&self, times: u32, kind: FailureKind) {
        *self.armed.lock() = if times == 0 { None } else { Some((times, kind)) };
    }

    /// Number of calls made.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn take_armed(&self) -> Option<FailureKind> {
        let mut armed = self.armed.lock();
        let (remaining, kind) = armed.take()?;
        if remaining > 1 {
            *armed = Some((remaining - 1, kind));
        }
        Some(kind)
    }
}

#[async_trait]
impl PlacardLookup for StubPlacardLookup {
    async fn lookup(&self, plate: &str) -> std::result::Result<PlacardInfo, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(kind) = self.take_armed() {
            return Err(Failure::network(kind, format!("lookup of {} failed", plate)));
        }

        self.entries.get(plate).cloned().ok_or_else(|| {
            Failure::network(
                FailureKind::ClientError(404),
                format!("plate {} not registered", plate),
            )
        })
    }
}

/// Normalize and validate a plate.
///
/// Separators and case are ignored; the rest must be exactly seven ASCII
/// letters or digits.
pub fn normalize_plate(plate: &str) -> std::result::Result<String, Failure> {
    let normalized: String = plate
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if normalized.len() != PLATE_LEN || !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Failure::validation(format!("invalid plate: {:?}", plate)));
    }
    Ok(normalized)
}

/// Plate lookups through the executor.
#[derive(Clone)]
pub struct PlacardService {
    lookup: Arc<dyn PlacardLookup>,
    executor: ResilientExecutor,
    policy: RetryPolicy,
}

impl PlacardService {
    /// Create a service with the network policy.
    pub fn new(lookup: Arc<dyn PlacardLookup>, executor: ResilientExecutor) -> Self {
        Self {
            lookup,
            executor,
            policy: RetryPolicy::network(),
        }
    }

    /// Set the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate `plate` and look it up.
    ///
    /// Invalid plates fail on the first attempt without reaching the
    /// registry.
    pub async fn lookup(&self, plate: &str) -> Result<PlacardInfo> {
        let normalized = self
            .executor
            .execute_domain(
                "placard.validate",
                FailureDomain::Validation,
                &RetryPolicy::validation(),
                1,
                || std::future::ready(normalize_plate(plate)),
            )
            .await?;

        debug!(plate = %normalized, "looking up placard");
        let info = self
            .executor
            .execute_domain(
                "placard.lookup",
                FailureDomain::Network,
                &self.policy,
                self.policy.max_attempts(),
                || {
                    let lookup = Arc::clone(&self.lookup);
                    let plate = normalized.clone();
                    async move { lookup.lookup(&plate).await }
                },
            )
            .await?;
        Ok(info)
    }
}

impl std::fmt::Debug for PlacardService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacardService")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
