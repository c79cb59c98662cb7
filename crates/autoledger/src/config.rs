//! Storage configuration.

use autoledger_resilience::RetryPolicy;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default database file.
pub const DEFAULT_DB_PATH: &str = "./autoledger.db";

/// Default number of startup schema attempts.
pub const DEFAULT_MIGRATE_ATTEMPTS: u32 = 3;

/// Default slow-operation threshold in milliseconds.
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 250;

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// An on-disk database file.
    File(PathBuf),
    /// A private in-memory database.
    Memory,
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::File(path) => write!(f, "{}", path.display()),
            StoreLocation::Memory => write!(f, ":memory:"),
        }
    }
}

/// Data core configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database location.
    pub location: StoreLocation,

    /// How long the engine itself waits on a lock. Zero hands contention
    /// straight to the retry policy.
    pub busy_timeout: Duration,

    /// Enforce foreign keys on the connection.
    pub foreign_keys: bool,

    /// Attempts taking longer than this emit a slow-operation event.
    /// None disables the warning.
    pub slow_threshold: Option<Duration>,

    /// Attempts allowed for the startup schema pass.
    pub migrate_attempts: u32,

    /// Policy for ordinary data operations.
    pub storage_policy: RetryPolicy,
}

impl StoreConfig {
    /// Create a configuration for a database file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::at(StoreLocation::File(path.into()))
    }

    /// Create a configuration for an in-memory database.
    pub fn in_memory() -> Self {
        Self::at(StoreLocation::Memory)
    }

    fn at(location: StoreLocation) -> Self {
        Self {
            location,
            busy_timeout: Duration::ZERO,
            foreign_keys: true,
            slow_threshold: Some(Duration::from_millis(DEFAULT_SLOW_THRESHOLD_MS)),
            migrate_attempts: DEFAULT_MIGRATE_ATTEMPTS,
            storage_policy: RetryPolicy::storage(),
        }
    }

    /// Set the engine busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Enable or disable foreign key enforcement.
    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the slow-operation threshold.
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// Disable slow-operation warnings.
    pub fn without_slow_threshold(mut self) -> Self {
        self.slow_threshold = None;
        self
    }

    /// Set the startup schema attempts.
    pub fn with_migrate_attempts(mut self, attempts: u32) -> Self {
        self.migrate_attempts = attempts.max(1);
        self
    }

    /// Set the data operation policy.
    pub fn with_storage_policy(mut self, policy: RetryPolicy) -> Self {
        self.storage_policy = policy;
        self
    }

    /// The startup schema policy: the storage policy capped at
    /// `migrate_attempts`.
    pub fn migrate_policy(&self) -> RetryPolicy {
        self.storage_policy.with_max_attempts(self.migrate_attempts)
    }

    /// Check if the database is in memory.
    pub fn is_in_memory(&self) -> bool {
        self.location == StoreLocation::Memory
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DB_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.location, StoreLocation::File(PathBuf::from(DEFAULT_DB_PATH)));
        assert_eq!(config.busy_timeout, Duration::ZERO);
        assert!(config.foreign_keys);
        assert_eq!(config.migrate_attempts, DEFAULT_MIGRATE_ATTEMPTS);
        assert!(!config.is_in_memory());
    }

    #[test]
    fn test_config_builder() {
        let config = StoreConfig::in_memory()
            .with_busy_timeout(Duration::from_millis(100))
            .with_foreign_keys(false)
            .without_slow_threshold()
            .with_migrate_attempts(0);

        assert!(config.is_in_memory());
        assert_eq!(config.location.to_string(), ":memory:");
        assert_eq!(config.busy_timeout, Duration::from_millis(100));
        assert!(!config.foreign_keys);
        assert!(config.slow_threshold.is_none());
        assert_eq!(config.migrate_attempts, 1);
        assert_eq!(config.migrate_policy().max_attempts(), 1);
    }
}
