//! Database handle and the startup sequence.

use std::future;
use std::sync::Arc;

use autoledger_resilience::{ResilientExecutor, RetryPolicy};
use autoledger_schema::{
    DefinitionSource, EmbeddedDefinitions, SchemaCatalog, SchemaDescriptor, SchemaMigrator,
    SchemaReport,
};
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::{StoreConfig, StoreLocation};
use crate::error::{Error, Result};
use crate::storage::{schema_failure, storage_failure};

/// Shared database handle.
///
/// Opening runs the schema pass once; every later call is a data operation
/// wrapped by the executor. Clones share the connection.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    executor: ResilientExecutor,
    storage_policy: RetryPolicy,
    catalog: Arc<SchemaCatalog>,
    report: Arc<SchemaReport>,
}

impl Database {
    /// Open the database and bring its schema to the canonical shape.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let executor = executor_for(&config);
        Self::open_with(config, executor, SchemaCatalog::standard(), EmbeddedDefinitions).await
    }

    /// Open with an explicit executor, catalog and definition source.
    pub async fn open_with<D: DefinitionSource>(
        config: StoreConfig,
        executor: ResilientExecutor,
        catalog: SchemaCatalog,
        definitions: D,
    ) -> Result<Self> {
        let conn = open_connection(&config)?;
        let conn = Arc::new(Mutex::new(conn));

        info!(location = %config.location, "ensuring schema");
        let report = executor
            .execute_or_throw("schema.ensure", &config.migrate_policy(), || {
                let mut guard = conn.lock();
                let result =
                    SchemaMigrator::new(&mut guard, catalog.clone(), &definitions).ensure_schema();
                future::ready(result.map_err(|e| schema_failure(&e)))
            })
            .await
            .map_err(Error::Startup)?;

        info!(
            location = %config.location,
            tables = report.tables.len(),
            changed = report.changed(),
            "database opened"
        );

        Ok(Self {
            conn,
            executor,
            storage_policy: config.storage_policy,
            catalog: Arc::new(catalog),
            report: Arc::new(report),
        })
    }

    /// The executor wrapping data operations.
    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    /// The data operation policy.
    pub fn storage_policy(&self) -> &RetryPolicy {
        &self.storage_policy
    }

    /// What the startup schema pass did.
    pub fn startup_report(&self) -> &SchemaReport {
        &self.report
    }

    /// Live shape of every catalog table.
    pub fn schema(&self) -> Result<SchemaDescriptor> {
        let conn = self.conn.lock();
        Ok(SchemaDescriptor::introspect(&conn, &self.catalog.table_names())?)
    }

    /// Run `f` against the connection, retrying transient storage failures
    /// and surfacing the last failure once the policy gives up.
    ///
    /// `f` may run more than once.
    pub async fn with_storage<T, F>(&self, name: &str, mut f: F) -> Result<T>
    where
        F: FnMut(&Connection) -> rusqlite::Result<T>,
    {
        let value = self
            .executor
            .execute_or_throw(name, &self.storage_policy, || {
                let conn = self.conn.lock();
                future::ready(f(&conn).map_err(|e| storage_failure(&e)))
            })
            .await?;
        Ok(value)
    }

    /// Like [`with_storage`](Self::with_storage), but falls back to
    /// `default` once the policy gives up. Only cancellation is an error.
    pub async fn with_storage_or<T, F>(&self, name: &str, default: T, mut f: F) -> Result<T>
    where
        F: FnMut(&Connection) -> rusqlite::Result<T>,
    {
        let value = self
            .executor
            .execute_or_default(name, &self.storage_policy, default, || {
                let conn = self.conn.lock();
                future::ready(f(&conn).map_err(|e| storage_failure(&e)))
            })
            .await?;
        Ok(value)
    }
}

fn executor_for(config: &StoreConfig) -> ResilientExecutor {
    let executor = ResilientExecutor::new();
    match config.slow_threshold {
        Some(threshold) => executor.with_slow_threshold(threshold),
        None => executor,
    }
}

fn open_connection(config: &StoreConfig) -> Result<Connection> {
    let opened = match &config.location {
        StoreLocation::File(path) => Connection::open(path),
        StoreLocation::Memory => Connection::open_in_memory(),
    };
    let conn = opened.map_err(|source| Error::Open {
        location: config.location.to_string(),
        source,
    })?;

    conn.busy_timeout(config.busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
    debug!(
        busy_timeout_ms = config.busy_timeout.as_millis() as u64,
        foreign_keys = config.foreign_keys,
        "connection configured"
    );
    Ok(conn)
}
