//! autoledger - local data core for the fleet tracker.
//!
//! Opening a [`Database`] ensures the schema once; every later data
//! operation runs through a [`ResilientExecutor`] that retries transient
//! storage contention.
//!
//! # Example
//!
//! ```ignore
//! use autoledger::{Database, ServicesBuilder, StoreConfig};
//!
//! let db = Database::open(StoreConfig::new("fleet.db")).await?;
//! let services = ServicesBuilder::new(db).build();
//! let vehicles = services.vehicles.list().await?;
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod lookup;
pub mod registry;
pub mod repository;
pub mod storage;

pub use config::{StoreConfig, StoreLocation};
pub use database::Database;
pub use error::{Error, Result};
pub use lookup::{normalize_plate, PlacardInfo, PlacardLookup, PlacardService, StubPlacardLookup};
pub use registry::{Services, ServicesBuilder};
pub use repository::{
    Maintenance, MaintenanceRepository, NewMaintenance, NewVehicle, Region, RegionRepository,
    Vehicle, VehicleRepository,
};
pub use storage::{schema_failure, storage_failure};

pub use autoledger_resilience::{
    CancelToken, ExecutionError, Failure, FailureDomain, FailureKind, ResilientExecutor,
    RetryPolicy,
};
pub use autoledger_schema::{SchemaDescriptor, SchemaReport, TableOutcome};
