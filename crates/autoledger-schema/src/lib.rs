//! autoledger schema - self-healing SQLite schema migration.
//!
//! At startup every table in the [`SchemaCatalog`] is compared against its
//! canonical definition. Absent tables are created; tables missing required
//! columns are rebuilt in one exclusive transaction, with legacy natural keys
//! re-resolved into surrogate keys. A failed migration rolls back and leaves
//! the table exactly as it was.
//!
//! # Example
//!
//! ```ignore
//! use autoledger_schema::SchemaMigrator;
//!
//! let mut conn = rusqlite::Connection::open("fleet.db")?;
//! let report = SchemaMigrator::standard(&mut conn).ensure_schema()?;
//! println!("{} tables changed", report.changed());
//! ```

pub mod catalog;
pub mod definition;
pub mod descriptor;
pub mod error;
pub mod migrator;
pub mod plan;

pub use catalog::{AuxiliarySpec, ColumnDefault, LookupMapping, SchemaCatalog, TableSpec};
pub use definition::{Definition, DefinitionSource, EmbeddedDefinitions, StaticDefinitions};
pub use descriptor::{ColumnSet, SchemaDescriptor};
pub use error::{is_contention, sqlite_code, BootstrapError, SchemaError};
pub use migrator::{SchemaMigrator, SchemaReport, TableOutcome, TableReport, UnresolvedLookup};
pub use plan::{CopyRows, LookupJoin, MigrationPlan, MigrationStep};
