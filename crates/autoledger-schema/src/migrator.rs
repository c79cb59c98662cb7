//! Schema migrator.
//!
//! Brings every catalog table to its canonical shape. Absent tables are
//! bootstrapped from their definition; tables missing required columns are
//! rebuilt with rename-create-copy-drop inside one exclusive transaction.

use crate::catalog::{SchemaCatalog, TableSpec};
use crate::definition::{Definition, DefinitionSource, EmbeddedDefinitions};
use crate::descriptor::{explicit_indexes, ColumnSet, SchemaDescriptor};
use crate::error::{is_contention, BootstrapError, SchemaError};
use crate::plan::{quote_ident, MigrationPlan, MigrationStep};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Rows whose natural key had no match and received the default surrogate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedLookup {
    /// Canonical column.
    pub column: String,
    /// Number of rows.
    pub rows: usize,
    /// Surrogate they received.
    pub default_id: i64,
}

/// What ensuring one table did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    /// Already canonical.
    Unchanged,
    /// Absent, created from its definition.
    Created,
    /// Structurally migrated.
    Migrated {
        /// Columns that were added.
        added_columns: Vec<String>,
        /// Rows carried over.
        rows_copied: usize,
        /// Lookups resolved to the default surrogate.
        unresolved: Vec<UnresolvedLookup>,
    },
}

impl TableOutcome {
    /// Check if the table was changed.
    pub fn is_changed(&self) -> bool {
        !matches!(self, TableOutcome::Unchanged)
    }
}

/// Outcome for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    /// Physical table name.
    pub table: String,
    /// Logical name of its definition.
    pub logical_name: String,
    /// Definition version.
    pub version: u32,
    /// What happened.
    pub outcome: TableOutcome,
}

/// Outcome of [`SchemaMigrator::ensure_schema`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    /// Per-table outcomes, auxiliary tables first.
    pub tables: Vec<TableReport>,
}

impl SchemaReport {
    /// The outcome for a physical table.
    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|r| r.table.eq_ignore_ascii_case(table))
            .map(|r| &r.outcome)
    }

    /// Number of tables that were created or migrated.
    pub fn changed(&self) -> usize {
        self.tables.iter().filter(|r| r.outcome.is_changed()).count()
    }

    /// Check if every table was already canonical.
    pub fn is_unchanged(&self) -> bool {
        self.changed() == 0
    }
}

/// Connection pragmas a migration overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pragmas {
    foreign_keys: bool,
    legacy_alter_table: bool,
}

impl Pragmas {
    /// Foreign keys off so the copy can run with the reference rows in any
    /// state; legacy renames so other tables keep pointing at the canonical
    /// name.
    const MIGRATION: Pragmas = Pragmas {
        foreign_keys: false,
        legacy_alter_table: true,
    };

    fn read(conn: &Connection) -> rusqlite::Result<Self> {
        Ok(Self {
            foreign_keys: conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?,
            legacy_alter_table: conn.query_row("PRAGMA legacy_alter_table", [], |row| row.get(0))?,
        })
    }

    fn apply(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.pragma_update(None, "foreign_keys", self.foreign_keys)?;
        conn.pragma_update(None, "legacy_alter_table", self.legacy_alter_table)?;
        Ok(())
    }
}

/// Ensures the catalog's tables over a borrowed connection.
///
/// The migrator does not own the connection's lifecycle.
pub struct SchemaMigrator<'c, D = EmbeddedDefinitions> {
    conn: &'c mut Connection,
    catalog: SchemaCatalog,
    definitions: D,
}

impl<'c> SchemaMigrator<'c, EmbeddedDefinitions> {
    /// The standard catalog with the embedded definitions.
    pub fn standard(conn: &'c mut Connection) -> Self {
        Self::new(conn, SchemaCatalog::standard(), EmbeddedDefinitions)
    }
}

impl<'c, D: DefinitionSource> SchemaMigrator<'c, D> {
    /// Create a migrator.
    pub fn new(conn: &'c mut Connection, catalog: SchemaCatalog, definitions: D) -> Self {
        Self {
            conn,
            catalog,
            definitions,
        }
    }

    /// The catalog.
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Live shape of every catalog table.
    pub fn descriptor(&self) -> Result<SchemaDescriptor, SchemaError> {
        Ok(SchemaDescriptor::introspect(
            self.conn,
            &self.catalog.table_names(),
        )?)
    }

    /// Ensure every catalog table: auxiliary tables first, then managed
    /// tables in declaration order.
    ///
    /// Stops at the first failure. Tables ensured before it stay ensured;
    /// the failing table is left as it was.
    pub fn ensure_schema(&mut self) -> Result<SchemaReport, SchemaError> {
        let catalog = self.catalog.clone();
        let mut report = SchemaReport::default();

        for aux in catalog.auxiliary() {
            let definition = self.definitions.get_definition(&aux.logical_name)?;
            let outcome = self.ensure_auxiliary(&aux.table, &definition)?;
            report.tables.push(TableReport {
                table: aux.table.clone(),
                logical_name: aux.logical_name.clone(),
                version: definition.version,
                outcome,
            });
        }

        for spec in catalog.managed() {
            let definition = self.definitions.get_definition(&spec.logical_name)?;
            let outcome = self.ensure_managed(spec, &definition)?;
            report.tables.push(TableReport {
                table: spec.table.clone(),
                logical_name: spec.logical_name.clone(),
                version: definition.version,
                outcome,
            });
        }

        info!(
            tables = report.tables.len(),
            changed = report.changed(),
            "schema ensured"
        );
        Ok(report)
    }

    /// Create an auxiliary table if it is absent. Idempotent.
    pub fn ensure_auxiliary_table(&mut self, logical_name: &str) -> Result<TableOutcome, SchemaError> {
        let aux = self
            .catalog
            .auxiliary_by_name(logical_name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownTable(logical_name.to_string()))?;
        let definition = self.definitions.get_definition(logical_name)?;
        self.ensure_auxiliary(&aux.table, &definition)
    }

    /// Ensure a single managed table.
    pub fn ensure_table(&mut self, logical_name: &str) -> Result<TableOutcome, SchemaError> {
        let spec = self
            .catalog
            .table_by_name(logical_name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownTable(logical_name.to_string()))?;
        let definition = self.definitions.get_definition(logical_name)?;
        self.ensure_managed(&spec, &definition)
    }

    /// The plan that would bring a managed table to its canonical shape.
    ///
    /// `None` when the table is absent and would be bootstrapped.
    pub fn plan(&self, logical_name: &str) -> Result<Option<MigrationPlan>, SchemaError> {
        let spec = self
            .catalog
            .table_by_name(logical_name)
            .ok_or_else(|| SchemaError::UnknownTable(logical_name.to_string()))?;
        let definition = self.definitions.get_definition(logical_name)?;
        let target = target_columns(&spec.table, &definition)?;

        match live_columns(self.conn, &spec.table)? {
            Some(live) => {
                let indexes = explicit_indexes(self.conn, &spec.table)?;
                Ok(Some(MigrationPlan::build(
                    spec,
                    &live,
                    &target,
                    &definition.ddl,
                    &indexes,
                )))
            }
            None => Ok(None),
        }
    }

    fn ensure_auxiliary(
        &mut self,
        table: &str,
        definition: &Definition,
    ) -> Result<TableOutcome, SchemaError> {
        if live_columns(self.conn, table)?.is_some()
            || self.bootstrap(table, definition)?.is_some()
        {
            debug!(table, "auxiliary table present");
            return Ok(TableOutcome::Unchanged);
        }
        Ok(TableOutcome::Created)
    }

    fn ensure_managed(
        &mut self,
        spec: &TableSpec,
        definition: &Definition,
    ) -> Result<TableOutcome, SchemaError> {
        let target = target_columns(&spec.table, definition)?;

        let live = match live_columns(self.conn, &spec.table)? {
            Some(live) => live,
            None => match self.bootstrap(&spec.table, definition)? {
                Some(live) => live,
                None => return Ok(TableOutcome::Created),
            },
        };

        let indexes = explicit_indexes(self.conn, &spec.table)?;
        let plan = MigrationPlan::build(spec, &live, &target, &definition.ddl, &indexes);
        if plan.is_empty() {
            debug!(table = %spec.table, "table is canonical");
            return Ok(TableOutcome::Unchanged);
        }

        for column in plan.dropped_columns(&live) {
            warn!(table = %spec.table, column = %column, "legacy column is not carried over");
        }

        info!(
            table = %spec.table,
            version = definition.version,
            missing = ?plan.missing_columns,
            steps = plan.step_count(),
            "migrating table"
        );
        self.migrate(&plan)
    }

    /// Create `table` from its definition.
    ///
    /// The table is looked up again once the write lock is held. If another
    /// connection created it in the meantime nothing is written and its live
    /// columns are returned.
    fn bootstrap(
        &mut self,
        table: &str,
        definition: &Definition,
    ) -> Result<Option<ColumnSet>, SchemaError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(live) = live_columns(&tx, table)? {
            debug!(table, "table already created by another connection");
            return Ok(Some(live));
        }

        tx.execute_batch(&definition.ddl)
            .map_err(|source| SchemaError::Create {
                table: table.to_string(),
                source,
            })?;
        tx.commit()?;

        info!(table, version = definition.version, "created table");
        Ok(None)
    }

    fn migrate(&mut self, plan: &MigrationPlan) -> Result<TableOutcome, SchemaError> {
        let saved = Pragmas::read(self.conn)?;

        let result = Pragmas::MIGRATION
            .apply(self.conn)
            .map_err(SchemaError::from)
            .and_then(|()| run_plan(self.conn, plan));

        match &result {
            Ok((rows_copied, unresolved)) => {
                for lookup in unresolved {
                    warn!(
                        table = %plan.table,
                        column = %lookup.column,
                        rows = lookup.rows,
                        default_id = lookup.default_id,
                        "unresolved lookups set to default"
                    );
                }
                info!(table = %plan.table, rows = rows_copied, "migrated table");
            }
            Err(err) => warn!(table = %plan.table, error = %err, "migration rolled back"),
        }

        let (rows_copied, unresolved) = settle(&plan.table, result, saved.apply(self.conn))?;
        Ok(TableOutcome::Migrated {
            added_columns: plan.missing_columns.clone(),
            rows_copied,
            unresolved,
        })
    }
}

/// Live columns, or `None` when the table is absent.
///
/// A busy or locked database is an error so the caller can retry. Any other
/// introspection failure is logged and the table is treated as absent.
fn live_columns(conn: &Connection, table: &str) -> Result<Option<ColumnSet>, SchemaError> {
    match SchemaDescriptor::introspect_table(conn, table) {
        Ok(columns) => Ok(columns),
        Err(err) if is_contention(&err) => Err(SchemaError::Storage(err)),
        Err(err) => {
            warn!(table, error = %err, "introspection failed, treating table as absent");
            Ok(None)
        }
    }
}

/// Combine a migration result with restoring the connection pragmas.
///
/// A failed migration keeps its own error. A committed migration whose
/// pragmas could not be restored is [`SchemaError::Restore`].
fn settle<T>(
    table: &str,
    result: Result<T, SchemaError>,
    restored: rusqlite::Result<()>,
) -> Result<T, SchemaError> {
    match (result, restored) {
        (result, Ok(())) => result,
        (Err(err), Err(restore)) => {
            warn!(table, error = %restore, "could not restore connection pragmas");
            Err(err)
        }
        (Ok(_), Err(source)) => Err(SchemaError::Restore {
            table: table.to_string(),
            source,
        }),
    }
}

/// Columns the definition gives `table`.
fn target_columns(table: &str, definition: &Definition) -> Result<ColumnSet, SchemaError> {
    let target = SchemaDescriptor::of_definition(&definition.ddl).map_err(|e| {
        BootstrapError::InvalidDefinition {
            logical_name: definition.logical_name.clone(),
            reason: e.to_string(),
        }
    })?;

    target.columns(table).cloned().ok_or_else(|| {
        BootstrapError::InvalidDefinition {
            logical_name: definition.logical_name.clone(),
            reason: format!("does not define table {}", table),
        }
        .into()
    })
}

/// Run every step in one exclusive transaction.
///
/// Returns rows copied and unresolved lookups. Any error drops the
/// transaction, which rolls it back.
fn run_plan(
    conn: &mut Connection,
    plan: &MigrationPlan,
) -> Result<(usize, Vec<UnresolvedLookup>), SchemaError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;

    let expected = count(&tx, &format!("SELECT COUNT(*) FROM {}", quote_ident(&plan.table)))?;

    let mut unresolved = Vec::new();
    for check in &plan.lookup_checks {
        let rows = count(&tx, &check.count_sql(&plan.table))?;
        if rows > 0 {
            unresolved.push(UnresolvedLookup {
                column: check.column.clone(),
                rows,
                default_id: check.default_id,
            });
        }
    }

    let mut copied = 0;
    for (step_index, step) in plan.steps.iter().enumerate() {
        let result = match step {
            MigrationStep::CopyRows(copy) => tx.execute(&copy.to_sql(), []).map(|n| copied = n),
            _ => tx.execute_batch(&step.to_sql()),
        };
        result.map_err(|source| SchemaError::Migration {
            table: plan.table.clone(),
            step_index,
            step: step.name(),
            source,
        })?;
        debug!(table = %plan.table, step = %step, "step done");
    }

    if copied != expected {
        return Err(SchemaError::RowCountMismatch {
            table: plan.table.clone(),
            expected,
            copied,
        });
    }

    tx.commit()?;
    Ok((copied, unresolved))
}

fn count(conn: &Connection, sql: &str) -> rusqlite::Result<usize> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n.max(0) as usize)
}
