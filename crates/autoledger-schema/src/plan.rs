//! Migration plans.
//!
//! A plan is the ordered rename-create-copy-drop sequence that brings one
//! live table to its canonical shape. Plans are pure data; the migrator
//! executes them.

use crate::catalog::{ColumnDefault, TableSpec};
use crate::descriptor::{missing_from, ColumnSet};
use std::fmt;

/// Suffix of the temporary name a legacy table is renamed to.
pub const TEMP_SUFFIX: &str = "_migrating";

/// Alias of the legacy table inside the copy statement.
const SOURCE_ALIAS: &str = "src";

/// Quote an SQL identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Where a canonical column's value comes from during the copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// Copied from the legacy column of that name.
    Column(String),
    /// Resolved through the lookup join at this index, default on no match.
    Lookup {
        /// Index into [`CopyRows::joins`].
        join: usize,
        /// Surrogate used when the join finds nothing.
        default_id: i64,
    },
    /// The legacy table has no natural key to resolve, so every row gets the
    /// default surrogate.
    Constant(i64),
    /// An SQL fill expression.
    Expression(String),
}

/// One canonical column in the copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Canonical column.
    pub column: String,
    /// Source of its value.
    pub source: ColumnSource,
}

/// Natural-key to surrogate-key join against a reference table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupJoin {
    /// Join alias, `j0`, `j1`, ...
    pub alias: String,
    /// Legacy column holding the natural key.
    pub legacy_column: String,
    /// Reference table.
    pub reference_table: String,
    /// Natural-key column of the reference table.
    pub natural_key: String,
    /// Surrogate-key column of the reference table.
    pub surrogate_key: String,
}

impl LookupJoin {
    /// Render the `LEFT JOIN` clause.
    ///
    /// The reference table is collapsed to one surrogate per natural key
    /// first, so duplicate codes cannot multiply copied rows.
    pub fn to_sql(&self) -> String {
        format!(
            "LEFT JOIN (SELECT {nk} AS k, MIN({sk}) AS v FROM {rt} GROUP BY {nk}) AS {alias} ON {alias}.k = {src}.{lc}",
            nk = quote_ident(&self.natural_key),
            sk = quote_ident(&self.surrogate_key),
            rt = quote_ident(&self.reference_table),
            alias = self.alias,
            src = SOURCE_ALIAS,
            lc = quote_ident(&self.legacy_column),
        )
    }

    /// Count rows of `table` whose natural key has no match.
    pub fn unresolved_sql(&self, table: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM {t} AS {src} WHERE NOT EXISTS (SELECT 1 FROM {rt} AS r WHERE r.{nk} = {src}.{lc})",
            t = quote_ident(table),
            src = SOURCE_ALIAS,
            rt = quote_ident(&self.reference_table),
            nk = quote_ident(&self.natural_key),
            lc = quote_ident(&self.legacy_column),
        )
    }
}

/// Row copy from the renamed legacy table into the canonical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRows {
    /// Temporary (legacy) table.
    pub from: String,
    /// Canonical table.
    pub to: String,
    /// Canonical columns and their sources.
    pub mapping: Vec<ColumnMapping>,
    /// Lookup joins referenced by the mapping.
    pub joins: Vec<LookupJoin>,
    /// Fill expressions that were applied.
    pub defaults: Vec<ColumnDefault>,
}

impl CopyRows {
    /// Render the `INSERT .. SELECT` statement.
    pub fn to_sql(&self) -> String {
        let (columns, values): (Vec<String>, Vec<String>) = if self.mapping.is_empty() {
            (vec!["rowid".to_string()], vec![format!("{}.rowid", SOURCE_ALIAS)])
        } else {
            self.mapping
                .iter()
                .map(|m| (quote_ident(&m.column), self.value_sql(&m.source)))
                .unzip()
        };

        let mut sql = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} AS {}",
            quote_ident(&self.to),
            columns.join(", "),
            values.join(", "),
            quote_ident(&self.from),
            SOURCE_ALIAS,
        );
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }
        sql
    }

    fn value_sql(&self, source: &ColumnSource) -> String {
        match source {
            ColumnSource::Column(name) => format!("{}.{}", SOURCE_ALIAS, quote_ident(name)),
            ColumnSource::Lookup { join, default_id } => match self.joins.get(*join) {
                Some(j) => format!("COALESCE({}.v, {})", j.alias, default_id),
                None => default_id.to_string(),
            },
            ColumnSource::Constant(id) => id.to_string(),
            ColumnSource::Expression(expr) => format!("({})", expr),
        }
    }
}

/// A single migration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    /// Move the legacy table aside, dropping its explicit indexes so the
    /// canonical ones can be created under the same names.
    RenameTable {
        /// Live table name.
        from: String,
        /// Temporary name.
        to: String,
        /// Explicit indexes of the legacy table.
        drop_indexes: Vec<String>,
    },
    /// Create the canonical table from its definition.
    CreateTable {
        /// Canonical table name.
        table: String,
        /// The definition's DDL batch.
        ddl: String,
    },
    /// Copy rows into the canonical table.
    CopyRows(CopyRows),
    /// Drop the temporary table.
    DropTable {
        /// Temporary table name.
        table: String,
    },
}

impl MigrationStep {
    /// Step name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            MigrationStep::RenameTable { .. } => "rename_table",
            MigrationStep::CreateTable { .. } => "create_table",
            MigrationStep::CopyRows(_) => "copy_rows",
            MigrationStep::DropTable { .. } => "drop_table",
        }
    }

    /// Render the step as an SQL batch.
    pub fn to_sql(&self) -> String {
        match self {
            MigrationStep::RenameTable {
                from,
                to,
                drop_indexes,
            } => {
                let mut sql = String::new();
                for index in drop_indexes {
                    sql.push_str(&format!("DROP INDEX IF EXISTS {};\n", quote_ident(index)));
                }
                sql.push_str(&format!(
                    "ALTER TABLE {} RENAME TO {};",
                    quote_ident(from),
                    quote_ident(to)
                ));
                sql
            }
            MigrationStep::CreateTable { ddl, .. } => ddl.clone(),
            MigrationStep::CopyRows(copy) => format!("{};", copy.to_sql()),
            MigrationStep::DropTable { table } => format!("DROP TABLE {};", quote_ident(table)),
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStep::RenameTable { from, to, .. } => write!(f, "rename {} to {}", from, to),
            MigrationStep::CreateTable { table, .. } => write!(f, "create {}", table),
            MigrationStep::CopyRows(copy) => write!(f, "copy {} into {}", copy.from, copy.to),
            MigrationStep::DropTable { table } => write!(f, "drop {}", table),
        }
    }
}

/// Lookup whose unresolved rows are counted before the copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupCheck {
    /// Canonical column.
    pub column: String,
    /// Surrogate assigned to unresolved rows.
    pub default_id: i64,
    /// The join, or `None` when the legacy column is absent and every row
    /// is unresolved.
    pub join: Option<LookupJoin>,
}

impl LookupCheck {
    /// Count query against the live table.
    pub fn count_sql(&self, table: &str) -> String {
        match &self.join {
            Some(join) => join.unresolved_sql(table),
            None => format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        }
    }
}

/// The steps bringing one table to its canonical shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Canonical table name.
    pub table: String,
    /// Temporary name of the legacy table.
    pub temp_table: String,
    /// Required columns the live table lacks.
    pub missing_columns: Vec<String>,
    /// Lookups to report on.
    pub lookup_checks: Vec<LookupCheck>,
    /// Steps, in execution order.
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// Plan the migration of `spec` from its `live` columns to `target`.
    ///
    /// Returns an empty plan when no required column is missing.
    pub fn build(
        spec: &TableSpec,
        live: &ColumnSet,
        target: &ColumnSet,
        ddl: &str,
        legacy_indexes: &[String],
    ) -> Self {
        let table = spec.table.clone();
        let temp_table = format!("{}{}", table, TEMP_SUFFIX);
        let missing_columns = missing_from(live, target);

        if missing_columns.is_empty() {
            return Self {
                table,
                temp_table,
                missing_columns,
                lookup_checks: Vec::new(),
                steps: Vec::new(),
            };
        }

        let mut mapping = Vec::new();
        let mut joins = Vec::new();
        let mut defaults = Vec::new();
        let mut lookup_checks = Vec::new();

        for column in target {
            if let Some(existing) = live.iter().find(|c| c.eq_ignore_ascii_case(column)) {
                mapping.push(ColumnMapping {
                    column: column.clone(),
                    source: ColumnSource::Column(existing.clone()),
                });
            } else if let Some(lookup) = spec.lookup_for(column) {
                let legacy = live
                    .iter()
                    .find(|c| c.eq_ignore_ascii_case(&lookup.legacy_column));
                let (source, join) = match legacy {
                    Some(legacy) => {
                        let join = LookupJoin {
                            alias: format!("j{}", joins.len()),
                            legacy_column: legacy.clone(),
                            reference_table: lookup.reference_table.clone(),
                            natural_key: lookup.natural_key.clone(),
                            surrogate_key: lookup.surrogate_key.clone(),
                        };
                        joins.push(join.clone());
                        let source = ColumnSource::Lookup {
                            join: joins.len() - 1,
                            default_id: lookup.default_id,
                        };
                        (source, Some(join))
                    }
                    None => (ColumnSource::Constant(lookup.default_id), None),
                };
                mapping.push(ColumnMapping {
                    column: column.clone(),
                    source,
                });
                lookup_checks.push(LookupCheck {
                    column: column.clone(),
                    default_id: lookup.default_id,
                    join,
                });
            } else if let Some(default) = spec.default_for(column) {
                mapping.push(ColumnMapping {
                    column: column.clone(),
                    source: ColumnSource::Expression(default.expression.clone()),
                });
                defaults.push(default.clone());
            }
            // Anything else takes the canonical column's own DEFAULT.
        }

        let copy = CopyRows {
            from: temp_table.clone(),
            to: table.clone(),
            mapping,
            joins,
            defaults,
        };

        let steps = vec![
            MigrationStep::RenameTable {
                from: table.clone(),
                to: temp_table.clone(),
                drop_indexes: legacy_indexes.to_vec(),
            },
            MigrationStep::CreateTable {
                table: table.clone(),
                ddl: ddl.to_string(),
            },
            MigrationStep::CopyRows(copy),
            MigrationStep::DropTable {
                table: temp_table.clone(),
            },
        ];

        Self {
            table,
            temp_table,
            missing_columns,
            lookup_checks,
            steps,
        }
    }

    /// Check if the table is already in its canonical shape.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// The copy step, if any.
    pub fn copy(&self) -> Option<&CopyRows> {
        self.steps.iter().find_map(|step| match step {
            MigrationStep::CopyRows(copy) => Some(copy),
            _ => None,
        })
    }

    /// Legacy columns whose data the copy does not carry over.
    pub fn dropped_columns(&self, live: &ColumnSet) -> Vec<String> {
        let Some(copy) = self.copy() else {
            return Vec::new();
        };
        live.iter()
            .filter(|column| {
                let copied = copy.mapping.iter().any(|m| match &m.source {
                    ColumnSource::Column(c) => c.eq_ignore_ascii_case(column),
                    _ => false,
                });
                let joined = copy
                    .joins
                    .iter()
                    .any(|j| j.legacy_column.eq_ignore_ascii_case(column));
                !copied && !joined
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{LookupMapping, SchemaCatalog};

    fn columns(names: &[&str]) -> ColumnSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn vehicle_spec() -> TableSpec {
        SchemaCatalog::standard()
            .table_by_name("vehicle")
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("Vehicle"), "\"Vehicle\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_empty_plan_when_nothing_missing() {
        let live = columns(&["id", "plate"]);
        let target = columns(&["Id", "Plate"]);
        let plan = MigrationPlan::build(&vehicle_spec(), &live, &target, "", &[]);

        assert!(plan.is_empty());
        assert!(plan.missing_columns.is_empty());
        assert!(plan.copy().is_none());
    }

    #[test]
    fn test_plan_steps_in_order() {
        let live = columns(&["Id", "Plate", "OriginRegion"]);
        let target = columns(&["Id", "Plate", "OriginRegionId"]);
        let plan = MigrationPlan::build(
            &vehicle_spec(),
            &live,
            &target,
            "CREATE TABLE Vehicle (Id, Plate, OriginRegionId);",
            &["IX_Vehicle_Plate".to_string()],
        );

        let names: Vec<_> = plan.steps.iter().map(MigrationStep::name).collect();
        assert_eq!(names, vec!["rename_table", "create_table", "copy_rows", "drop_table"]);
        assert_eq!(plan.temp_table, "Vehicle_migrating");
        assert_eq!(plan.missing_columns, vec!["OriginRegionId"]);
        assert_eq!(
            plan.steps[0].to_sql(),
            "DROP INDEX IF EXISTS \"IX_Vehicle_Plate\";\nALTER TABLE \"Vehicle\" RENAME TO \"Vehicle_migrating\";"
        );
        assert_eq!(plan.steps[3].to_sql(), "DROP TABLE \"Vehicle_migrating\";");
    }

    #[test]
    fn test_copy_resolves_lookup_with_default() {
        let live = columns(&["Id", "Plate", "OriginRegion"]);
        let target = columns(&["Id", "Plate", "OriginRegionId"]);
        let plan = MigrationPlan::build(&vehicle_spec(), &live, &target, "", &[]);

        let sql = plan.copy().unwrap().to_sql();
        assert_eq!(
            sql,
            "INSERT INTO \"Vehicle\" (\"Id\", \"OriginRegionId\", \"Plate\") \
             SELECT src.\"Id\", COALESCE(j0.v, 1), src.\"Plate\" \
             FROM \"Vehicle_migrating\" AS src \
             LEFT JOIN (SELECT \"Code\" AS k, MIN(\"Id\") AS v FROM \"Region\" GROUP BY \"Code\") AS j0 \
             ON j0.k = src.\"OriginRegion\""
        );
        assert_eq!(plan.lookup_checks.len(), 1);
        assert!(plan.dropped_columns(&live).is_empty());
    }

    #[test]
    fn test_absent_legacy_column_gets_constant_default() {
        let spec = TableSpec::new("vehicle", "Vehicle").with_lookup(
            LookupMapping::new("CurrentRegionId", "CurrentRegion", "Region").with_default_id(9),
        );
        let live = columns(&["Id"]);
        let target = columns(&["Id", "CurrentRegionId"]);
        let plan = MigrationPlan::build(&spec, &live, &target, "", &[]);

        let copy = plan.copy().unwrap();
        assert!(copy.joins.is_empty());
        assert!(copy.to_sql().contains("SELECT 9, src.\"Id\""));
        assert_eq!(plan.lookup_checks[0].count_sql("Vehicle"), "SELECT COUNT(*) FROM \"Vehicle\"");
    }

    #[test]
    fn test_fill_expression_and_dropped_column() {
        let spec = TableSpec::new("maintenance", "Maintenance")
            .with_default(ColumnDefault::new("Kind", "'general'"));
        let live = columns(&["Id", "Notes"]);
        let target = columns(&["Id", "Kind", "Odometer"]);
        let plan = MigrationPlan::build(&spec, &live, &target, "", &[]);

        let copy = plan.copy().unwrap();
        assert_eq!(copy.defaults.len(), 1);
        assert_eq!(
            copy.to_sql(),
            "INSERT INTO \"Maintenance\" (\"Id\", \"Kind\") SELECT src.\"Id\", ('general') FROM \"Maintenance_migrating\" AS src"
        );
        assert_eq!(plan.dropped_columns(&live), vec!["Notes"]);
    }

    #[test]
    fn test_copy_without_shared_columns_keeps_rowids() {
        let spec = TableSpec::new("t", "T");
        let plan = MigrationPlan::build(&spec, &columns(&["a"]), &columns(&["b"]), "", &[]);
        assert_eq!(
            plan.copy().unwrap().to_sql(),
            "INSERT INTO \"T\" (rowid) SELECT src.rowid FROM \"T_migrating\" AS src"
        );
    }
}
