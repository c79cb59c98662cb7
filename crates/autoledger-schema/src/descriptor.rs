//! Schema introspection.
//!
//! A [`SchemaDescriptor`] is the set of columns each table currently has.
//! It is derived from the storage engine's own catalog and never persisted.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// The columns of a single table.
pub type ColumnSet = BTreeSet<String>;

/// Table name to column set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDescriptor {
    tables: BTreeMap<String, ColumnSet>,
}

impl SchemaDescriptor {
    /// Create an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Introspect the given tables. Absent tables are left out.
    pub fn introspect(conn: &Connection, tables: &[&str]) -> rusqlite::Result<Self> {
        let mut descriptor = Self::new();
        for table in tables {
            if let Some(columns) = Self::introspect_table(conn, table)? {
                descriptor.insert(*table, columns);
            }
        }
        Ok(descriptor)
    }

    /// Columns of one table, or `None` if the table does not exist.
    pub fn introspect_table(conn: &Connection, table: &str) -> rusqlite::Result<Option<ColumnSet>> {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<ColumnSet>>()?;

        Ok(if columns.is_empty() { None } else { Some(columns) })
    }

    /// Introspect every user table in the connection.
    pub fn introspect_all(conn: &Connection) -> rusqlite::Result<Self> {
        let names = user_tables(conn)?;
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        Self::introspect(conn, &refs)
    }

    /// The shape a DDL batch produces.
    ///
    /// The batch is materialized in a private in-memory database, so the
    /// live storage is never touched.
    pub fn of_definition(ddl: &str) -> rusqlite::Result<Self> {
        let scratch = Connection::open_in_memory()?;
        scratch.execute_batch(ddl)?;
        Self::introspect_all(&scratch)
    }

    /// Add or replace a table.
    pub fn insert(&mut self, table: impl Into<String>, columns: ColumnSet) {
        self.tables.insert(table.into(), columns);
    }

    /// Check if the table is present (case-insensitive).
    pub fn table_exists(&self, table: &str) -> bool {
        self.columns(table).is_some()
    }

    /// Columns of a table (case-insensitive lookup).
    pub fn columns(&self, table: &str) -> Option<&ColumnSet> {
        self.tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
            .map(|(_, columns)| columns)
    }

    /// Table names, sorted.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check if no table is present.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Columns `target` requires for `table` that this descriptor lacks.
    pub fn missing_columns(&self, table: &str, target: &SchemaDescriptor) -> Vec<String> {
        let Some(required) = target.columns(table) else {
            return Vec::new();
        };
        match self.columns(table) {
            Some(live) => missing_from(live, required),
            None => required.iter().cloned().collect(),
        }
    }
}

/// Columns of `required` absent from `live`, compared the way the storage
/// engine compares identifiers.
pub fn missing_from(live: &ColumnSet, required: &ColumnSet) -> Vec<String> {
    required
        .iter()
        .filter(|column| !contains_column(live, column))
        .cloned()
        .collect()
}

/// Case-insensitive column membership.
pub fn contains_column(columns: &ColumnSet, column: &str) -> bool {
    columns.iter().any(|c| c.eq_ignore_ascii_case(column))
}

/// Names of user tables, excluding the engine's internal ones.
pub fn user_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Names of explicitly created indexes on a table.
pub fn explicit_indexes(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL ORDER BY name",
    )?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> ColumnSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_introspect_absent_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(SchemaDescriptor::introspect_table(&conn, "Vehicle").unwrap(), None);
    }

    #[test]
    fn test_introspect_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE Vehicle (Id INTEGER PRIMARY KEY, Plate TEXT);")
            .unwrap();

        let descriptor = SchemaDescriptor::introspect(&conn, &["Vehicle", "Region"]).unwrap();
        assert_eq!(descriptor.len(), 1);
        assert_eq!(descriptor.columns("vehicle"), Some(&columns(&["Id", "Plate"])));
        assert!(!descriptor.table_exists("Region"));
    }

    #[test]
    fn test_of_definition() {
        let descriptor = SchemaDescriptor::of_definition(
            "CREATE TABLE A (x, y); CREATE TABLE B (z); CREATE INDEX IX_A ON A(x);",
        )
        .unwrap();
        assert_eq!(descriptor.tables().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_of_definition_rejects_bad_ddl() {
        assert!(SchemaDescriptor::of_definition("CREATE TABLE (").is_err());
    }

    #[test]
    fn test_missing_columns_case_insensitive() {
        let mut live = SchemaDescriptor::new();
        live.insert("Vehicle", columns(&["id", "PLATE", "OriginRegion"]));
        let mut target = SchemaDescriptor::new();
        target.insert("Vehicle", columns(&["Id", "Plate", "OriginRegionId"]));

        assert_eq!(live.missing_columns("Vehicle", &target), vec!["OriginRegionId"]);
        assert!(target.missing_columns("Vehicle", &target).is_empty());
        assert!(live.missing_columns("Unknown", &target).is_empty());
    }

    #[test]
    fn test_explicit_indexes_skip_autoindexes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE V (Id INTEGER PRIMARY KEY, Plate TEXT UNIQUE, Model TEXT);
             CREATE INDEX IX_V_Model ON V(Model);",
        )
        .unwrap();

        assert_eq!(explicit_indexes(&conn, "V").unwrap(), vec!["IX_V_Model"]);
    }
}
