//! Schema catalog.
//!
//! The catalog names every table the migrator manages, and for each one the
//! column substitutions a structural migration applies when copying rows.

/// Translate a legacy natural-key column into a surrogate-key column.
///
/// During a copy, the legacy value is looked up in `reference_table` by
/// `natural_key` and replaced by its `surrogate_key`. Unmatched values, and
/// legacy tables without the column at all, get `default_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupMapping {
    /// Canonical column receiving the surrogate key.
    pub column: String,
    /// Legacy column holding the natural key.
    pub legacy_column: String,
    /// The reference (auxiliary) table.
    pub reference_table: String,
    /// Natural-key column of the reference table.
    pub natural_key: String,
    /// Surrogate-key column of the reference table.
    pub surrogate_key: String,
    /// Surrogate assigned to unmatched rows.
    pub default_id: i64,
}

impl LookupMapping {
    /// Look up `legacy_column` in `reference_table` by `Code`, writing `Id`.
    pub fn new(
        column: impl Into<String>,
        legacy_column: impl Into<String>,
        reference_table: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            legacy_column: legacy_column.into(),
            reference_table: reference_table.into(),
            natural_key: "Code".to_string(),
            surrogate_key: "Id".to_string(),
            default_id: 1,
        }
    }

    /// Set the natural-key column.
    pub fn with_natural_key(mut self, natural_key: impl Into<String>) -> Self {
        self.natural_key = natural_key.into();
        self
    }

    /// Set the surrogate-key column.
    pub fn with_surrogate_key(mut self, surrogate_key: impl Into<String>) -> Self {
        self.surrogate_key = surrogate_key.into();
        self
    }

    /// Set the default surrogate.
    pub fn with_default_id(mut self, default_id: i64) -> Self {
        self.default_id = default_id;
        self
    }
}

/// Fill a new column with an SQL expression when the legacy table lacks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefault {
    /// Canonical column.
    pub column: String,
    /// SQL expression, e.g. `'general'`.
    pub expression: String,
}

impl ColumnDefault {
    /// Create a column default.
    pub fn new(column: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            expression: expression.into(),
        }
    }
}

/// A managed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Logical name of the canonical definition.
    pub logical_name: String,
    /// Physical table name.
    pub table: String,
    /// Foreign-key translations.
    pub lookups: Vec<LookupMapping>,
    /// Fill expressions for new columns.
    pub defaults: Vec<ColumnDefault>,
}

impl TableSpec {
    /// Create a table spec without substitutions.
    pub fn new(logical_name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            table: table.into(),
            lookups: Vec::new(),
            defaults: Vec::new(),
        }
    }

    /// Add a foreign-key translation.
    pub fn with_lookup(mut self, lookup: LookupMapping) -> Self {
        self.lookups.push(lookup);
        self
    }

    /// Add a fill expression.
    pub fn with_default(mut self, default: ColumnDefault) -> Self {
        self.defaults.push(default);
        self
    }

    /// The lookup writing `column`, if any.
    pub fn lookup_for(&self, column: &str) -> Option<&LookupMapping> {
        self.lookups
            .iter()
            .find(|l| l.column.eq_ignore_ascii_case(column))
    }

    /// The fill expression for `column`, if any.
    pub fn default_for(&self, column: &str) -> Option<&ColumnDefault> {
        self.defaults
            .iter()
            .find(|d| d.column.eq_ignore_ascii_case(column))
    }
}

/// A reference table created only when absent. Never structurally migrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxiliarySpec {
    /// Logical name of the canonical definition.
    pub logical_name: String,
    /// Physical table name.
    pub table: String,
}

impl AuxiliarySpec {
    /// Create an auxiliary spec.
    pub fn new(logical_name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            table: table.into(),
        }
    }
}

/// Every table the migrator knows about.
///
/// Auxiliary tables are ensured before managed ones, in declaration order,
/// so lookups always find their reference table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCatalog {
    auxiliary: Vec<AuxiliarySpec>,
    managed: Vec<TableSpec>,
}

impl SchemaCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The fleet catalog: regions, vehicles and their maintenance log.
    pub fn standard() -> Self {
        Self::new()
            .with_auxiliary(AuxiliarySpec::new("region", "Region"))
            .with_table(
                TableSpec::new("vehicle", "Vehicle")
                    .with_lookup(LookupMapping::new("OriginRegionId", "OriginRegion", "Region"))
                    .with_lookup(LookupMapping::new(
                        "CurrentRegionId",
                        "CurrentRegion",
                        "Region",
                    )),
            )
            .with_table(
                TableSpec::new("maintenance", "Maintenance")
                    .with_default(ColumnDefault::new("Kind", "'general'")),
            )
    }

    /// Add an auxiliary table.
    pub fn with_auxiliary(mut self, spec: AuxiliarySpec) -> Self {
        self.auxiliary.push(spec);
        self
    }

    /// Add a managed table.
    pub fn with_table(mut self, spec: TableSpec) -> Self {
        self.managed.push(spec);
        self
    }

    /// Auxiliary tables, in order.
    pub fn auxiliary(&self) -> &[AuxiliarySpec] {
        &self.auxiliary
    }

    /// Managed tables, in order.
    pub fn managed(&self) -> &[TableSpec] {
        &self.managed
    }

    /// Find an auxiliary table by logical name.
    pub fn auxiliary_by_name(&self, logical_name: &str) -> Option<&AuxiliarySpec> {
        self.auxiliary.iter().find(|a| a.logical_name == logical_name)
    }

    /// Find a managed table by logical name.
    pub fn table_by_name(&self, logical_name: &str) -> Option<&TableSpec> {
        self.managed.iter().find(|t| t.logical_name == logical_name)
    }

    /// Physical names of every table, auxiliary first.
    pub fn table_names(&self) -> Vec<&str> {
        self.auxiliary
            .iter()
            .map(|a| a.table.as_str())
            .chain(self.managed.iter().map(|t| t.table.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog() {
        let catalog = SchemaCatalog::standard();
        assert_eq!(catalog.table_names(), vec!["Region", "Vehicle", "Maintenance"]);

        let vehicle = catalog.table_by_name("vehicle").unwrap();
        let origin = vehicle.lookup_for("originregionid").unwrap();
        assert_eq!(origin.legacy_column, "OriginRegion");
        assert_eq!(origin.reference_table, "Region");
        assert_eq!(origin.natural_key, "Code");
        assert_eq!(origin.surrogate_key, "Id");
        assert_eq!(origin.default_id, 1);

        let maintenance = catalog.table_by_name("maintenance").unwrap();
        assert_eq!(maintenance.default_for("Kind").unwrap().expression, "'general'");
        assert!(catalog.auxiliary_by_name("region").is_some());
        assert!(catalog.table_by_name("region").is_none());
    }

    #[test]
    fn test_lookup_builders() {
        let lookup = LookupMapping::new("OwnerId", "Owner", "Person")
            .with_natural_key("Document")
            .with_surrogate_key("PersonId")
            .with_default_id(0);
        assert_eq!(lookup.natural_key, "Document");
        assert_eq!(lookup.surrogate_key, "PersonId");
        assert_eq!(lookup.default_id, 0);
    }
}
