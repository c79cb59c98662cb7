//! Output formatters.

use autoledger::{PlacardInfo, SchemaDescriptor, SchemaReport, TableOutcome};
use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Formats command output.
pub trait Formatter: Send + Sync {
    /// Format the startup schema report.
    fn format_report(&self, report: &SchemaReport) -> String;

    /// Format the live schema.
    fn format_schema(&self, schema: &SchemaDescriptor) -> String;

    /// Format a placard lookup.
    fn format_placard(&self, info: &PlacardInfo) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_report(&self, report: &SchemaReport) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Table", "Version", "Outcome", "Details"]);

        for entry in &report.tables {
            let (outcome, details) = describe_outcome(&entry.outcome);
            table.add_row(vec![
                Cell::new(&entry.table),
                Cell::new(entry.version),
                Cell::new(outcome),
                Cell::new(details),
            ]);
        }

        format!("{}\n{} of {} table(s) changed", table, report.changed(), report.tables.len())
    }

    fn format_schema(&self, schema: &SchemaDescriptor) -> String {
        if schema.is_empty() {
            return "No tables".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["Table", "Columns"]);
        for name in schema.tables() {
            let columns = schema
                .columns(name)
                .map(|c| c.iter().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            table.add_row(vec![name.to_string(), columns]);
        }
        table.to_string()
    }

    fn format_placard(&self, info: &PlacardInfo) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Plate", "Model", "Year", "Region"]);
        table.add_row(vec![
            info.plate.clone(),
            info.model.clone(),
            info.model_year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string()),
            info.region_code.clone(),
        ]);
        table.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

fn describe_outcome(outcome: &TableOutcome) -> (&'static str, String) {
    match outcome {
        TableOutcome::Unchanged => ("unchanged", String::new()),
        TableOutcome::Created => ("created", String::new()),
        TableOutcome::Migrated {
            added_columns,
            rows_copied,
            unresolved,
        } => {
            let mut details = format!(
                "added {}; {} row(s) copied",
                added_columns.join(", "),
                rows_copied
            );
            for lookup in unresolved {
                details.push_str(&format!(
                    "; {} unresolved {} -> {}",
                    lookup.rows, lookup.column, lookup.default_id
                ));
            }
            ("migrated", details)
        }
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl JsonFormatter {
    fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_report(&self, report: &SchemaReport) -> String {
        Self::to_json(report)
    }

    fn format_schema(&self, schema: &SchemaDescriptor) -> String {
        Self::to_json(schema)
    }

    fn format_placard(&self, info: &PlacardInfo) -> String {
        Self::to_json(info)
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({
            "error": error
        })
        .to_string()
    }
}
