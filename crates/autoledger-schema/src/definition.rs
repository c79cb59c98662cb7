//! Canonical table definitions.
//!
//! Each managed table has exactly one DDL payload, looked up by logical
//! name. Payloads may start with a `-- version: N` header line.

use crate::error::BootstrapError;
use rust_embed::RustEmbed;
use std::collections::HashMap;

const VERSION_HEADER: &str = "-- version:";

/// A named, versioned DDL payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// Logical name, e.g. `vehicle`.
    pub logical_name: String,
    /// Definition version from the header line, 1 when absent.
    pub version: u32,
    /// The DDL batch.
    pub ddl: String,
}

impl Definition {
    /// Parse a definition payload.
    pub fn parse(logical_name: &str, payload: &str) -> Result<Self, BootstrapError> {
        if payload.trim().is_empty() {
            return Err(BootstrapError::InvalidDefinition {
                logical_name: logical_name.to_string(),
                reason: "empty payload".to_string(),
            });
        }

        let version = match payload.lines().next().map(str::trim) {
            Some(line) if line.starts_with(VERSION_HEADER) => {
                let raw = line[VERSION_HEADER.len()..].trim();
                raw.parse::<u32>()
                    .map_err(|_| BootstrapError::InvalidDefinition {
                        logical_name: logical_name.to_string(),
                        reason: format!("bad version header: {:?}", raw),
                    })?
            }
            _ => 1,
        };

        Ok(Self {
            logical_name: logical_name.to_string(),
            version,
            ddl: payload.to_string(),
        })
    }
}

/// Source of canonical definitions.
pub trait DefinitionSource: Send + Sync {
    /// Get the definition registered under `logical_name`.
    ///
    /// Fails if there is none.
    fn get_definition(&self, logical_name: &str) -> Result<Definition, BootstrapError>;
}

#[derive(RustEmbed)]
#[folder = "schema/"]
struct SchemaAssets;

/// Definitions compiled into the binary from `schema/*.sql`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedDefinitions;

impl EmbeddedDefinitions {
    /// Logical names of every embedded definition.
    pub fn logical_names() -> Vec<String> {
        let mut names: Vec<String> = SchemaAssets::iter()
            .filter_map(|path| path.strip_suffix(".sql").map(str::to_string))
            .collect();
        names.sort();
        names
    }
}

impl DefinitionSource for EmbeddedDefinitions {
    fn get_definition(&self, logical_name: &str) -> Result<Definition, BootstrapError> {
        let file = SchemaAssets::get(&format!("{}.sql", logical_name)).ok_or_else(|| {
            BootstrapError::MissingDefinition {
                logical_name: logical_name.to_string(),
            }
        })?;

        let payload =
            std::str::from_utf8(&file.data).map_err(|e| BootstrapError::InvalidDefinition {
                logical_name: logical_name.to_string(),
                reason: e.to_string(),
            })?;

        Definition::parse(logical_name, payload)
    }
}

/// In-memory definitions.
#[derive(Debug, Default, Clone)]
pub struct StaticDefinitions {
    payloads: HashMap<String, String>,
}

impl StaticDefinitions {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload under a logical name.
    pub fn with(mut self, logical_name: impl Into<String>, payload: impl Into<String>) -> Self {
        self.payloads.insert(logical_name.into(), payload.into());
        self
    }
}

impl DefinitionSource for StaticDefinitions {
    fn get_definition(&self, logical_name: &str) -> Result<Definition, BootstrapError> {
        let payload =
            self.payloads
                .get(logical_name)
                .ok_or_else(|| BootstrapError::MissingDefinition {
                    logical_name: logical_name.to_string(),
                })?;

        Definition::parse(logical_name, payload)
    }
}

impl<T: DefinitionSource + ?Sized> DefinitionSource for &T {
    fn get_definition(&self, logical_name: &str) -> Result<Definition, BootstrapError> {
        (**self).get_definition(logical_name)
    }
}
