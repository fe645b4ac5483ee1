//! Read-only schema metadata for resolving wildcard and implicit column
//! lists.
//!
//! When no provider is available the analyzer still works; it simply
//! pre-creates fewer column nodes and leans harder on placeholders.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A column known to the metadata provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
        }
    }

    pub fn typed(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: Some(data_type.into()),
        }
    }
}

/// Supplies known table columns to the analyzer.
pub trait MetadataProvider: Send + Sync {
    /// The columns of `table`, if the table is known.
    fn table_columns(&self, table: &str) -> Option<Vec<ColumnSpec>>;

    /// Whether `table` is known at all.
    fn table_exists(&self, table: &str) -> bool {
        self.table_columns(table).is_some()
    }
}

/// A provider that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetadata;

impl MetadataProvider for NullMetadata {
    fn table_columns(&self, _table: &str) -> Option<Vec<ColumnSpec>> {
        None
    }

    fn table_exists(&self, _table: &str) -> bool {
        false
    }
}

/// A table definition for [`StaticMetadata`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

/// An in-memory provider built from a list of table definitions
/// (case-insensitive on table names).
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    tables: HashMap<String, Vec<ColumnSpec>>,
}

impl StaticMetadata {
    pub fn new(tables: impl IntoIterator<Item = TableSchema>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|table| (table.name.to_lowercase(), table.columns))
                .collect(),
        }
    }

    pub fn add_table(&mut self, name: &str, columns: Vec<ColumnSpec>) {
        self.tables.insert(name.to_lowercase(), columns);
    }
}

impl MetadataProvider for StaticMetadata {
    fn table_columns(&self, table: &str) -> Option<Vec<ColumnSpec>> {
        self.tables.get(&table.to_lowercase()).cloned()
    }

    fn table_exists(&self, table: &str) -> bool {
        self.tables.contains_key(&table.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_metadata_is_case_insensitive() {
        let mut provider = StaticMetadata::default();
        provider.add_table("Orders", vec![ColumnSpec::typed("Id", "int")]);
        assert!(provider.table_exists("orders"));
        assert_eq!(provider.table_columns("ORDERS").unwrap().len(), 1);
        assert!(!provider.table_exists("customers"));
    }

    #[test]
    fn null_metadata_knows_nothing() {
        assert!(!NullMetadata.table_exists("anything"));
        assert!(NullMetadata.table_columns("anything").is_none());
    }
}
