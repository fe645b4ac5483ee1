//! Per-script resolution state.
//!
//! A T-SQL script has one flat table namespace: tables, aliases, temp tables,
//! and variables stay visible for the rest of the script once introduced.
//! Metadata is different: it is scoped, snapshotted on every scope push and
//! restored on pop, so cross-handler flags (`ProcessingInsertSelect`,
//! `currentSelectInto`, `inApply`, ...) compose under nesting and are released
//! on every exit path.

use crate::graph::{ColumnFlags, LineageGraph, NodeId, TableKind};
use std::collections::HashMap;

/// Scoped metadata keys used by the handlers.
pub(crate) mod meta {
    pub const PROCESSING_INSERT_SELECT: &str = "ProcessingInsertSelect";
    pub const INSERT_TARGET_TABLE: &str = "InsertTargetTable";
    pub const INSERT_TARGET_COLUMNS: &str = "InsertTargetColumns";
    pub const SELECT_INTO: &str = "currentSelectInto";
    pub const RESULT_OWNER: &str = "resultOwner";
    pub const IN_APPLY: &str = "inApply";
    pub const APPLY_KIND: &str = "applyKind";
    pub const APPLY_LEFT_TABLES: &str = "applyLeftTables";
    pub const FROM_TABLES: &str = "fromTables";
}

/// Key under which the current target column is threaded to nested
/// expression handlers.
pub(crate) const CURRENT_TARGET_COLUMN: &str = "CurrentTargetColumn";

/// A scoped metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Bool(bool),
    Text(String),
    Node(NodeId),
    Columns(Vec<NodeId>),
    Names(Vec<String>),
}

#[derive(Debug, Clone)]
struct TableBinding {
    id: NodeId,
    /// Name as written in the script, for display.
    display: String,
}

/// Resolution context for one script.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    tables: HashMap<String, TableBinding>,
    aliases: HashMap<String, String>,
    temp_tables: HashMap<String, NodeId>,
    table_variables: HashMap<String, NodeId>,
    /// Scalar variables and procedure parameters, keyed by `@name`.
    variables: HashMap<String, NodeId>,
    /// Procedures declared in this script: name -> parameter columns in
    /// declaration order.
    procedures: HashMap<String, Vec<NodeId>>,
    column_context: HashMap<String, NodeId>,
    metadata: HashMap<String, MetaValue>,
    saved_frames: Vec<HashMap<String, MetaValue>>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the table node if absent and registers it in the visible
    /// namespace. Temp tables and table variables are mirrored into their
    /// sub-maps as well.
    pub fn get_or_create_table(
        &mut self,
        graph: &LineageGraph,
        name: &str,
        kind: TableKind,
    ) -> NodeId {
        let key = name.to_lowercase();
        if let Some(binding) = self.tables.get(&key) {
            return binding.id;
        }
        let id = graph.add_table_node(name, kind, None, None);
        self.register_table(name, id, kind);
        id
    }

    /// Registers an existing table node in the visible namespace.
    pub fn register_table(&mut self, name: &str, id: NodeId, kind: TableKind) {
        let key = name.to_lowercase();
        self.tables.insert(
            key.clone(),
            TableBinding {
                id,
                display: name.to_string(),
            },
        );
        match kind {
            TableKind::TempTable => {
                self.temp_tables.insert(key, id);
            }
            TableKind::TableVariable => {
                self.table_variables.insert(key, id);
            }
            _ => {}
        }
    }

    /// Creates the column node if absent and attaches it to its table.
    pub fn get_or_create_column(
        &mut self,
        graph: &LineageGraph,
        table: &str,
        name: &str,
        data_type: &str,
    ) -> NodeId {
        let column = graph.add_column_node(table, name, data_type, ColumnFlags::default());
        if let Some(table_id) = self.resolve_table(table).or_else(|| graph.get_table(table)) {
            let _ = graph.attach_column_to_table(table_id, column);
        }
        column
    }

    /// Resolves a table name or alias. Lookup order: direct tables, temp
    /// tables, table variables, then the alias map. Case-insensitive.
    pub fn resolve_table(&self, name_or_alias: &str) -> Option<NodeId> {
        let key = name_or_alias.to_lowercase();
        if let Some(binding) = self.tables.get(&key) {
            return Some(binding.id);
        }
        if let Some(&id) = self.temp_tables.get(&key) {
            return Some(id);
        }
        if let Some(&id) = self.table_variables.get(&key) {
            return Some(id);
        }
        if let Some(table_name) = self.aliases.get(&key) {
            return self
                .tables
                .get(&table_name.to_lowercase())
                .map(|binding| binding.id);
        }
        None
    }

    /// Resolves a name or alias to the table's display name.
    pub fn resolve_table_name(&self, name_or_alias: &str) -> Option<String> {
        let key = name_or_alias.to_lowercase();
        if let Some(binding) = self.tables.get(&key) {
            return Some(binding.display.clone());
        }
        if let Some(table_name) = self.aliases.get(&key) {
            return Some(
                self.tables
                    .get(&table_name.to_lowercase())
                    .map(|binding| binding.display.clone())
                    .unwrap_or_else(|| table_name.clone()),
            );
        }
        None
    }

    pub fn register_alias(&mut self, alias: &str, table_name: &str) {
        self.aliases
            .insert(alias.to_lowercase(), table_name.to_string());
    }

    /// Display names of every table currently visible.
    pub fn visible_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .values()
            .map(|binding| binding.display.clone())
            .collect();
        names.sort();
        names
    }

    pub fn is_temp_table(&self, name: &str) -> bool {
        self.temp_tables.contains_key(&name.to_lowercase())
    }

    // --- variables ---

    pub fn register_variable(&mut self, name: &str, id: NodeId) {
        self.variables.insert(name.to_lowercase(), id);
    }

    pub fn resolve_variable(&self, name: &str) -> Option<NodeId> {
        self.variables.get(&name.to_lowercase()).copied()
    }

    pub fn register_procedure(&mut self, name: &str, params: Vec<NodeId>) {
        self.procedures.insert(name.to_lowercase(), params);
    }

    pub fn resolve_procedure(&self, name: &str) -> Option<&[NodeId]> {
        self.procedures.get(&name.to_lowercase()).map(Vec::as_slice)
    }

    // --- column context ---

    /// Threads a target column to nested expression handlers. Returns the
    /// previous binding so the caller can restore it.
    pub fn set_column_context(&mut self, key: &str, column: NodeId) -> Option<NodeId> {
        self.column_context.insert(key.to_string(), column)
    }

    pub fn get_column_context(&self, key: &str) -> Option<NodeId> {
        self.column_context.get(key).copied()
    }

    /// Removes a column-context binding, or restores a saved one.
    pub fn restore_column_context(&mut self, key: &str, previous: Option<NodeId>) {
        match previous {
            Some(column) => {
                self.column_context.insert(key.to_string(), column);
            }
            None => {
                self.column_context.remove(key);
            }
        }
    }

    // --- scoped metadata ---

    /// Pushes a metadata frame. Returns the depth token to pass to
    /// [`Self::restore_to`].
    pub fn push_scope(&mut self) -> usize {
        self.saved_frames.push(self.metadata.clone());
        self.saved_frames.len()
    }

    pub fn pop_scope(&mut self) {
        if let Some(frame) = self.saved_frames.pop() {
            self.metadata = frame;
        }
    }

    /// Restores the metadata to the state at `depth`, popping any frames a
    /// failed handler left behind. Balanced on every exit path.
    pub fn restore_to(&mut self, depth: usize) {
        while self.saved_frames.len() >= depth {
            self.pop_scope();
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.saved_frames.len()
    }

    pub fn set_meta(&mut self, key: &str, value: MetaValue) {
        self.metadata.insert(key.to_string(), value);
    }

    pub fn clear_meta(&mut self, key: &str) {
        self.metadata.remove(key);
    }

    pub fn get_meta(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key)
    }

    pub fn meta_flag(&self, key: &str) -> bool {
        matches!(self.metadata.get(key), Some(MetaValue::Bool(true)))
    }

    pub fn meta_text(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key) {
            Some(MetaValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn meta_columns(&self, key: &str) -> Option<&[NodeId]> {
        match self.metadata.get(key) {
            Some(MetaValue::Columns(columns)) => Some(columns),
            _ => None,
        }
    }
}
