//! The lineage graph store.
//!
//! Storage is partitioned: nodes and edges live in dense per-partition vectors
//! behind reader-writer locks, with hash indexes layered on top. The
//! partition for a node operation is chosen by hashing the owning table name,
//! so a table and all of its columns are guarded by one lock; the partition
//! for an edge operation hashes `source XOR target`. A mutation never holds
//! two partition locks at once, so the lock graph is acyclic and writers to
//! the same key serialize through the key's partition.
//!
//! Nodes and edges are only ever removed by [`LineageGraph::compact`], which
//! takes `&mut self` and therefore excludes all concurrent access.

use super::node::{
    ColumnFlags, Edge, EdgeId, EdgeType, ExpressionKind, Node, NodeData, NodeId, NodeKind,
    TableKind, PARTITIONS,
};
use crate::error::StoreError;
use crate::intern::StringPool;
use crate::types::AnalyzeOptions;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

fn partition_for_name(name_lower: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    name_lower.hash(&mut hasher);
    (hasher.finish() as usize) & (PARTITIONS - 1)
}

fn partition_for_edge(source: NodeId, target: NodeId) -> usize {
    let mut hasher = DefaultHasher::new();
    (source.0 ^ target.0).hash(&mut hasher);
    (hasher.finish() as usize) & (PARTITIONS - 1)
}

#[derive(Default)]
struct NodePartition {
    nodes: Vec<Node>,
    live: Vec<bool>,
    /// (table lowercase, column lowercase) -> local index
    columns_by_key: HashMap<(String, String), u32>,
    /// table lowercase -> local index
    tables_by_name: HashMap<String, u32>,
    by_kind: HashMap<NodeKind, Vec<u32>>,
    out_edges: HashMap<u32, Vec<EdgeId>>,
    in_edges: HashMap<u32, Vec<EdgeId>>,
}

impl NodePartition {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            live: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    fn push(&mut self, partition: usize, mut node: Node) -> NodeId {
        let index = self.nodes.len();
        let id = NodeId::pack(partition, index);
        node.id = id;
        self.by_kind.entry(node.kind).or_default().push(index as u32);
        self.nodes.push(node);
        self.live.push(true);
        id
    }

    fn get(&self, index: usize) -> Option<&Node> {
        if *self.live.get(index)? {
            self.nodes.get(index)
        } else {
            None
        }
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut Node> {
        if *self.live.get(index)? {
            self.nodes.get_mut(index)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct EdgePartition {
    edges: Vec<Edge>,
    live: Vec<bool>,
    by_key: HashMap<(NodeId, NodeId, EdgeType), u32>,
}

impl EdgePartition {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            edges: Vec::with_capacity(capacity),
            live: Vec::with_capacity(capacity),
            by_key: HashMap::new(),
        }
    }
}

/// A directed multigraph of tables, columns, and expressions.
///
/// All mutation methods take `&self`; the graph is internally synchronized
/// and safe to share across the batch driver's workers in merge mode.
pub struct LineageGraph {
    pool: StringPool,
    nodes: Box<[RwLock<NodePartition>]>,
    edges: Box<[RwLock<EdgePartition>]>,
    source_sql: String,
    created_at: DateTime<Utc>,
    metadata: Mutex<HashMap<String, serde_json::Value>>,
}

impl LineageGraph {
    pub fn new(source_sql: impl Into<String>) -> Self {
        Self::with_options(source_sql, &AnalyzeOptions::default())
    }

    pub fn with_options(source_sql: impl Into<String>, options: &AnalyzeOptions) -> Self {
        let node_capacity = (options.initial_node_capacity / PARTITIONS).max(1);
        let edge_capacity = (options.initial_edge_capacity / PARTITIONS).max(1);
        let nodes: Vec<_> = (0..PARTITIONS)
            .map(|_| RwLock::new(NodePartition::with_capacity(node_capacity)))
            .collect();
        let edges: Vec<_> = (0..PARTITIONS)
            .map(|_| RwLock::new(EdgePartition::with_capacity(edge_capacity)))
            .collect();
        Self {
            pool: StringPool::new(),
            nodes: nodes.into_boxed_slice(),
            edges: edges.into_boxed_slice(),
            source_sql: source_sql.into(),
            created_at: Utc::now(),
            metadata: Mutex::new(HashMap::new()),
        }
    }

    pub fn source_sql(&self) -> &str {
        &self.source_sql
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.lock().insert(key.into(), value);
    }

    /// Interns a string in this graph's pool.
    pub fn intern(&self, s: &str) -> Arc<str> {
        self.pool.intern(s)
    }

    /// Creates a column node, or returns the existing one for the same
    /// `(table, name)` pair (case-insensitive).
    pub fn add_column_node(
        &self,
        table: &str,
        name: &str,
        data_type: &str,
        flags: ColumnFlags,
    ) -> NodeId {
        let table_lower = table.to_lowercase();
        let name_lower = name.to_lowercase();
        let partition = partition_for_name(&table_lower);
        let mut shard = self.nodes[partition].write();

        if let Some(&index) = shard.columns_by_key.get(&(table_lower.clone(), name_lower.clone())) {
            let id = NodeId::pack(partition, index as usize);
            // Upgrade a placeholder's type once the real one is known.
            if data_type != "unknown" {
                let data_type = self.pool.intern(data_type);
                if let Some(node) = shard.get_mut(index as usize) {
                    if let NodeData::Column {
                        data_type: existing,
                        ..
                    } = &mut node.data
                    {
                        if existing.as_ref() == "unknown" {
                            *existing = data_type;
                        }
                    }
                }
            }
            return id;
        }

        let node = Node {
            id: NodeId::pack(partition, 0), // patched by push
            kind: NodeKind::Column,
            name: self.pool.intern(name),
            object_name: self.pool.intern(name),
            schema_name: self.pool.intern(""),
            database_name: self.pool.intern(""),
            metadata: HashMap::new(),
            data: NodeData::Column {
                data_type: self.pool.intern(data_type),
                table_owner: self.pool.intern(table),
                is_nullable: flags.nullable,
                is_computed: flags.computed,
            },
        };
        let id = shard.push(partition, node);
        shard
            .columns_by_key
            .insert((table_lower, name_lower), id.index() as u32);
        id
    }

    /// Creates a table node, or returns the existing one for the same name
    /// (case-insensitive). The first-seen kind is preserved; alias and
    /// definition are filled in if they were previously absent.
    pub fn add_table_node(
        &self,
        name: &str,
        kind: TableKind,
        alias: Option<&str>,
        definition: Option<&str>,
    ) -> NodeId {
        let name_lower = name.to_lowercase();
        let partition = partition_for_name(&name_lower);
        let mut shard = self.nodes[partition].write();

        if let Some(&index) = shard.tables_by_name.get(&name_lower) {
            let id = NodeId::pack(partition, index as usize);
            let alias = alias.map(|a| self.pool.intern(a));
            let definition = definition.map(|d| self.pool.intern(d));
            if let Some(node) = shard.get_mut(index as usize) {
                if let NodeData::Table {
                    alias: existing_alias,
                    definition: existing_definition,
                    ..
                } = &mut node.data
                {
                    if existing_alias.is_none() {
                        *existing_alias = alias;
                    }
                    if existing_definition.is_none() {
                        *existing_definition = definition;
                    }
                }
            }
            return id;
        }

        let (database, schema, object) = split_qualified(name);
        let node = Node {
            id: NodeId::pack(partition, 0),
            kind: NodeKind::Table,
            name: self.pool.intern(object),
            object_name: self.pool.intern(name),
            schema_name: self.pool.intern(schema.unwrap_or("")),
            database_name: self.pool.intern(database.unwrap_or("")),
            metadata: HashMap::new(),
            data: NodeData::Table {
                table_type: kind,
                columns: Vec::new(),
                alias: alias.map(|a| self.pool.intern(a)),
                definition: definition.map(|d| self.pool.intern(d)),
            },
        };
        let id = shard.push(partition, node);
        shard.tables_by_name.insert(name_lower, id.index() as u32);
        id
    }

    /// Explicitly overwrites a table node's kind.
    pub fn set_table_kind(&self, id: NodeId, kind: TableKind) -> Result<(), StoreError> {
        let mut shard = self.nodes[id.partition()].write();
        let node = shard.get_mut(id.index()).ok_or(StoreError::NotFound)?;
        match &mut node.data {
            NodeData::Table { table_type, .. } => {
                *table_type = kind;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    /// Creates an expression node. Expressions are intentionally unique per
    /// occurrence and never deduplicated.
    pub fn add_expression_node(
        &self,
        name: &str,
        sql_text: &str,
        kind: ExpressionKind,
        result_type: Option<&str>,
        owner: Option<&str>,
    ) -> NodeId {
        let key = owner.unwrap_or(name).to_lowercase();
        let partition = partition_for_name(&key);
        let mut shard = self.nodes[partition].write();
        let node = Node {
            id: NodeId::pack(partition, 0),
            kind: NodeKind::Expression,
            name: self.pool.intern(name),
            object_name: self.pool.intern(name),
            schema_name: self.pool.intern(""),
            database_name: self.pool.intern(""),
            metadata: HashMap::new(),
            data: NodeData::Expression {
                expression_type: kind,
                expression: self.pool.intern(sql_text),
                result_type: self.pool.intern(result_type.unwrap_or("unknown")),
                table_owner: self.pool.intern(owner.unwrap_or("")),
            },
        };
        shard.push(partition, node)
    }

    /// Merges entries into a node's free-form metadata map.
    pub fn set_node_metadata(
        &self,
        id: NodeId,
        entries: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Result<(), StoreError> {
        let mut shard = self.nodes[id.partition()].write();
        let node = shard.get_mut(id.index()).ok_or(StoreError::NotFound)?;
        node.metadata.extend(entries);
        Ok(())
    }

    /// Appends `column` to the table's column list if not already present.
    pub fn attach_column_to_table(&self, table: NodeId, column: NodeId) -> Result<(), StoreError> {
        // Existence check on the column first; both locks are taken one at
        // a time, never nested.
        if !self.contains_node(column) {
            return Err(StoreError::NotFound);
        }
        let mut shard = self.nodes[table.partition()].write();
        let node = shard.get_mut(table.index()).ok_or(StoreError::NotFound)?;
        match &mut node.data {
            NodeData::Table { columns, .. } => {
                if !columns.contains(&column) {
                    columns.push(column);
                }
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    fn contains_node(&self, id: NodeId) -> bool {
        if id.partition() >= PARTITIONS {
            return false;
        }
        self.nodes[id.partition()].read().get(id.index()).is_some()
    }

    /// Adds an edge, deduplicated by `(source, target, type)`. Re-adding an
    /// existing edge updates its operation and expression text and returns
    /// the original ID.
    pub fn add_edge(
        &self,
        source: NodeId,
        target: NodeId,
        edge_type: EdgeType,
        operation: &str,
        sql_expression: Option<&str>,
    ) -> Result<EdgeId, StoreError> {
        if !self.contains_node(source) {
            return Err(StoreError::UnknownEndpoint(source));
        }
        if !self.contains_node(target) {
            return Err(StoreError::UnknownEndpoint(target));
        }

        let partition = partition_for_edge(source, target);
        let operation = self.pool.intern(operation);
        let sql_expression = sql_expression.map(|s| self.pool.intern(s));

        let (id, fresh) = {
            let mut shard = self.edges[partition].write();
            if let Some(&index) = shard.by_key.get(&(source, target, edge_type)) {
                let edge = &mut shard.edges[index as usize];
                edge.operation = operation;
                edge.sql_expression = sql_expression;
                (EdgeId::pack(partition, index as usize), false)
            } else {
                let index = shard.edges.len();
                let id = EdgeId::pack(partition, index);
                shard.edges.push(Edge {
                    id,
                    source_id: source,
                    target_id: target,
                    edge_type,
                    operation,
                    sql_expression,
                });
                shard.live.push(true);
                shard.by_key.insert((source, target, edge_type), index as u32);
                (id, true)
            }
        };

        if fresh {
            // Adjacency lives with the node each end attaches to.
            self.nodes[source.partition()]
                .write()
                .out_edges
                .entry(source.index() as u32)
                .or_default()
                .push(id);
            self.nodes[target.partition()]
                .write()
                .in_edges
                .entry(target.index() as u32)
                .or_default()
                .push(id);
        }
        Ok(id)
    }

    /// Looks up a column by `(table, name)`, case-insensitive.
    pub fn get_column(&self, table: &str, name: &str) -> Option<NodeId> {
        let table_lower = table.to_lowercase();
        let name_lower = name.to_lowercase();
        let partition = partition_for_name(&table_lower);
        let shard = self.nodes[partition].read();
        shard
            .columns_by_key
            .get(&(table_lower, name_lower))
            .map(|&index| NodeId::pack(partition, index as usize))
    }

    /// Looks up a table by name, case-insensitive.
    pub fn get_table(&self, name: &str) -> Option<NodeId> {
        let name_lower = name.to_lowercase();
        let partition = partition_for_name(&name_lower);
        let shard = self.nodes[partition].read();
        shard
            .tables_by_name
            .get(&name_lower)
            .map(|&index| NodeId::pack(partition, index as usize))
    }

    pub fn get_node(&self, id: NodeId) -> Result<Node, StoreError> {
        if id.partition() >= PARTITIONS {
            return Err(StoreError::NotFound);
        }
        self.nodes[id.partition()]
            .read()
            .get(id.index())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    pub fn get_edge(&self, id: EdgeId) -> Result<Edge, StoreError> {
        if id.partition() >= PARTITIONS {
            return Err(StoreError::NotFound);
        }
        let shard = self.edges[id.partition()].read();
        match shard.live.get(id.index()) {
            Some(true) => Ok(shard.edges[id.index()].clone()),
            _ => Err(StoreError::NotFound),
        }
    }

    /// Outgoing edge IDs of `id`, in insertion order.
    pub fn out_edges(&self, id: NodeId) -> Vec<EdgeId> {
        self.nodes[id.partition()]
            .read()
            .out_edges
            .get(&(id.index() as u32))
            .cloned()
            .unwrap_or_default()
    }

    /// Incoming edge IDs of `id`, in insertion order.
    pub fn in_edges(&self, id: NodeId) -> Vec<EdgeId> {
        self.nodes[id.partition()]
            .read()
            .in_edges
            .get(&(id.index() as u32))
            .cloned()
            .unwrap_or_default()
    }

    /// All node IDs of the given kind.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        let mut out = Vec::new();
        for (partition, shard) in self.nodes.iter().enumerate() {
            let shard = shard.read();
            if let Some(indexes) = shard.by_kind.get(&kind) {
                out.extend(
                    indexes
                        .iter()
                        .filter(|&&index| shard.live[index as usize])
                        .map(|&index| NodeId::pack(partition, index as usize)),
                );
            }
        }
        out.sort();
        out
    }

    pub fn node_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|shard| shard.read().live.iter().filter(|&&l| l).count())
            .sum()
    }

    pub fn edge_count(&self) -> usize {
        self.edges
            .iter()
            .map(|shard| shard.read().live.iter().filter(|&&l| l).count())
            .sum()
    }

    /// Removes column and expression nodes with no incident edges (tables
    /// remain as standalone roots), strips removed columns from their owning
    /// tables, and re-interns every string attribute into a fresh pool.
    /// Surviving IDs are preserved.
    pub fn compact(&mut self) {
        let mut incident: Vec<Vec<bool>> = self
            .nodes
            .iter_mut()
            .map(|shard| vec![false; shard.get_mut().nodes.len()])
            .collect();

        for shard in self.edges.iter_mut() {
            let shard = shard.get_mut();
            for (edge, live) in shard.edges.iter().zip(&shard.live) {
                if *live {
                    incident[edge.source_id.partition()][edge.source_id.index()] = true;
                    incident[edge.target_id.partition()][edge.target_id.index()] = true;
                }
            }
        }

        let mut removed: Vec<NodeId> = Vec::new();
        for (partition, shard) in self.nodes.iter_mut().enumerate() {
            let shard = shard.get_mut();
            for index in 0..shard.nodes.len() {
                if !shard.live[index] {
                    continue;
                }
                let node = &shard.nodes[index];
                let keep = node.kind == NodeKind::Table || incident[partition][index];
                if !keep {
                    shard.live[index] = false;
                    removed.push(NodeId::pack(partition, index));
                    shard.out_edges.remove(&(index as u32));
                    shard.in_edges.remove(&(index as u32));
                }
            }
            let NodePartition {
                columns_by_key,
                live,
                ..
            } = shard;
            columns_by_key.retain(|_, index| live[*index as usize]);
        }

        if !removed.is_empty() {
            let removed: std::collections::HashSet<NodeId> = removed.into_iter().collect();
            for shard in self.nodes.iter_mut() {
                let shard = shard.get_mut();
                for (node, live) in shard.nodes.iter_mut().zip(&shard.live) {
                    if !live {
                        continue;
                    }
                    if let NodeData::Table { columns, .. } = &mut node.data {
                        columns.retain(|column| !removed.contains(column));
                    }
                }
            }
        }

        self.reintern();
    }

    fn reintern(&mut self) {
        let pool = StringPool::new();
        for shard in self.nodes.iter_mut() {
            let shard = shard.get_mut();
            for (node, live) in shard.nodes.iter_mut().zip(&shard.live) {
                if !live {
                    continue;
                }
                node.name = pool.intern(&node.name);
                node.object_name = pool.intern(&node.object_name);
                node.schema_name = pool.intern(&node.schema_name);
                node.database_name = pool.intern(&node.database_name);
                match &mut node.data {
                    NodeData::Column {
                        data_type,
                        table_owner,
                        ..
                    } => {
                        *data_type = pool.intern(data_type);
                        *table_owner = pool.intern(table_owner);
                    }
                    NodeData::Table {
                        alias, definition, ..
                    } => {
                        if let Some(alias) = alias {
                            *alias = pool.intern(alias);
                        }
                        if let Some(definition) = definition {
                            *definition = pool.intern(definition);
                        }
                    }
                    NodeData::Expression {
                        expression,
                        result_type,
                        table_owner,
                        ..
                    } => {
                        *expression = pool.intern(expression);
                        *result_type = pool.intern(result_type);
                        *table_owner = pool.intern(table_owner);
                    }
                }
            }
        }
        for shard in self.edges.iter_mut() {
            let shard = shard.get_mut();
            for (edge, live) in shard.edges.iter_mut().zip(&shard.live) {
                if !live {
                    continue;
                }
                edge.operation = pool.intern(&edge.operation);
                if let Some(sql) = &mut edge.sql_expression {
                    *sql = pool.intern(sql);
                }
            }
        }
        self.pool = pool;
    }

    /// A serializable, read-only view of the graph, nodes and edges ordered
    /// by ID.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes = Vec::with_capacity(self.node_count());
        for shard in self.nodes.iter() {
            let shard = shard.read();
            for index in 0..shard.nodes.len() {
                if let Some(node) = shard.get(index) {
                    nodes.push(node.clone());
                }
            }
        }
        nodes.sort_by_key(|node| node.id);

        let mut edges = Vec::with_capacity(self.edge_count());
        for shard in self.edges.iter() {
            let shard = shard.read();
            for (edge, live) in shard.edges.iter().zip(&shard.live) {
                if *live {
                    edges.push(edge.clone());
                }
            }
        }
        edges.sort_by_key(|edge| edge.id);

        GraphSnapshot {
            nodes,
            edges,
            source_sql: self.source_sql.clone(),
            created_at: self.created_at,
            metadata: self.metadata.lock().clone(),
        }
    }
}

/// Serializable form of a [`LineageGraph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub source_sql: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Splits `db.schema.object` into its parts. Fewer parts bind rightward.
pub(crate) fn split_qualified(name: &str) -> (Option<&str>, Option<&str>, &str) {
    let parts: Vec<&str> = name.split('.').collect();
    match parts.len() {
        0 | 1 => (None, None, name),
        2 => (None, Some(parts[0]), parts[1]),
        _ => (Some(parts[0]), Some(parts[1]), parts[parts.len() - 1]),
    }
}
