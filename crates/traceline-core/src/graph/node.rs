//! Node and edge records for the lineage graph.
//!
//! Nodes and edges are identified by packed integer IDs: the upper bits select
//! the lock partition that owns the record, the lower bits are the dense index
//! inside that partition. IDs are opaque to callers and unique for the
//! lifetime of one graph; they carry no meaning across graphs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) const PARTITION_BITS: u32 = 4;
/// Number of lock partitions in a graph. Power of two so the partition index
/// can be computed with `hash & (PARTITIONS - 1)`.
pub(crate) const PARTITIONS: usize = 1 << PARTITION_BITS;
pub(crate) const INDEX_BITS: u32 = 32 - PARTITION_BITS;
pub(crate) const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Opaque identifier of a node within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) u32);

/// Opaque identifier of an edge within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn pack(partition: usize, index: usize) -> Self {
        debug_assert!(partition < PARTITIONS);
        debug_assert!(index <= INDEX_MASK as usize);
        Self(((partition as u32) << INDEX_BITS) | index as u32)
    }

    pub(crate) fn partition(self) -> usize {
        (self.0 >> INDEX_BITS) as usize
    }

    pub(crate) fn index(self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }
}

impl EdgeId {
    pub(crate) fn pack(partition: usize, index: usize) -> Self {
        debug_assert!(partition < PARTITIONS);
        debug_assert!(index <= INDEX_MASK as usize);
        Self(((partition as u32) << INDEX_BITS) | index as u32)
    }

    pub(crate) fn partition(self) -> usize {
        (self.0 >> INDEX_BITS) as usize
    }

    pub(crate) fn index(self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }
}

/// The kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Column,
    Table,
    Expression,
}

/// The kind of a table-like node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableKind {
    BaseTable,
    View,
    Cte,
    TempTable,
    TableVariable,
    DerivedTable,
    ResultSet,
}

/// The kind of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpressionKind {
    Function,
    Case,
    Coalesce,
    NullIf,
    Window,
    Pivot,
    Unpivot,
    ColumnReference,
    Arithmetic,
    Predicate,
    Grouping,
}

/// The type of an edge. Deduplication key is `(source, target, type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeType {
    Direct,
    Indirect,
    Join,
    GroupBy,
    Filter,
    Parameter,
}

/// Flags supplied when creating a column node.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnFlags {
    pub nullable: bool,
    pub computed: bool,
}

/// A node record.
///
/// Field names follow the serialized form consumers expect: `objectName`,
/// `schemaName`, `databaseName`, plus the variant fields carried in
/// [`NodeData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: Arc<str>,
    pub object_name: Arc<str>,
    pub schema_name: Arc<str>,
    pub database_name: Arc<str>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub data: NodeData,
}

/// Variant-specific node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeData {
    #[serde(rename_all = "camelCase")]
    Column {
        data_type: Arc<str>,
        table_owner: Arc<str>,
        is_nullable: bool,
        is_computed: bool,
    },
    #[serde(rename_all = "camelCase")]
    Table {
        table_type: TableKind,
        #[serde(default)]
        columns: Vec<NodeId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<Arc<str>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        definition: Option<Arc<str>>,
    },
    #[serde(rename_all = "camelCase")]
    Expression {
        expression_type: ExpressionKind,
        expression: Arc<str>,
        result_type: Arc<str>,
        table_owner: Arc<str>,
    },
}

impl Node {
    /// The table kind, when this is a table node.
    pub fn table_kind(&self) -> Option<TableKind> {
        match &self.data {
            NodeData::Table { table_type, .. } => Some(*table_type),
            _ => None,
        }
    }

    /// The owned column list, when this is a table node.
    pub fn columns(&self) -> &[NodeId] {
        match &self.data {
            NodeData::Table { columns, .. } => columns,
            _ => &[],
        }
    }

    /// The owning table name, for column and expression nodes.
    pub fn table_owner(&self) -> Option<&str> {
        match &self.data {
            NodeData::Column { table_owner, .. } | NodeData::Expression { table_owner, .. } => {
                Some(table_owner)
            }
            NodeData::Table { .. } => None,
        }
    }
}

/// An edge record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub operation: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_expression: Option<Arc<str>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_packing_round_trips() {
        for partition in [0usize, 1, 7, PARTITIONS - 1] {
            for index in [0usize, 1, 1024, INDEX_MASK as usize] {
                let id = NodeId::pack(partition, index);
                assert_eq!(id.partition(), partition);
                assert_eq!(id.index(), index);
            }
        }
    }

    #[test]
    fn edge_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EdgeType::Direct).unwrap(),
            "\"direct\""
        );
        assert_eq!(
            serde_json::to_string(&EdgeType::GroupBy).unwrap(),
            "\"groupBy\""
        );
    }

    #[test]
    fn column_node_round_trips() {
        let node = Node {
            id: NodeId::pack(0, 3),
            kind: NodeKind::Column,
            name: "a".into(),
            object_name: "a".into(),
            schema_name: "".into(),
            database_name: "".into(),
            metadata: HashMap::new(),
            data: NodeData::Column {
                data_type: "int".into(),
                table_owner: "T1".into(),
                is_nullable: true,
                is_computed: false,
            },
        };
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"tableOwner\":\"T1\""));
        assert!(json.contains("\"dataType\":\"int\""));
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn table_node_round_trips() {
        let node = Node {
            id: NodeId::pack(1, 0),
            kind: NodeKind::Table,
            name: "Orders".into(),
            object_name: "dbo.Orders".into(),
            schema_name: "dbo".into(),
            database_name: "".into(),
            metadata: HashMap::new(),
            data: NodeData::Table {
                table_type: TableKind::TempTable,
                columns: vec![NodeId::pack(1, 1)],
                alias: Some("o".into()),
                definition: None,
            },
        };
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"tableType\":\"tempTable\""));
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }
}
