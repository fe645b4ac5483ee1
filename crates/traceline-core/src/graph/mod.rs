//! The lineage graph: nodes, edges, partitioned store, and path queries.

mod node;
mod paths;
mod store;

pub use node::{
    ColumnFlags, Edge, EdgeId, EdgeType, ExpressionKind, Node, NodeData, NodeId, NodeKind,
    TableKind,
};
pub use store::{GraphSnapshot, LineageGraph};
