//! Shared helpers for integration tests.
#![allow(dead_code)]

use traceline_core::{
    analyze_with, AnalysisReport, AnalyzeOptions, CancellationToken, Edge, EdgeType,
    LineageGraph, MetadataProvider, NodeId, NullMetadata,
};

pub fn run(sql: &str) -> AnalysisReport {
    analyze_with(
        sql,
        &AnalyzeOptions::default(),
        &NullMetadata,
        CancellationToken::new(),
    )
    .expect("script should parse")
}

pub fn run_with_schema(sql: &str, provider: &dyn MetadataProvider) -> AnalysisReport {
    analyze_with(
        sql,
        &AnalyzeOptions::default(),
        provider,
        CancellationToken::new(),
    )
    .expect("script should parse")
}

/// The column node `owner.name`, or panics with a readable message.
pub fn column(graph: &LineageGraph, owner: &str, name: &str) -> NodeId {
    graph
        .get_column(owner, name)
        .unwrap_or_else(|| panic!("expected column {owner}.{name}"))
}

/// Every edge from `source` to `target`, any type.
pub fn edges_between(graph: &LineageGraph, source: NodeId, target: NodeId) -> Vec<Edge> {
    graph
        .out_edges(source)
        .into_iter()
        .filter_map(|id| graph.get_edge(id).ok())
        .filter(|edge| edge.target_id == target)
        .collect()
}

/// Asserts exactly one edge of the given type exists between two nodes and
/// returns it.
pub fn expect_edge(
    graph: &LineageGraph,
    source: NodeId,
    target: NodeId,
    edge_type: EdgeType,
) -> Edge {
    let matches: Vec<Edge> = edges_between(graph, source, target)
        .into_iter()
        .filter(|edge| edge.edge_type == edge_type)
        .collect();
    assert_eq!(
        matches.len(),
        1,
        "expected exactly one {edge_type:?} edge, found {}",
        matches.len()
    );
    matches.into_iter().next().unwrap()
}

/// Incoming edges of a node.
pub fn incoming(graph: &LineageGraph, target: NodeId) -> Vec<Edge> {
    graph
        .in_edges(target)
        .into_iter()
        .filter_map(|id| graph.get_edge(id).ok())
        .collect()
}
