//! Concurrent writers against one shared graph: the partitioned locks must
//! keep key-level read-modify-write operations linearizable.

use std::collections::HashSet;
use std::sync::Arc;
use traceline_core::{ColumnFlags, EdgeType, LineageGraph, NodeKind};

#[test]
fn concurrent_column_creation_deduplicates() {
    let graph = Arc::new(LineageGraph::new(""));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let graph = graph.clone();
            std::thread::spawn(move || {
                let mut ids = Vec::new();
                for i in 0..200 {
                    let id = graph.add_column_node(
                        &format!("Table{}", i % 4),
                        &format!("col{}", i % 10),
                        "int",
                        ColumnFlags::default(),
                    );
                    ids.push(id);
                }
                ids
            })
        })
        .collect();

    let mut all_ids: HashSet<_> = HashSet::new();
    for handle in handles {
        all_ids.extend(handle.join().unwrap());
    }
    // 4 tables x 10 column names, however many threads raced to create them.
    assert_eq!(all_ids.len(), 40);
    assert_eq!(graph.node_count(), 40);
    // Every (table, column) key resolves to exactly the ID the writers got.
    for table in 0..4 {
        for col in 0..10 {
            let id = graph
                .get_column(&format!("table{table}"), &format!("COL{col}"))
                .expect("column must exist");
            assert!(all_ids.contains(&id));
        }
    }
}

#[test]
fn concurrent_edge_creation_deduplicates() {
    let graph = Arc::new(LineageGraph::new(""));
    let sources: Vec<_> = (0..10)
        .map(|i| graph.add_column_node("S", &format!("c{i}"), "int", ColumnFlags::default()))
        .collect();
    let targets: Vec<_> = (0..10)
        .map(|i| graph.add_column_node("T", &format!("c{i}"), "int", ColumnFlags::default()))
        .collect();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let graph = graph.clone();
            let sources = sources.clone();
            let targets = targets.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    for (s, t) in sources.iter().zip(&targets) {
                        graph
                            .add_edge(*s, *t, EdgeType::Direct, "SELECT", None)
                            .unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(graph.edge_count(), 10);
    // Adjacency saw each edge exactly once.
    for s in &sources {
        assert_eq!(graph.out_edges(*s).len(), 1);
    }
    for t in &targets {
        assert_eq!(graph.in_edges(*t).len(), 1);
    }
}

#[test]
fn readers_and_writers_interleave_safely() {
    let graph = Arc::new(LineageGraph::new(""));
    let a = graph.add_column_node("T", "a", "int", ColumnFlags::default());

    let writer = {
        let graph = graph.clone();
        std::thread::spawn(move || {
            for i in 0..500 {
                let b = graph.add_column_node("T", &format!("b{i}"), "int", ColumnFlags::default());
                graph.add_edge(a, b, EdgeType::Direct, "SELECT", None).unwrap();
            }
        })
    };
    let reader = {
        let graph = graph.clone();
        std::thread::spawn(move || {
            for _ in 0..500 {
                // Every edge visible to the reader must have resolvable
                // endpoints.
                for edge_id in graph.out_edges(a) {
                    let edge = graph.get_edge(edge_id).unwrap();
                    assert!(graph.get_node(edge.source_id).is_ok());
                    assert!(graph.get_node(edge.target_id).is_ok());
                }
            }
        })
    };
    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(graph.out_edges(a).len(), 500);
    assert_eq!(graph.nodes_of_kind(NodeKind::Column).len(), 501);
}
