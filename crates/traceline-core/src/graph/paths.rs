//! Bounded-depth path enumeration over the lineage graph.

use super::node::{EdgeId, NodeId};
use super::store::LineageGraph;

impl LineageGraph {
    /// Enumerates every simple path (no repeated node) of length at most
    /// `max_depth` from `source` to `target`, following outgoing edges.
    ///
    /// Paths are returned as edge-ID sequences. When `source == target` the
    /// result includes the empty path. Cycles in the graph (recursive CTEs)
    /// are safe: a node already on the current path is never revisited.
    pub fn find_paths(
        &self,
        source: NodeId,
        target: NodeId,
        max_depth: usize,
    ) -> Vec<Vec<EdgeId>> {
        if self.get_node(source).is_err() || self.get_node(target).is_err() {
            return Vec::new();
        }

        let mut paths = Vec::new();
        let mut edge_stack: Vec<EdgeId> = Vec::new();
        let mut on_path: Vec<NodeId> = vec![source];

        if source == target {
            paths.push(Vec::new());
        }

        self.descend(
            source,
            target,
            max_depth,
            &mut edge_stack,
            &mut on_path,
            &mut paths,
        );
        paths
    }

    fn descend(
        &self,
        current: NodeId,
        target: NodeId,
        remaining: usize,
        edge_stack: &mut Vec<EdgeId>,
        on_path: &mut Vec<NodeId>,
        paths: &mut Vec<Vec<EdgeId>>,
    ) {
        if remaining == 0 {
            return;
        }
        for edge_id in self.out_edges(current) {
            let Ok(edge) = self.get_edge(edge_id) else {
                continue;
            };
            let next = edge.target_id;
            if on_path.contains(&next) {
                continue;
            }
            edge_stack.push(edge_id);
            if next == target {
                paths.push(edge_stack.clone());
            }
            on_path.push(next);
            self.descend(next, target, remaining - 1, edge_stack, on_path, paths);
            on_path.pop();
            edge_stack.pop();
        }
    }
}
