//! Per-layer maximum spanning forest over effective weights. Edges outside
//! the forest get their spring strength attenuated when MST pruning is on.

use notegraph_core::{GraphPayload, NodeId};
use std::collections::{HashMap, HashSet};

struct Dsu {
    parent: Vec<usize>,
}

impl Dsu {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        self.parent[ra] = rb;
        true
    }
}

/// Indices of visible edges that are NOT part of their layer's maximum
/// spanning forest.
pub fn non_tree_edges(payload: &GraphPayload, weights: &[f32]) -> HashSet<usize> {
    let mut slot: HashMap<&NodeId, usize> = HashMap::new();
    for node in &payload.nodes {
        let next = slot.len();
        slot.insert(&node.id, next);
    }

    let mut by_layer: HashMap<_, Vec<usize>> = HashMap::new();
    for (ei, edge) in payload.edges.iter().enumerate() {
        if edge.flow_only {
            continue;
        }
        by_layer.entry(edge.layer).or_default().push(ei);
    }

    let mut out = HashSet::new();
    for (_, mut edge_ids) in by_layer {
        edge_ids.sort_by(|a, b| {
            weights[*b]
                .partial_cmp(&weights[*a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(b))
        });
        let mut dsu = Dsu::new(slot.len());
        for ei in edge_ids {
            let e = &payload.edges[ei];
            let (Some(&a), Some(&b)) = (slot.get(&e.source), slot.get(&e.target)) else {
                continue;
            };
            if !dsu.union(a, b) {
                out.insert(ei);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::{GraphEdge, GraphMeta, GraphNode, Layer, NodeKind};

    #[test]
    fn weakest_cycle_edge_is_pruned() {
        let n = |id: i64| GraphNode::new(NodeId::note(id), NodeKind::Note, format!("n{id}"));
        let e = |a: i64, b: i64| GraphEdge::new(NodeId::note(a), NodeId::note(b), Layer::Notes);
        let payload = GraphPayload {
            nodes: vec![n(1), n(2), n(3)],
            edges: vec![e(1, 2), e(2, 3), e(3, 1)],
            meta: GraphMeta::default(),
        };
        let weights = vec![1.0, 0.2, 0.9];
        let non_tree = non_tree_edges(&payload, &weights);
        assert_eq!(non_tree, HashSet::from([1]));
    }

    #[test]
    fn layers_prune_independently() {
        let n = |id: i64| GraphNode::new(NodeId::note(id), NodeKind::Note, format!("n{id}"));
        let mut e12p = GraphEdge::new(NodeId::note(1), NodeId::note(2), Layer::Priority);
        e12p.weight = 1.0;
        let payload = GraphPayload {
            nodes: vec![n(1), n(2)],
            edges: vec![
                GraphEdge::new(NodeId::note(1), NodeId::note(2), Layer::Notes),
                e12p,
            ],
            meta: GraphMeta::default(),
        };
        let weights = vec![1.0, 1.0];
        // Parallel edges on different layers both form their own forest.
        assert!(non_tree_edges(&payload, &weights).is_empty());
    }
}
