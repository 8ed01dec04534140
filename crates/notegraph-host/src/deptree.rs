//! Dependency tree for a note: BFS over the directed layers (priority,
//! notes, note_links) of the live build, depth-capped.

use notegraph_core::{DepTreeNode, DepTreePayload, GraphPayload, Layer, NodeId};
use std::collections::{HashSet, VecDeque};

const MAX_DEPTH: u32 = 5;

fn directed(layer: Layer) -> bool {
    matches!(layer, Layer::Priority | Layer::Notes | Layer::NoteLinks)
}

pub fn dep_tree(payload: &GraphPayload, root_nid: i64) -> DepTreePayload {
    let root = NodeId::note(root_nid);
    let label_of = |id: &NodeId| {
        payload
            .nodes
            .iter()
            .find(|n| n.id == *id)
            .map(|n| n.label.clone())
            .unwrap_or_else(|| id.0.clone())
    };

    let mut nodes = vec![DepTreeNode {
        id: root.clone(),
        label: label_of(&root),
        depth: 0,
        parent: None,
    }];
    let mut seen: HashSet<NodeId> = HashSet::from([root.clone()]);
    let mut queue: VecDeque<(NodeId, u32)> = VecDeque::from([(root, 0)]);

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= MAX_DEPTH {
            continue;
        }
        let mut children: Vec<NodeId> = payload
            .edges
            .iter()
            .filter(|e| directed(e.layer) && !e.flow_only && e.source == current)
            .map(|e| e.target.clone())
            .filter(|t| !seen.contains(t))
            .collect();
        children.sort();
        children.dedup();
        for child in children {
            seen.insert(child.clone());
            nodes.push(DepTreeNode {
                id: child.clone(),
                label: label_of(&child),
                depth: depth + 1,
                parent: Some(current.clone()),
            });
            queue.push_back((child, depth + 1));
        }
    }

    DepTreePayload {
        root: NodeId::note(root_nid),
        nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::{GraphEdge, GraphMeta, GraphNode, NodeKind};

    fn payload() -> GraphPayload {
        let n = |id: i64| GraphNode::new(NodeId::note(id), NodeKind::Note, format!("n{id}"));
        GraphPayload {
            nodes: vec![n(1), n(2), n(3)],
            edges: vec![
                GraphEdge::new(NodeId::note(1), NodeId::note(2), Layer::Priority),
                GraphEdge::new(NodeId::note(2), NodeId::note(3), Layer::NoteLinks),
                // Undirected layer must not contribute.
                GraphEdge::new(NodeId::note(1), NodeId::family("f"), Layer::Families),
            ],
            meta: GraphMeta::default(),
        }
    }

    #[test]
    fn walks_directed_layers_breadth_first() {
        let tree = dep_tree(&payload(), 1);
        let depths: Vec<(String, u32)> = tree
            .nodes
            .iter()
            .map(|n| (n.id.0.clone(), n.depth))
            .collect();
        assert_eq!(
            depths,
            vec![
                ("1".to_string(), 0),
                ("2".to_string(), 1),
                ("3".to_string(), 2),
            ]
        );
        assert_eq!(tree.nodes[1].parent, Some(NodeId::note(1)));
    }

    #[test]
    fn unknown_root_yields_singleton_tree() {
        let tree = dep_tree(&payload(), 99);
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].label, "99");
    }
}
