use notegraph_core::{GraphPayload, NodeId};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Lookup structures over the live payload; rebuilt whenever topology
/// changes (full install or delta merge).
#[derive(Default)]
pub struct GraphIndex {
    pub node_of: HashMap<NodeId, usize>,
    pub incident: HashMap<NodeId, SmallVec<[usize; 8]>>,
}

impl GraphIndex {
    pub fn build(payload: &GraphPayload) -> Self {
        let mut node_of = HashMap::with_capacity(payload.nodes.len());
        for (i, node) in payload.nodes.iter().enumerate() {
            node_of.insert(node.id.clone(), i);
        }
        let mut incident: HashMap<NodeId, SmallVec<[usize; 8]>> = HashMap::new();
        for (ei, edge) in payload.edges.iter().enumerate() {
            incident.entry(edge.source.clone()).or_default().push(ei);
            incident.entry(edge.target.clone()).or_default().push(ei);
        }
        Self { node_of, incident }
    }

    pub fn edges_for<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = usize> + 'a {
        self.incident.get(id).into_iter().flatten().copied()
    }

    /// Degree over visible edges only.
    pub fn degree(&self, payload: &GraphPayload, id: &NodeId) -> usize {
        self.edges_for(id)
            .filter(|ei| !payload.edges[*ei].flow_only)
            .count()
    }

    pub fn neighbors(&self, payload: &GraphPayload, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for ei in self.edges_for(id) {
            let e = &payload.edges[ei];
            if e.flow_only {
                continue;
            }
            let other = if e.source == *id { &e.target } else { &e.source };
            if !out.contains(other) {
                out.push(other.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::{GraphEdge, GraphMeta, GraphNode, Layer, NodeKind};

    #[test]
    fn index_tracks_incidence_and_degree() {
        let n = |id: i64| GraphNode::new(NodeId::note(id), NodeKind::Note, format!("n{id}"));
        let mut twin = GraphEdge::new(NodeId::note(2), NodeId::note(1), Layer::NoteLinks);
        twin.flow_only = true;
        let payload = GraphPayload {
            nodes: vec![n(1), n(2), n(3)],
            edges: vec![
                GraphEdge::new(NodeId::note(1), NodeId::note(2), Layer::NoteLinks),
                GraphEdge::new(NodeId::note(2), NodeId::note(3), Layer::Priority),
                twin,
            ],
            meta: GraphMeta::default(),
        };
        let index = GraphIndex::build(&payload);
        assert_eq!(index.degree(&payload, &NodeId::note(2)), 2);
        assert_eq!(
            index.neighbors(&payload, &NodeId::note(2)),
            vec![NodeId::note(1), NodeId::note(3)]
        );
    }
}
