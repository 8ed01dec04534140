//! Reference collapse: bidirectional reference pairs become one visible edge
//! plus a flow-only reverse twin, so the renderer animates both directions
//! without drawing two lines.

use notegraph_core::{GraphEdge, Layer, NodeId};
use std::collections::HashMap;

fn is_reference(layer: Layer) -> bool {
    matches!(layer, Layer::Notes | Layer::NoteLinks)
}

type PairKey = (NodeId, NodeId, Layer, bool);

fn unordered_key(e: &GraphEdge) -> PairKey {
    let (a, b) = if e.source <= e.target {
        (e.source.clone(), e.target.clone())
    } else {
        (e.target.clone(), e.source.clone())
    };
    (a, b, e.layer, e.manual)
}

pub(crate) fn collapse_references(edges: Vec<GraphEdge>) -> Vec<GraphEdge> {
    let mut out: Vec<GraphEdge> = Vec::with_capacity(edges.len());
    let mut groups: HashMap<PairKey, Vec<GraphEdge>> = HashMap::new();
    let mut order: Vec<PairKey> = Vec::new();

    for edge in edges {
        if is_reference(edge.layer) && !edge.flow_only {
            let key = unordered_key(&edge);
            let group = groups.entry(key.clone()).or_default();
            if group.is_empty() {
                order.push(key);
            }
            group.push(edge);
        } else {
            out.push(edge);
        }
    }

    for key in order {
        let group = groups.remove(&key).unwrap_or_default();
        let both_directions = group
            .iter()
            .any(|e| e.source != group[0].source || e.target != group[0].target);

        // First-encountered direction stays visible.
        let mut visible = group.into_iter().next().unwrap();
        if both_directions {
            visible.bidirectional = true;
            let mut twin = GraphEdge::new(
                visible.target.clone(),
                visible.source.clone(),
                visible.layer,
            );
            twin.manual = visible.manual;
            twin.flow_only = true;
            twin.meta = visible.meta.clone();
            out.push(visible);
            out.push(twin);
        } else {
            out.push(visible);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::NodeId;

    fn reference(src: i64, dst: i64, manual: bool) -> GraphEdge {
        let mut e = GraphEdge::new(NodeId::note(src), NodeId::note(dst), Layer::NoteLinks);
        e.manual = manual;
        e
    }

    #[test]
    fn single_direction_passes_through() {
        let out = collapse_references(vec![reference(1, 2, true)]);
        assert_eq!(out.len(), 1);
        assert!(!out[0].bidirectional);
        assert!(!out[0].flow_only);
    }

    #[test]
    fn both_directions_fold_into_visible_and_twin() {
        let out = collapse_references(vec![reference(1, 2, true), reference(2, 1, true)]);
        assert_eq!(out.len(), 2);
        let visible = &out[0];
        let twin = &out[1];
        assert!(visible.bidirectional && !visible.flow_only);
        assert_eq!(visible.source, NodeId::note(1));
        assert!(twin.flow_only);
        assert_eq!(twin.source, NodeId::note(2));
        assert_eq!(twin.target, NodeId::note(1));
    }

    #[test]
    fn manual_flag_separates_groups() {
        let out = collapse_references(vec![reference(1, 2, true), reference(2, 1, false)]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| !e.bidirectional && !e.flow_only));
    }

    #[test]
    fn non_reference_layers_are_untouched() {
        let hub = GraphEdge::new(NodeId::note(1), NodeId::family("f"), Layer::Families);
        let out = collapse_references(vec![hub.clone()]);
        assert_eq!(out, vec![hub]);
    }
}
