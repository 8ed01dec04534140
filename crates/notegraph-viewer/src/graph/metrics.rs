//! Neighbor-scaling metrics. When a layer's weight mode is `metric`, the
//! effective link weight of an edge comes from a per-pair connectivity
//! metric (common neighbors, Jaccard, overlap, cosine-style CCM, two-hop)
//! over the chosen direction, scaled by the per-layer weight table.

use notegraph_core::{GraphPayload, NodeId, ScaleDirection, ScaleMode, WeightMode};
use std::collections::{HashMap, HashSet};

use crate::graph::model::GraphIndex;

/// One weight per edge, aligned with `payload.edges`.
pub fn effective_weights(payload: &GraphPayload, index: &GraphIndex) -> Vec<f32> {
    let ns = &payload.meta.settings.neighbor_scale;
    let mut neighbor_cache: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();

    payload
        .edges
        .iter()
        .map(|edge| {
            let Some(ls) = payload.meta.layer_settings.get(&edge.layer) else {
                return edge.weight;
            };
            if ns.mode == ScaleMode::None || ls.weight_mode == WeightMode::Manual {
                return ls.weight * edge.weight;
            }
            let a = neighbors(payload, index, &mut neighbor_cache, &edge.source, ns.direction);
            let b = neighbors(payload, index, &mut neighbor_cache, &edge.target, ns.direction);
            let metric = pair_metric(ns.mode, &a, &b);
            let layer_weight = ns.layer_weights.get(&edge.layer).copied().unwrap_or(1.0);
            (0.05 + metric) * layer_weight * edge.weight
        })
        .collect()
}

fn neighbors(
    payload: &GraphPayload,
    index: &GraphIndex,
    cache: &mut HashMap<NodeId, HashSet<NodeId>>,
    id: &NodeId,
    direction: ScaleDirection,
) -> HashSet<NodeId> {
    if let Some(cached) = cache.get(id) {
        return cached.clone();
    }
    let mut set = HashSet::new();
    for ei in index.edges_for(id) {
        let e = &payload.edges[ei];
        if e.flow_only {
            continue;
        }
        let keep = match direction {
            ScaleDirection::Undirected => true,
            ScaleDirection::Out => e.source == *id,
            ScaleDirection::In => e.target == *id,
        };
        if keep {
            let other = if e.source == *id { &e.target } else { &e.source };
            set.insert(other.clone());
        }
    }
    cache.insert(id.clone(), set.clone());
    set
}

fn pair_metric(mode: ScaleMode, a: &HashSet<NodeId>, b: &HashSet<NodeId>) -> f32 {
    let common = a.intersection(b).count() as f32;
    match mode {
        ScaleMode::None => 1.0,
        ScaleMode::CommonNeighbors => common,
        ScaleMode::Jaccard => {
            let union = a.union(b).count() as f32;
            if union == 0.0 {
                0.0
            } else {
                common / union
            }
        }
        ScaleMode::Overlap => {
            let min = a.len().min(b.len()) as f32;
            if min == 0.0 {
                0.0
            } else {
                common / min
            }
        }
        ScaleMode::Ccm => {
            let denom = ((a.len() * b.len()) as f32).sqrt();
            if denom == 0.0 {
                0.0
            } else {
                common / denom
            }
        }
        // Two-hop reach from the source side, so the metric is sensitive to
        // which endpoint fans out.
        ScaleMode::Twohop => {
            if a.is_empty() {
                0.0
            } else {
                common / a.len() as f32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::{
        GraphEdge, GraphMeta, GraphNode, Layer, LayerSettings, NodeKind, ViewSettings,
    };

    fn triangle_payload(mode: ScaleMode) -> GraphPayload {
        // 1-2, 1-3, 2-3, plus a pendant 4 on 1.
        let n = |id: i64| GraphNode::new(NodeId::note(id), NodeKind::Note, format!("n{id}"));
        let e = |a: i64, b: i64| GraphEdge::new(NodeId::note(a), NodeId::note(b), Layer::Notes);
        let mut meta = GraphMeta::default();
        meta.layer_settings.insert(
            Layer::Notes,
            LayerSettings {
                weight_mode: WeightMode::Metric,
                weight: 2.0,
                ..LayerSettings::default()
            },
        );
        meta.settings = ViewSettings {
            neighbor_scale: notegraph_core::NeighborScale {
                mode,
                direction: ScaleDirection::Undirected,
                layer_weights: [(Layer::Notes, 1.0)].into_iter().collect(),
            },
            ..ViewSettings::default()
        };
        GraphPayload {
            nodes: vec![n(1), n(2), n(3), n(4)],
            edges: vec![e(1, 2), e(1, 3), e(2, 3), e(1, 4)],
            meta,
        }
    }

    #[test]
    fn manual_mode_multiplies_layer_weight() {
        let mut payload = triangle_payload(ScaleMode::None);
        payload
            .meta
            .layer_settings
            .get_mut(&Layer::Notes)
            .unwrap()
            .weight_mode = WeightMode::Manual;
        let index = GraphIndex::build(&payload);
        let w = effective_weights(&payload, &index);
        assert_eq!(w, vec![2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn common_neighbors_favors_triangle_edges() {
        let payload = triangle_payload(ScaleMode::CommonNeighbors);
        let index = GraphIndex::build(&payload);
        let w = effective_weights(&payload, &index);
        // Edge 1-2 shares neighbor 3; edge 1-4 shares nothing.
        assert!(w[0] > w[3]);
    }

    #[test]
    fn jaccard_is_bounded_by_one() {
        let payload = triangle_payload(ScaleMode::Jaccard);
        let index = GraphIndex::build(&payload);
        for w in effective_weights(&payload, &index) {
            assert!(w <= (0.05 + 1.0) * 1.0 * 1.0 + f32::EPSILON);
        }
    }
}
