//! Family gate: parse family fields into `(family_id, priority)` memberships,
//! emit hub nodes, hub/chain edges and priority-directed member edges.

use notegraph_core::{EdgeMeta, GraphEdge, Layer, NodeId, NodeKind};
use std::collections::BTreeMap;

use super::BuildCtx;
use crate::provider::{NoteProvider, NoteQuery};
use crate::text;

/// Pairwise member edges are only emitted for families up to this size;
/// beyond it only hub edges remain.
pub const FAMILY_MEMBER_CAP: usize = 80;

pub(crate) fn run(ctx: &mut BuildCtx<'_>, provider: &dyn NoteProvider) {
    if !ctx.cfg.family_gate.enabled {
        return;
    }

    let gate = ctx.cfg.family_gate.clone();
    let mut families: BTreeMap<String, Vec<(i64, i64)>> = BTreeMap::new();

    for mid in &gate.note_types {
        for nid in provider.find_notes(&NoteQuery::of_type(*mid)) {
            let Some(note) = provider.get_note(nid) else {
                ctx.diag.skipped_notes += 1;
                continue;
            };
            if !ctx.note_eligible(&note) {
                continue;
            }
            let Some(raw) = note.field(&gate.field) else {
                ctx.diag.malformed_families += 1;
                continue;
            };
            let (pairs, malformed) =
                text::parse_family_field(raw, &gate.separator, gate.default_priority);
            ctx.diag.malformed_families += malformed;
            if pairs.is_empty() {
                continue;
            }

            if let Some(node) = ctx.ensure_note_node(provider, nid) {
                for (fid, prio) in &pairs {
                    if !node.families.contains(fid) {
                        node.families.push(fid.clone());
                    }
                    node.prio = Some(node.prio.map_or(*prio, |p| p.min(*prio)));
                }
            } else {
                continue;
            }

            for (fid, prio) in pairs {
                families.entry(fid).or_default().push((nid, prio));
            }
        }
    }

    // Group hubs are additive memberships keyed by tag; a collision with a
    // real family id only contributes extra members.
    for hub in ctx.cfg.group_hubs.clone() {
        for nid in provider.find_notes(&NoteQuery::with_tag(&hub)) {
            let Some(note) = provider.get_note(nid) else {
                ctx.diag.skipped_notes += 1;
                continue;
            };
            if !ctx.note_eligible(&note) {
                continue;
            }
            if ctx.ensure_note_node(provider, nid).is_none() {
                continue;
            }
            let members = families.entry(text::normalize_family_id(&hub)).or_default();
            if !members.iter().any(|(m, _)| *m == nid) {
                members.push((nid, ctx.cfg.family_gate.default_priority));
            }
        }
    }

    for (fid, mut members) in families {
        members.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        members.dedup_by_key(|(nid, _)| *nid);

        if !ctx.any_in_scope(members.iter().map(|(nid, _)| nid)) {
            continue;
        }

        let wants_hub = members.len() >= 2 || ctx.cfg.show_unlinked;
        if wants_hub {
            ctx.ensure_hub(NodeId::family(&fid), NodeKind::Family, &fid);
        }

        if ctx.cfg.family_chain {
            emit_chain(ctx, &fid, &members);
        } else {
            emit_hub_edges(ctx, &fid, &members);
            emit_direct_edges(ctx, &members);
        }
    }
}

fn emit_hub_edges(ctx: &mut BuildCtx<'_>, fid: &str, members: &[(i64, i64)]) {
    if members.len() < 2 || !ctx.layer_enabled(Layer::Families) {
        return;
    }
    let hub = NodeId::family(fid);
    for (nid, _) in members {
        ctx.push_edge(GraphEdge::new(NodeId::note(*nid), hub.clone(), Layer::Families));
    }
}

/// Chain mode: only the lowest-priority rank attaches to the hub; each later
/// rank anchors to the first member (under id sort) of the previous rank.
fn emit_chain(ctx: &mut BuildCtx<'_>, fid: &str, members: &[(i64, i64)]) {
    if members.len() < 2 {
        return;
    }

    let mut ranks: Vec<(i64, Vec<i64>)> = Vec::new();
    for (nid, prio) in members {
        match ranks.last_mut() {
            Some((p, bucket)) if p == prio => bucket.push(*nid),
            _ => ranks.push((*prio, vec![*nid])),
        }
    }
    // Members arrive sorted by (prio, nid); each bucket is already id-sorted,
    // which pins the anchor deterministically.

    if ctx.layer_enabled(Layer::Families) {
        let hub = NodeId::family(fid);
        for nid in &ranks[0].1 {
            ctx.push_edge(GraphEdge::new(NodeId::note(*nid), hub.clone(), Layer::Families));
        }
    }

    if !ctx.layer_enabled(Layer::Priority) {
        return;
    }
    for level in 1..ranks.len() {
        let anchor = ranks[level - 1].1[0];
        for nid in &ranks[level].1 {
            let mut edge = GraphEdge::new(NodeId::note(anchor), NodeId::note(*nid), Layer::Priority);
            edge.meta = EdgeMeta {
                rank: Some(level as u32),
                ..EdgeMeta::default()
            };
            ctx.push_edge(edge);
        }
    }
}

/// Pairwise member edges, directed from the dominant (numerically lower)
/// priority to the weaker one. Same-priority pairs are gated by config and
/// come with a flow-only reverse twin.
fn emit_direct_edges(ctx: &mut BuildCtx<'_>, members: &[(i64, i64)]) {
    let n = members.len();
    if !(2..=FAMILY_MEMBER_CAP).contains(&n) || !ctx.layer_enabled(Layer::Priority) {
        return;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let (a, pa) = members[i];
            let (b, pb) = members[j];
            if pa < pb {
                ctx.push_edge(GraphEdge::new(
                    NodeId::note(a),
                    NodeId::note(b),
                    Layer::Priority,
                ));
            } else if pa == pb {
                if !ctx.cfg.same_prio_edges {
                    continue;
                }
                let mut edge = GraphEdge::new(NodeId::note(a), NodeId::note(b), Layer::Priority);
                edge.same_prio = true;
                edge.bidirectional = true;
                ctx.push_edge(edge);

                let mut twin = GraphEdge::new(NodeId::note(b), NodeId::note(a), Layer::Priority);
                twin.same_prio = true;
                twin.flow_only = true;
                ctx.push_edge(twin);
            }
            // pa > pb cannot happen: members are sorted by priority.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::{build_graph, FAMILY_MEMBER_CAP};
    use super::*;
    use crate::provider::fixtures::{note, note_type};
    use crate::provider::MemProvider;
    use notegraph_core::GraphPayload;

    fn edges_of(payload: &GraphPayload, layer: Layer) -> Vec<(String, String, bool)> {
        payload
            .edges
            .iter()
            .filter(|e| e.layer == layer)
            .map(|e| (e.source.0.clone(), e.target.0.clone(), e.flow_only))
            .collect()
    }

    #[test]
    fn hub_only_family_seed_scenario() {
        // A "家@0;", B "家@1", C "家@1"; chain off, same-prio off.
        let provider = family_provider();
        let payload = build_graph(Some(&provider), &family_cfg(), 1);

        let mut ids: Vec<_> = payload.nodes.iter().map(|n| n.id.0.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2", "3", "family:家"]);

        let mut hub = edges_of(&payload, Layer::Families);
        hub.sort();
        assert_eq!(
            hub,
            vec![
                ("1".into(), "family:家".into(), false),
                ("2".into(), "family:家".into(), false),
                ("3".into(), "family:家".into(), false),
            ]
        );

        let mut direct = edges_of(&payload, Layer::Priority);
        direct.sort();
        assert_eq!(
            direct,
            vec![
                ("1".into(), "2".into(), false),
                ("1".into(), "3".into(), false),
            ],
            "same-priority pair 2/3 must not appear with the flag off"
        );
    }

    #[test]
    fn chain_mode_seed_scenario() {
        let provider = family_provider();
        let mut cfg = family_cfg();
        cfg.family_chain = true;
        let payload = build_graph(Some(&provider), &cfg, 1);

        let hub = edges_of(&payload, Layer::Families);
        assert_eq!(hub, vec![("1".into(), "family:家".into(), false)]);

        let mut chain = edges_of(&payload, Layer::Priority);
        chain.sort();
        assert_eq!(
            chain,
            vec![
                ("1".into(), "2".into(), false),
                ("1".into(), "3".into(), false),
            ]
        );
    }

    #[test]
    fn same_priority_pair_emits_visible_plus_flow_twin() {
        let provider = family_provider();
        let mut cfg = family_cfg();
        cfg.same_prio_edges = true;
        let payload = build_graph(Some(&provider), &cfg, 1);

        let visible: Vec<_> = payload
            .edges
            .iter()
            .filter(|e| e.layer == Layer::Priority && e.same_prio && !e.flow_only)
            .collect();
        let twins: Vec<_> = payload
            .edges
            .iter()
            .filter(|e| e.layer == Layer::Priority && e.same_prio && e.flow_only)
            .collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(twins.len(), 1);
        assert!(visible[0].bidirectional);
        assert_eq!(visible[0].source, twins[0].target);
        assert_eq!(visible[0].target, twins[0].source);
    }

    #[test]
    fn single_member_family_gets_hub_only_when_show_unlinked() {
        let provider = MemProvider::new(
            vec![note_type(VOCAB_MID, "Vocab", &["Expression", "Families"])],
            vec![note(
                1,
                VOCAB_MID,
                "JP::Vocab",
                &[("Expression", "solo"), ("Families", "独@0")],
            )],
        );

        let cfg = family_cfg();
        let payload = build_graph(Some(&provider), &cfg, 1);
        // No edges, no hub; the lone note is dropped as unlinked.
        assert!(payload.edges.is_empty());
        assert!(payload.nodes.is_empty());

        let mut cfg = family_cfg();
        cfg.show_unlinked = true;
        let payload = build_graph(Some(&provider), &cfg, 1);
        let ids: Vec<_> = payload.nodes.iter().map(|n| n.id.0.clone()).collect();
        assert!(ids.contains(&"1".to_string()));
        assert!(ids.contains(&"family:独".to_string()));
        assert!(payload.edges.is_empty());
    }

    #[test]
    fn over_cap_family_keeps_hub_edges_only() {
        let count = FAMILY_MEMBER_CAP + 1;
        let notes: Vec<_> = (1..=count as i64)
            .map(|i| {
                note(
                    i,
                    VOCAB_MID,
                    "JP::Vocab",
                    &[
                        ("Expression", &format!("w{i}")),
                        ("Families", &format!("大@{i}")),
                    ],
                )
            })
            .collect();
        let provider = MemProvider::new(
            vec![note_type(VOCAB_MID, "Vocab", &["Expression", "Families"])],
            notes,
        );
        let payload = build_graph(Some(&provider), &family_cfg(), 1);

        assert_eq!(edges_of(&payload, Layer::Families).len(), count);
        assert!(edges_of(&payload, Layer::Priority).is_empty());
    }

    #[test]
    fn node_prio_is_minimum_over_memberships() {
        let provider = MemProvider::new(
            vec![note_type(VOCAB_MID, "Vocab", &["Expression", "Families"])],
            vec![
                note(
                    1,
                    VOCAB_MID,
                    "JP::Vocab",
                    &[("Expression", "x"), ("Families", "a@3;b@1")],
                ),
                note(
                    2,
                    VOCAB_MID,
                    "JP::Vocab",
                    &[("Expression", "y"), ("Families", "a@0;b@2")],
                ),
            ],
        );
        let payload = build_graph(Some(&provider), &family_cfg(), 1);
        let n1 = payload.nodes.iter().find(|n| n.id.0 == "1").unwrap();
        assert_eq!(n1.prio, Some(1));
        assert_eq!(n1.families, vec!["a".to_string(), "b".to_string()]);
    }
}
