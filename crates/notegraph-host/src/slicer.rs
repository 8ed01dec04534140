//! Delta slicer: from a set of changed note ids, rebuild the gates restricted
//! to the change set plus its first-order neighborhood and diff the result
//! against the live build. Applying the slice to the previous graph equals a
//! full rebuild restricted to that neighborhood.

use notegraph_core::{DeltaSlice, GraphPayload, NodeId};
use std::collections::{HashMap, HashSet};

use crate::assemble::build_scoped;
use crate::config::GraphConfig;
use crate::provider::NoteProvider;

pub fn slice_delta(
    provider: &dyn NoteProvider,
    cfg: &GraphConfig,
    prev: &GraphPayload,
    changed: &[i64],
    reason: &str,
    rev: u64,
) -> DeltaSlice {
    let recursive = cfg.engine_val("slice_recursion") >= 1.0;

    let adjacency = adjacency_of(prev);
    let mut scope: HashSet<i64> = changed.iter().copied().collect();
    expand_neighborhood(&adjacency, &mut scope);
    if recursive {
        // Opt-in only; a change set wide enough to need this should go
        // through the full-rebuild path instead.
        expand_neighborhood(&adjacency, &mut scope);
    }
    tracing::debug!(
        changed = changed.len(),
        scope = scope.len(),
        recursive,
        reason,
        "delta slice"
    );

    let fresh = build_scoped(provider, cfg, rev, Some(scope.clone()));

    let scope_ids: HashSet<NodeId> = scope.iter().map(|nid| NodeId::note(*nid)).collect();
    let mut affected_hubs: HashSet<NodeId> = HashSet::new();
    for nid in changed {
        let id = NodeId::note(*nid);
        for nb in adjacency.get(&id).into_iter().flatten() {
            if nb.as_note().is_none() {
                affected_hubs.insert(nb.clone());
            }
        }
    }

    let fresh_keys: HashSet<_> = fresh.edges.iter().map(|e| e.key()).collect();
    let fresh_nodes: HashSet<_> = fresh.nodes.iter().map(|n| n.id.clone()).collect();

    let candidate = |src: &NodeId, dst: &NodeId| {
        scope_ids.contains(src)
            || scope_ids.contains(dst)
            || ((src.as_note().is_none() && dst.as_note().is_none())
                && (affected_hubs.contains(src) || affected_hubs.contains(dst)))
    };

    let removed_edges = prev
        .edges
        .iter()
        .filter(|e| candidate(&e.source, &e.target))
        .filter(|e| !fresh_keys.contains(&e.key()))
        .map(|e| e.key())
        .collect();

    let removed_nodes = prev
        .nodes
        .iter()
        .filter(|n| scope_ids.contains(&n.id) || affected_hubs.contains(&n.id))
        .filter(|n| !fresh_nodes.contains(&n.id))
        .map(|n| n.id.clone())
        .collect();

    DeltaSlice {
        rev,
        reason: reason.to_string(),
        nodes_raw: fresh.nodes,
        edges_raw: fresh.edges,
        removed_nodes,
        removed_edges,
    }
}

fn adjacency_of(payload: &GraphPayload) -> HashMap<NodeId, Vec<NodeId>> {
    let mut adj: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for e in &payload.edges {
        adj.entry(e.source.clone()).or_default().push(e.target.clone());
        adj.entry(e.target.clone()).or_default().push(e.source.clone());
    }
    adj
}

/// Grow the note-id scope by one hop: direct note neighbors, plus notes two
/// steps away through a synthetic hub (family co-members, kanji
/// co-occurrences share only the hub).
fn expand_neighborhood(adjacency: &HashMap<NodeId, Vec<NodeId>>, scope: &mut HashSet<i64>) {
    let seeds: Vec<NodeId> = scope.iter().map(|nid| NodeId::note(*nid)).collect();
    for seed in seeds {
        for nb in adjacency.get(&seed).into_iter().flatten() {
            match nb.as_note() {
                Some(nid) => {
                    scope.insert(nid);
                }
                None => {
                    for nb2 in adjacency.get(nb).into_iter().flatten() {
                        if let Some(nid) = nb2.as_note() {
                            scope.insert(nid);
                        }
                    }
                }
            }
        }
    }
}
