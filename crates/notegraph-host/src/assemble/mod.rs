//! Graph assembly. Raw notes and configuration go in; a typed multilayer
//! node/edge set comes out. Four gates run in fixed order (family, example,
//! kanji, note linker), then the reference collapse pass, then layer
//! recording and unlinked-node dropping.

use notegraph_core::{
    CardInfo, Diagnostics, EdgeKey, GraphEdge, GraphMeta, GraphNode, GraphPayload, Layer, NodeId,
    NodeKind,
};
use std::collections::{BTreeMap, HashSet};

use crate::config::GraphConfig;
use crate::provider::{Note, NoteProvider};
use crate::text;

mod collapse;
mod example;
mod family;
mod kanji;
mod linker;

pub use family::FAMILY_MEMBER_CAP;
pub use kanji::MAX_COMPONENT_DEPTH;

/// Emitted when a build is attempted without a usable provider; the caller
/// treats it as "retry later".
pub const ERR_MISSING_TOOLS: &str = "missing_tools_config";

pub(crate) struct BuildCtx<'a> {
    pub cfg: &'a GraphConfig,
    pub nodes: BTreeMap<NodeId, GraphNode>,
    pub edges: Vec<GraphEdge>,
    visible_keys: HashSet<EdgeKey>,
    pub diag: Diagnostics,
    /// When set, gates only process units touching these note ids.
    pub scope: Option<HashSet<i64>>,
}

impl<'a> BuildCtx<'a> {
    fn new(cfg: &'a GraphConfig, scope: Option<HashSet<i64>>) -> Self {
        Self {
            cfg,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            visible_keys: HashSet::new(),
            diag: Diagnostics::default(),
            scope,
        }
    }

    pub fn in_scope(&self, nid: i64) -> bool {
        self.scope.as_ref().is_none_or(|s| s.contains(&nid))
    }

    pub fn any_in_scope<'b>(&self, nids: impl IntoIterator<Item = &'b i64>) -> bool {
        match &self.scope {
            None => true,
            Some(s) => nids.into_iter().any(|n| s.contains(n)),
        }
    }

    pub fn layer_enabled(&self, layer: Layer) -> bool {
        self.cfg.layer(layer).enabled
    }

    /// A note's deck must be selected (or no decks selected at all) and its
    /// note type visible for any gate to touch it.
    pub fn note_eligible(&self, note: &Note) -> bool {
        if !self.cfg.note_type(note.mid).visible {
            return false;
        }
        if self.cfg.decks.is_empty() {
            return true;
        }
        self.cfg
            .decks
            .iter()
            .any(|d| note.deck == *d || note.deck.starts_with(&format!("{d}::")))
    }

    /// Create (or return) the node for a real note, with label, tooltip
    /// extras and card summaries resolved from config.
    pub fn ensure_note_node(
        &mut self,
        provider: &dyn NoteProvider,
        nid: i64,
    ) -> Option<&mut GraphNode> {
        let id = NodeId::note(nid);
        if !self.nodes.contains_key(&id) {
            let Some(note) = provider.get_note(nid) else {
                self.diag.skipped_notes += 1;
                return None;
            };
            let nt_settings = self.cfg.note_type(note.mid);
            let label_source = if nt_settings.label_field.is_empty() {
                note.fields.first().map(|(_, v)| v.as_str()).unwrap_or("")
            } else {
                note.field(&nt_settings.label_field).unwrap_or("")
            };
            let label = text::collapse_ws(&text::strip_html(label_source));

            let mut node = GraphNode::new(id.clone(), NodeKind::Note, label);
            node.note_type_id = Some(note.mid);
            node.note_type = provider.note_type(note.mid).map(|nt| nt.name);
            node.extra = nt_settings
                .tooltip_fields
                .iter()
                .filter_map(|f| {
                    note.field(f)
                        .map(|v| (f.clone(), text::collapse_ws(&text::strip_html(v))))
                })
                .collect();
            node.cards = note
                .cards
                .iter()
                .map(|c| CardInfo {
                    id: c.id,
                    suspended: c.suspended,
                    buried: c.buried,
                })
                .collect();
            self.nodes.insert(id.clone(), node);
        }
        self.nodes.get_mut(&id)
    }

    pub fn ensure_hub(&mut self, id: NodeId, kind: NodeKind, label: &str) -> &mut GraphNode {
        self.nodes
            .entry(id.clone())
            .or_insert_with(|| GraphNode::new(id, kind, label))
    }

    /// Push an edge, refusing self-loops and duplicate visible edges for the
    /// same (source, target, layer, manual) tuple. Flow-only twins bypass the
    /// dedup set; they never count as visible.
    pub fn push_edge(&mut self, edge: GraphEdge) {
        if edge.source == edge.target {
            return;
        }
        if edge.flow_only {
            self.edges.push(edge);
            return;
        }
        if self.visible_keys.insert(edge.key()) {
            self.edges.push(edge);
        }
    }

    pub fn has_visible(&self, key: &EdgeKey) -> bool {
        self.visible_keys.contains(key)
    }
}

/// Full build. A missing provider yields an empty payload tagged with
/// `missing_tools_config`.
pub fn build_graph(
    provider: Option<&dyn NoteProvider>,
    cfg: &GraphConfig,
    rev: u64,
) -> GraphPayload {
    let Some(provider) = provider else {
        let mut meta = meta_for(cfg, rev, Diagnostics::default());
        meta.error = Some(ERR_MISSING_TOOLS.to_string());
        return GraphPayload {
            nodes: Vec::new(),
            edges: Vec::new(),
            meta,
        };
    };
    build_scoped(provider, cfg, rev, None)
}

/// Build restricted to a note-id scope; the slicer uses this to rebuild the
/// neighborhood of a change set.
pub fn build_scoped(
    provider: &dyn NoteProvider,
    cfg: &GraphConfig,
    rev: u64,
    scope: Option<HashSet<i64>>,
) -> GraphPayload {
    let mut ctx = BuildCtx::new(cfg, scope);
    ctx.diag.recursive_slice =
        ctx.scope.is_some() && cfg.engine_val("slice_recursion") >= 1.0;

    family::run(&mut ctx, provider);
    example::run(&mut ctx, provider);
    kanji::run(&mut ctx, provider);
    linker::run(&mut ctx, provider);

    let edges = collapse::collapse_references(std::mem::take(&mut ctx.edges));

    let mut nodes = ctx.nodes;
    for edge in &edges {
        for endpoint in [&edge.source, &edge.target] {
            if let Some(node) = nodes.get_mut(endpoint) {
                node.record_layer(edge.layer);
            }
        }
    }

    if !cfg.show_unlinked {
        let mut linked: HashSet<NodeId> = HashSet::new();
        for edge in &edges {
            linked.insert(edge.source.clone());
            linked.insert(edge.target.clone());
        }
        nodes.retain(|id, _| linked.contains(id));
    }

    let meta = meta_for(cfg, rev, ctx.diag);
    GraphPayload {
        nodes: nodes.into_values().collect(),
        edges,
        meta,
    }
}

pub(crate) fn meta_for(cfg: &GraphConfig, rev: u64, diagnostics: Diagnostics) -> GraphMeta {
    GraphMeta {
        layers: Layer::ALL
            .into_iter()
            .filter(|l| cfg.layer(*l).enabled)
            .collect(),
        layer_settings: cfg.layers.clone(),
        decks: cfg.decks.clone(),
        rev,
        chain_mode: cfg.family_chain,
        diagnostics,
        error: None,
        settings: cfg.view_settings(),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::provider::fixtures::{note, note_type};
    use crate::provider::MemProvider;

    pub const VOCAB_MID: i64 = 100;

    /// Provider with notes A/B/C carrying a family field, per the seed
    /// scenarios: A "家@0;", B "家@1", C "家@1".
    pub fn family_provider() -> MemProvider {
        let mk = |id: i64, fam: &str| {
            note(
                id,
                VOCAB_MID,
                "JP::Vocab",
                &[("Expression", &format!("word{id}")), ("Families", fam)],
            )
        };
        MemProvider::new(
            vec![note_type(VOCAB_MID, "Vocab", &["Expression", "Families"])],
            vec![mk(1, "家@0;"), mk(2, "家@1"), mk(3, "家@1")],
        )
    }

    pub fn family_cfg() -> GraphConfig {
        let mut cfg = GraphConfig::default();
        cfg.family_gate.note_types = vec![VOCAB_MID];
        cfg.note_types.insert(
            VOCAB_MID.to_string(),
            crate::config::NoteTypeSettings {
                label_field: "Expression".to_string(),
                ..Default::default()
            },
        );
        cfg.normalize();
        cfg
    }

    pub fn edge_set(payload: &GraphPayload) -> Vec<(String, String, Layer, bool)> {
        payload
            .edges
            .iter()
            .map(|e| {
                (
                    e.source.0.clone(),
                    e.target.0.clone(),
                    e.layer,
                    e.flow_only,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    #[test]
    fn empty_collection_builds_empty_payload_without_error() {
        let provider = crate::provider::MemProvider::default();
        let payload = build_graph(Some(&provider), &family_cfg(), 1);
        assert!(payload.nodes.is_empty());
        assert!(payload.edges.is_empty());
        assert!(payload.meta.error.is_none());
        assert_eq!(payload.meta.rev, 1);
    }

    #[test]
    fn missing_provider_reports_missing_tools_config() {
        let payload = build_graph(None, &family_cfg(), 7);
        assert!(payload.nodes.is_empty());
        assert_eq!(payload.meta.error.as_deref(), Some(ERR_MISSING_TOOLS));
    }

    #[test]
    fn edge_endpoints_always_resolve_and_ids_are_unique() {
        let provider = family_provider();
        let payload = build_graph(Some(&provider), &family_cfg(), 1);
        let ids: Vec<_> = payload.nodes.iter().map(|n| &n.id).collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
        for e in &payload.edges {
            assert!(ids.contains(&&e.source), "dangling source {:?}", e.source);
            assert!(ids.contains(&&e.target), "dangling target {:?}", e.target);
            assert_ne!(e.source, e.target, "self loop");
        }
    }

    #[test]
    fn every_edge_layer_is_recorded_on_its_endpoints() {
        let provider = family_provider();
        let payload = build_graph(Some(&provider), &family_cfg(), 1);
        let by_id: BTreeMap<_, _> = payload.nodes.iter().map(|n| (&n.id, n)).collect();
        for e in &payload.edges {
            assert!(by_id[&e.source].layers.contains(&e.layer));
            assert!(by_id[&e.target].layers.contains(&e.layer));
        }
    }
}
