use bevy::prelude::{Resource, Vec3};
use notegraph_core::{
    DeltaSlice, DepTreePayload, GraphPayload, Hook, Layer, LayerSettings, NodeId, NodeKind,
    RenameApply, RenamePreview,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::graph::metrics::effective_weights;
use crate::graph::model::GraphIndex;
use crate::graph::mst::non_tree_edges;
use crate::net::{Incoming, IncomingKind};

#[derive(Default)]
pub struct SpatialState {
    pub positions: HashMap<NodeId, Vec3>,
    pub velocities: HashMap<NodeId, Vec3>,
    pub accels: HashMap<NodeId, Vec3>,
    pub anchors: HashMap<NodeId, Vec3>,
    /// Per-node local alpha raised by delta reheat, decaying independently
    /// of the global clock.
    pub heat: HashMap<NodeId, f32>,
    /// Sorted node ids; every integration loop walks this, never a map.
    pub order: Vec<NodeId>,
    pub dirty_layout: bool,
}

pub struct SolverClock {
    pub alpha: f32,
    pub warmup_left: u32,
    pub cooldown_left: u32,
    pub cooldown_deadline: Option<Instant>,
    pub idle: bool,
}

impl Default for SolverClock {
    fn default() -> Self {
        Self {
            alpha: 0.0,
            warmup_left: 0,
            cooldown_left: 0,
            cooldown_deadline: None,
            idle: true,
        }
    }
}

impl SolverClock {
    pub fn reheat(&mut self, alpha: f32, warmup: u32, cooldown: u32, cooldown_secs: f64) {
        self.alpha = self.alpha.max(alpha);
        self.warmup_left = warmup;
        self.cooldown_left = cooldown;
        self.cooldown_deadline =
            Some(Instant::now() + std::time::Duration::from_secs_f64(cooldown_secs.max(1.0)));
        self.idle = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CtxTarget {
    Node(NodeId),
    Edge(usize),
    Background,
}

#[derive(Debug, Clone)]
pub struct CtxMenu {
    pub screen: (f32, f32),
    pub target: CtxTarget,
}

#[derive(Debug, Clone, Default)]
pub struct FameditDialog {
    pub open: bool,
    pub old_fid: String,
    pub new_fid: String,
    pub preview: Option<RenamePreview>,
    pub result: Option<RenameApply>,
}

#[derive(Default)]
pub struct UiState {
    pub filter: String,

    pub hovered: Option<NodeId>,
    pub hover_since: Option<Instant>,
    pub selected: Option<NodeId>,
    pub dragging: Option<NodeId>,

    pub search_open: bool,
    pub search_query: String,
    pub search_hits: Vec<NodeId>,
    pub jump_to: Option<NodeId>,
    pub fit_to_view: bool,

    pub help_open: bool,
    pub hud_open: bool,

    pub ctx_menu: Option<CtxMenu>,
    pub famedit: FameditDialog,

    pub deptree: Option<DepTreePayload>,
    pub deptree_open: bool,

    pub editor_open: bool,
    pub editor_note: Option<NodeId>,
}

#[derive(Default)]
pub struct PerfState {
    pub fps: f32,
    pub msg_total: u64,
    pub decode_errors: u32,
    pub stale_deltas: u32,
}

#[derive(Resource, Default)]
pub struct GraphState {
    pub graph: GraphPayload,
    pub index: GraphIndex,
    /// Effective per-edge weights, aligned with `graph.edges`.
    pub weights: Vec<f32>,
    /// Visible edges outside their layer's maximum spanning forest.
    pub non_tree: HashSet<usize>,

    pub spatial: SpatialState,
    pub clock: SolverClock,
    pub ui: UiState,
    pub perf: PerfState,

    pub flow_phase: f32,
    pub connected: bool,
    pub conn_error: Option<String>,

    pub needs_redraw: AtomicBool,
}

impl GraphState {
    // ---- settings accessors ----

    pub fn sv(&self, key: &str, default: f64) -> f32 {
        self.graph
            .meta
            .settings
            .solver
            .get(key)
            .copied()
            .unwrap_or(default) as f32
    }

    pub fn rv(&self, key: &str, default: f64) -> f32 {
        self.graph
            .meta
            .settings
            .renderer
            .get(key)
            .copied()
            .unwrap_or(default) as f32
    }

    pub fn ev(&self, key: &str, default: f64) -> f32 {
        self.graph
            .meta
            .settings
            .engine
            .get(key)
            .copied()
            .unwrap_or(default) as f32
    }

    pub fn nv(&self, key: &str, default: f64) -> f32 {
        self.graph
            .meta
            .settings
            .node
            .get(key)
            .copied()
            .unwrap_or(default) as f32
    }

    pub fn layer_settings(&self, layer: Layer) -> LayerSettings {
        self.graph
            .meta
            .layer_settings
            .get(&layer)
            .cloned()
            .unwrap_or_default()
    }

    pub fn layer_enabled(&self, layer: Layer) -> bool {
        self.graph
            .meta
            .layer_settings
            .get(&layer)
            .map(|ls| ls.enabled)
            .unwrap_or(true)
    }

    pub fn node(&self, id: &NodeId) -> Option<&notegraph_core::GraphNode> {
        self.index.node_of.get(id).map(|i| &self.graph.nodes[*i])
    }

    pub fn mark_redraw(&self) {
        self.needs_redraw.store(true, Ordering::Relaxed);
    }

    // ---- incoming traffic ----

    pub fn apply(&mut self, inc: Incoming) {
        self.perf.msg_total += 1;
        let Incoming { stream, kind } = inc;
        match kind {
            IncomingKind::Connected => {
                self.connected = true;
                self.conn_error = None;
            }
            IncomingKind::Disconnected => {
                self.connected = false;
            }
            IncomingKind::Error(e) => {
                self.conn_error = Some(format!("{stream}: {e}"));
            }
            IncomingKind::Hook { hook, payload } => self.apply_hook(hook, &payload),
        }
        self.mark_redraw();
    }

    fn apply_hook(&mut self, hook: Hook, payload: &str) {
        match hook {
            Hook::GraphInit => match serde_json::from_str::<GraphPayload>(payload) {
                Ok(p) => self.install_full(p, 1.0),
                Err(_) => self.perf.decode_errors += 1,
            },
            Hook::GraphUpdate => match serde_json::from_str::<GraphPayload>(payload) {
                Ok(p) => {
                    let reheat = self.sv("alpha_reheat", 0.3);
                    self.install_full(p, reheat);
                }
                Err(_) => self.perf.decode_errors += 1,
            },
            Hook::GraphDelta => match serde_json::from_str::<DeltaSlice>(payload) {
                Ok(slice) => self.merge_slice(slice),
                Err(_) => self.perf.decode_errors += 1,
            },
            Hook::DepTree => match serde_json::from_str::<DepTreePayload>(payload) {
                Ok(tree) => {
                    self.ui.deptree = Some(tree);
                    self.ui.deptree_open = true;
                }
                Err(_) => self.perf.decode_errors += 1,
            },
            Hook::FamilyEditPreview => match serde_json::from_str::<RenamePreview>(payload) {
                Ok(p) => self.ui.famedit.preview = Some(p),
                Err(_) => self.perf.decode_errors += 1,
            },
            Hook::FamilyEditApply => match serde_json::from_str::<RenameApply>(payload) {
                Ok(r) => self.ui.famedit.result = Some(r),
                Err(_) => self.perf.decode_errors += 1,
            },
        }
    }

    /// Full install: topology is replaced wholesale, but solver state for
    /// surviving ids is kept so config changes do not scramble the layout.
    pub fn install_full(&mut self, payload: GraphPayload, reheat_alpha: f32) {
        self.graph = payload;
        self.rebuild_caches();
        self.prune_spatial();
        self.spatial.dirty_layout = true;
        let (warmup, cooldown, secs) = self.clock_params();
        self.clock.reheat(reheat_alpha, warmup, cooldown, secs);
        self.validate_selection();
    }

    /// Delta merge contract: stale revisions are dropped; positions of
    /// surviving nodes are preserved bit-for-bit; only the changed
    /// neighborhood is reheated.
    pub fn merge_slice(&mut self, slice: DeltaSlice) {
        if slice.rev <= self.graph.meta.rev {
            self.perf.stale_deltas += 1;
            return;
        }
        let mut touched: Vec<NodeId> = slice.nodes_raw.iter().map(|n| n.id.clone()).collect();
        touched.extend(slice.removed_nodes.iter().cloned());

        self.graph.apply_slice(&slice);
        self.rebuild_caches();
        self.prune_spatial();
        self.spatial.dirty_layout = true;

        self.reheat_neighborhood(&touched);
        self.validate_selection();
    }

    fn clock_params(&self) -> (u32, u32, f64) {
        (
            self.sv("warmup_ticks", 30.0) as u32,
            self.sv("cooldown_ticks", 1500.0) as u32,
            self.sv("cooldown_secs", 30.0) as f64,
        )
    }

    fn rebuild_caches(&mut self) {
        self.index = GraphIndex::build(&self.graph);
        self.weights = effective_weights(&self.graph, &self.index);
        self.non_tree = if self.graph.meta.settings.link_mst {
            non_tree_edges(&self.graph, &self.weights)
        } else {
            HashSet::new()
        };
    }

    fn prune_spatial(&mut self) {
        let alive: HashSet<&NodeId> = self.graph.nodes.iter().map(|n| &n.id).collect();
        self.spatial.positions.retain(|id, _| alive.contains(id));
        self.spatial.velocities.retain(|id, _| alive.contains(id));
        self.spatial.accels.retain(|id, _| alive.contains(id));
        self.spatial.anchors.retain(|id, _| alive.contains(id));
        self.spatial.heat.retain(|id, _| alive.contains(id));
        self.spatial.order = self.graph.nodes.iter().map(|n| n.id.clone()).collect();
        self.spatial.order.sort();
    }

    /// Raise local alpha for nodes within a small BFS radius of the change;
    /// the rest of the graph keeps its decayed state.
    fn reheat_neighborhood(&mut self, seeds: &[NodeId]) {
        let radius = self.sv("reheat_radius", 2.0) as u32;
        let alpha = self.sv("alpha_reheat", 0.3);
        let mut frontier: VecDeque<(NodeId, u32)> = VecDeque::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        for seed in seeds {
            if seen.insert(seed.clone()) {
                frontier.push_back((seed.clone(), 0));
            }
        }
        while let Some((id, depth)) = frontier.pop_front() {
            self.spatial.heat.insert(id.clone(), alpha);
            if depth >= radius {
                continue;
            }
            for nb in self.index.neighbors(&self.graph, &id) {
                if seen.insert(nb.clone()) {
                    frontier.push_back((nb, depth + 1));
                }
            }
        }
        self.clock.idle = false;
    }

    fn validate_selection(&mut self) {
        let alive: HashSet<&NodeId> = self.graph.nodes.iter().map(|n| &n.id).collect();
        for slot in [
            &mut self.ui.hovered,
            &mut self.ui.selected,
            &mut self.ui.dragging,
            &mut self.ui.editor_note,
        ] {
            if slot.as_ref().is_some_and(|id| !alive.contains(id)) {
                *slot = None;
            }
        }
    }

    // ---- search ----

    pub fn recompute_search_hits(&mut self, limit: usize) {
        self.ui.search_hits.clear();
        let q = self.ui.search_query.trim().to_lowercase();
        if q.is_empty() {
            return;
        }
        let mut hits: Vec<NodeId> = self
            .graph
            .nodes
            .iter()
            .filter(|n| {
                n.id.0.to_lowercase().contains(&q)
                    || n.label.to_lowercase().contains(&q)
                    || n.extra.iter().any(|(_, v)| v.to_lowercase().contains(&q))
            })
            .map(|n| n.id.clone())
            .collect();
        hits.sort();
        hits.truncate(limit.max(1));
        self.ui.search_hits = hits;
    }

    pub fn request_jump(&mut self, id: NodeId) {
        self.ui.jump_to = Some(id);
    }

    // ---- tooltip ----

    pub fn node_tooltip_lines(&self, id: &NodeId) -> Vec<String> {
        let Some(n) = self.node(id) else {
            return vec![id.0.clone()];
        };
        let mut out = Vec::new();
        match n.kind {
            NodeKind::Family => out.push(format!("family {}", n.label)),
            NodeKind::KanjiHub => out.push(format!("kanji {}", n.label)),
            NodeKind::Note => {
                out.push(n.label.clone());
                if let Some(nt) = &n.note_type {
                    out.push(format!("type: {nt}"));
                }
            }
        }
        if let Some(prio) = n.prio {
            out.push(format!("priority: {prio}"));
        }
        if !n.families.is_empty() {
            out.push(format!("families: {}", n.families.join(", ")));
        }
        out.push(format!("links: {}", self.index.degree(&self.graph, id)));
        for (name, value) in &n.extra {
            out.push(format!("{name}: {value}"));
        }
        out
    }

    pub fn passes_filter(&self, id: &NodeId) -> bool {
        if self.ui.filter.trim().is_empty() {
            return true;
        }
        let f = self.ui.filter.to_lowercase();
        let Some(n) = self.node(id) else {
            return false;
        };
        n.id.0.to_lowercase().contains(&f) || n.label.to_lowercase().contains(&f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::{GraphEdge, GraphMeta, GraphNode};

    fn payload(rev: u64, ids: &[i64], edges: &[(i64, i64)]) -> GraphPayload {
        GraphPayload {
            nodes: ids
                .iter()
                .map(|id| GraphNode::new(NodeId::note(*id), NodeKind::Note, format!("n{id}")))
                .collect(),
            edges: edges
                .iter()
                .map(|(a, b)| GraphEdge::new(NodeId::note(*a), NodeId::note(*b), Layer::Priority))
                .collect(),
            meta: GraphMeta {
                rev,
                ..GraphMeta::default()
            },
        }
    }

    #[test]
    fn delta_merge_preserves_untouched_positions_bit_for_bit() {
        let mut st = GraphState::default();
        st.install_full(payload(1, &[1, 2, 3], &[(1, 2), (2, 3)]), 1.0);
        st.spatial
            .positions
            .insert(NodeId::note(3), Vec3::new(1.25, 0.0, -7.5));
        st.spatial
            .positions
            .insert(NodeId::note(1), Vec3::new(-3.0, 0.0, 4.0));

        let slice = DeltaSlice {
            rev: 2,
            reason: "note_text".to_string(),
            nodes_raw: vec![GraphNode::new(NodeId::note(4), NodeKind::Note, "n4")],
            edges_raw: vec![GraphEdge::new(
                NodeId::note(1),
                NodeId::note(4),
                Layer::Priority,
            )],
            removed_nodes: vec![],
            removed_edges: vec![],
        };
        st.merge_slice(slice);

        assert_eq!(
            st.spatial.positions[&NodeId::note(3)],
            Vec3::new(1.25, 0.0, -7.5)
        );
        assert_eq!(
            st.spatial.positions[&NodeId::note(1)],
            Vec3::new(-3.0, 0.0, 4.0)
        );
        assert_eq!(st.graph.meta.rev, 2);
        assert!(st.node(&NodeId::note(4)).is_some());
    }

    #[test]
    fn stale_delta_is_discarded() {
        let mut st = GraphState::default();
        st.install_full(payload(5, &[1], &[]), 1.0);
        let slice = DeltaSlice {
            rev: 4,
            nodes_raw: vec![GraphNode::new(NodeId::note(9), NodeKind::Note, "n9")],
            ..DeltaSlice::default()
        };
        st.merge_slice(slice);
        assert!(st.node(&NodeId::note(9)).is_none());
        assert_eq!(st.perf.stale_deltas, 1);
        assert_eq!(st.graph.meta.rev, 5);
    }

    #[test]
    fn reheat_is_local_to_the_changed_neighborhood() {
        let mut st = GraphState::default();
        st.install_full(payload(1, &[1, 2, 3, 4, 5], &[(1, 2), (2, 3), (4, 5)]), 1.0);
        st.spatial.heat.clear();

        let slice = DeltaSlice {
            rev: 2,
            nodes_raw: vec![GraphNode::new(NodeId::note(1), NodeKind::Note, "n1")],
            ..DeltaSlice::default()
        };
        st.merge_slice(slice);

        assert!(st.spatial.heat.contains_key(&NodeId::note(1)));
        assert!(st.spatial.heat.contains_key(&NodeId::note(2)));
        assert!(st.spatial.heat.contains_key(&NodeId::note(3)));
        // The disconnected component stays cold.
        assert!(!st.spatial.heat.contains_key(&NodeId::note(4)));
        assert!(!st.spatial.heat.contains_key(&NodeId::note(5)));
    }

    #[test]
    fn removed_node_drops_its_solver_state_and_selection() {
        let mut st = GraphState::default();
        st.install_full(payload(1, &[1, 2, 3], &[(1, 2), (2, 3)]), 1.0);
        st.spatial.positions.insert(NodeId::note(1), Vec3::ZERO);
        st.ui.selected = Some(NodeId::note(1));

        let slice = DeltaSlice {
            rev: 2,
            removed_nodes: vec![NodeId::note(1)],
            removed_edges: vec![GraphEdge::new(
                NodeId::note(1),
                NodeId::note(2),
                Layer::Priority,
            )
            .key()],
            ..DeltaSlice::default()
        };
        st.merge_slice(slice);

        assert!(st.node(&NodeId::note(1)).is_none());
        assert!(!st.spatial.positions.contains_key(&NodeId::note(1)));
        assert_eq!(st.ui.selected, None);
    }

    #[test]
    fn search_hits_are_sorted_and_capped() {
        let mut st = GraphState::default();
        st.install_full(payload(1, &[10, 11, 12], &[(10, 11), (11, 12)]), 1.0);
        st.ui.search_query = "n1".to_string();
        st.recompute_search_hits(2);
        assert_eq!(
            st.ui.search_hits,
            vec![NodeId::note(10), NodeId::note(11)]
        );
    }
}
