use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod command;
pub mod hooks;

pub use command::{Command, CommandError, CtxAction, CtxPayload, EmbedEditorCmd, LogLevel};
pub use hooks::{escape_script, hook_payload, script_wrapper};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn note(nid: i64) -> Self {
        Self(nid.to_string())
    }

    pub fn family(fid: &str) -> Self {
        Self(format!("family:{fid}"))
    }

    pub fn kanji(ch: char) -> Self {
        Self(format!("kanji:{ch}"))
    }

    /// Note id behind this node, if it is a real note and not a synthetic hub.
    pub fn as_note(&self) -> Option<i64> {
        self.0.parse::<i64>().ok()
    }

    pub fn family_id(&self) -> Option<&str> {
        self.0.strip_prefix("family:")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Note,
    Family,
    KanjiHub,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Notes,
    Priority,
    Families,
    NoteLinks,
    Examples,
    Kanji,
    KanjiComponent,
}

impl Layer {
    pub const ALL: [Layer; 7] = [
        Layer::Notes,
        Layer::Priority,
        Layer::Families,
        Layer::NoteLinks,
        Layer::Examples,
        Layer::Kanji,
        Layer::KanjiComponent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Layer::Notes => "notes",
            Layer::Priority => "priority",
            Layer::Families => "families",
            Layer::NoteLinks => "note_links",
            Layer::Examples => "examples",
            Layer::Kanji => "kanji",
            Layer::KanjiComponent => "kanji_component",
        }
    }

    /// Resolve a wire name, accepting the legacy layer names that older
    /// configs and clients still emit.
    pub fn from_wire(s: &str) -> Option<Layer> {
        match s {
            "notes" => Some(Layer::Notes),
            "priority" | "family" => Some(Layer::Priority),
            "families" => Some(Layer::Families),
            "note_links" | "reference" => Some(Layer::NoteLinks),
            "examples" | "example" => Some(Layer::Examples),
            "kanji" => Some(Layer::Kanji),
            "kanji_component" => Some(Layer::KanjiComponent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
    Curved,
}

impl EdgeStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeStyle::Solid => "solid",
            EdgeStyle::Dashed => "dashed",
            EdgeStyle::Dotted => "dotted",
            EdgeStyle::Curved => "curved",
        }
    }

    pub fn from_wire(s: &str) -> Option<EdgeStyle> {
        match s {
            "solid" => Some(EdgeStyle::Solid),
            "dashed" => Some(EdgeStyle::Dashed),
            "dotted" => Some(EdgeStyle::Dotted),
            "curved" => Some(EdgeStyle::Curved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    #[default]
    Manual,
    Metric,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    #[default]
    None,
    Ccm,
    Twohop,
    Jaccard,
    Overlap,
    CommonNeighbors,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    #[default]
    Undirected,
    Out,
    In,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct NeighborScale {
    pub mode: ScaleMode,
    pub direction: ScaleDirection,
    pub layer_weights: BTreeMap<Layer, f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayerSettings {
    pub color: String,
    pub enabled: bool,
    pub style: EdgeStyle,
    pub flow: bool,
    pub strength: f32,
    pub weight: f32,
    pub distance: f32,
    pub weight_mode: WeightMode,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            color: "#8899aa".to_string(),
            enabled: true,
            style: EdgeStyle::Solid,
            flow: false,
            strength: 1.0,
            weight: 1.0,
            distance: 60.0,
            weight_mode: WeightMode::Manual,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardInfo {
    pub id: i64,
    pub suspended: bool,
    pub buried: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(default)]
    pub note_type_id: Option<i64>,
    #[serde(default)]
    pub note_type: Option<String>,
    pub label: String,
    #[serde(default)]
    pub prio: Option<i64>,
    #[serde(default)]
    pub families: Vec<String>,
    #[serde(default)]
    pub extra: Vec<(String, String)>,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub cards: Vec<CardInfo>,
}

impl GraphNode {
    pub fn new(id: NodeId, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            note_type_id: None,
            note_type: None,
            label: label.into(),
            prio: None,
            families: Vec::new(),
            extra: Vec::new(),
            layers: Vec::new(),
            cards: Vec::new(),
        }
    }

    /// Layer membership is an append-only ordered list.
    pub fn record_layer(&mut self, layer: Layer) {
        if !self.layers.contains(&layer) {
            self.layers.push(layer);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EdgeMeta {
    pub label: Option<String>,
    pub stage: Option<String>,
    pub rank: Option<u32>,
    pub rule: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub source: NodeId,
    pub target: NodeId,
    pub layer: Layer,
    pub manual: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub layer: Layer,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub bidirectional: bool,
    #[serde(default)]
    pub flow_only: bool,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default)]
    pub same_prio: bool,
    #[serde(default)]
    pub meta: EdgeMeta,
}

fn default_weight() -> f32 {
    1.0
}

impl GraphEdge {
    pub fn new(source: NodeId, target: NodeId, layer: Layer) -> Self {
        Self {
            source,
            target,
            layer,
            manual: false,
            bidirectional: false,
            flow_only: false,
            weight: 1.0,
            same_prio: false,
            meta: EdgeMeta::default(),
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source.clone(),
            target: self.target.clone(),
            layer: self.layer,
            manual: self.manual,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Diagnostics {
    pub skipped_notes: u32,
    pub malformed_links: u32,
    pub malformed_families: u32,
    pub recursive_slice: bool,
}

/// Numeric tables and flags the viewer needs to parameterize solver and
/// renderer. Carried inside every full payload so config-only invalidations
/// reuse the same path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ViewSettings {
    pub solver: BTreeMap<String, f64>,
    pub renderer: BTreeMap<String, f64>,
    pub engine: BTreeMap<String, f64>,
    pub node: BTreeMap<String, f64>,
    pub neighbor_scale: NeighborScale,
    pub link_mst: bool,
    pub hub_damp: bool,
    pub ref_damp: bool,
    pub ref_auto: f32,
    pub same_prio_opacity: f32,
    pub show_unlinked: bool,
    pub card_dot_enabled: bool,
    pub card_dot_suspended: String,
    pub card_dot_buried: String,
    pub note_type_colors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GraphMeta {
    pub layers: Vec<Layer>,
    pub layer_settings: BTreeMap<Layer, LayerSettings>,
    pub decks: Vec<String>,
    pub rev: u64,
    pub chain_mode: bool,
    pub diagnostics: Diagnostics,
    pub error: Option<String>,
    pub settings: ViewSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GraphPayload {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub meta: GraphMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DeltaSlice {
    pub rev: u64,
    pub reason: String,
    pub nodes_raw: Vec<GraphNode>,
    pub edges_raw: Vec<GraphEdge>,
    pub removed_nodes: Vec<NodeId>,
    pub removed_edges: Vec<EdgeKey>,
}

impl GraphPayload {
    /// Structural half of the delta merge contract: remove listed edges,
    /// remove listed nodes only while nothing still references them, then
    /// upsert nodes and add edges. Callers owning positional state (the
    /// renderer) layer position preservation on top.
    pub fn apply_slice(&mut self, slice: &DeltaSlice) {
        let removed: std::collections::HashSet<&EdgeKey> = slice.removed_edges.iter().collect();
        self.edges.retain(|e| !removed.contains(&e.key()));

        let mut referenced: std::collections::HashSet<&NodeId> = std::collections::HashSet::new();
        for e in &self.edges {
            referenced.insert(&e.source);
            referenced.insert(&e.target);
        }
        let droppable: Vec<NodeId> = slice
            .removed_nodes
            .iter()
            .filter(|id| !referenced.contains(id))
            .cloned()
            .collect();
        self.nodes.retain(|n| !droppable.contains(&n.id));

        for fresh in &slice.nodes_raw {
            match self.nodes.iter_mut().find(|n| n.id == fresh.id) {
                Some(existing) => *existing = fresh.clone(),
                None => self.nodes.push(fresh.clone()),
            }
        }

        // Upsert: a re-emitted edge may change weight or direction flags.
        for edge in &slice.edges_raw {
            let key = edge.key();
            match self
                .edges
                .iter_mut()
                .find(|e| e.key() == key && e.flow_only == edge.flow_only)
            {
                Some(existing) => *existing = edge.clone(),
                None => self.edges.push(edge.clone()),
            }
        }
        self.meta.rev = slice.rev;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepTreeNode {
    pub id: NodeId,
    pub label: String,
    pub depth: u32,
    #[serde(default)]
    pub parent: Option<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepTreePayload {
    pub root: NodeId,
    pub nodes: Vec<DepTreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RenamePreview {
    pub ok: bool,
    pub scanned_notes: u32,
    pub affected_notes: u32,
    pub collisions: u32,
    pub changed_notes: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RenameApply {
    pub ok: bool,
    pub changed_notes: u32,
    pub changed_nids: Vec<i64>,
    pub error: Option<String>,
}

/// Well-known callback hooks the host invokes on the UI side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    GraphInit,
    GraphUpdate,
    GraphDelta,
    DepTree,
    FamilyEditPreview,
    FamilyEditApply,
}

impl Hook {
    pub fn as_str(self) -> &'static str {
        match self {
            Hook::GraphInit => "ajpcGraphInit",
            Hook::GraphUpdate => "ajpcGraphUpdate",
            Hook::GraphDelta => "ajpcGraphDelta",
            Hook::DepTree => "setActiveDepTreeFromPy",
            Hook::FamilyEditPreview => "onCtxFamilyEditPreviewResult",
            Hook::FamilyEditApply => "onCtxFamilyEditApplyResult",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Msg {
    Hello { version: String },
    RequestGraph,
    Command { line: String },
    Hook { hook: Hook, payload: String },
    Ping,
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_note_roundtrip() {
        let id = NodeId::note(1414);
        assert_eq!(id.as_note(), Some(1414));
        assert_eq!(NodeId::family("家").as_note(), None);
        assert_eq!(NodeId::family("家").family_id(), Some("家"));
    }

    #[test]
    fn layer_wire_names_accept_legacy() {
        assert_eq!(Layer::from_wire("priority"), Some(Layer::Priority));
        assert_eq!(Layer::from_wire("family"), Some(Layer::Priority));
        assert_eq!(Layer::from_wire("reference"), Some(Layer::NoteLinks));
        assert_eq!(Layer::from_wire("example"), Some(Layer::Examples));
        assert_eq!(Layer::from_wire("bogus"), None);
        for layer in Layer::ALL {
            assert_eq!(Layer::from_wire(layer.as_str()), Some(layer));
        }
    }

    #[test]
    fn record_layer_is_append_only() {
        let mut n = GraphNode::new(NodeId::note(1), NodeKind::Note, "n");
        n.record_layer(Layer::Families);
        n.record_layer(Layer::Notes);
        n.record_layer(Layer::Families);
        assert_eq!(n.layers, vec![Layer::Families, Layer::Notes]);
    }

    #[test]
    fn apply_slice_respects_removal_and_reference_rules() {
        let n = |id: i64| GraphNode::new(NodeId::note(id), NodeKind::Note, format!("n{id}"));
        let mut payload = GraphPayload {
            nodes: vec![n(1), n(2), n(3)],
            edges: vec![
                GraphEdge::new(NodeId::note(1), NodeId::note(2), Layer::Priority),
                GraphEdge::new(NodeId::note(2), NodeId::note(3), Layer::Priority),
            ],
            meta: GraphMeta::default(),
        };

        let slice = DeltaSlice {
            rev: 2,
            reason: "note_text".to_string(),
            nodes_raw: vec![n(4)],
            edges_raw: vec![GraphEdge::new(NodeId::note(2), NodeId::note(4), Layer::Priority)],
            removed_nodes: vec![NodeId::note(1), NodeId::note(2)],
            removed_edges: vec![GraphEdge::new(NodeId::note(1), NodeId::note(2), Layer::Priority).key()],
        };
        payload.apply_slice(&slice);

        let ids: Vec<_> = payload.nodes.iter().map(|n| n.id.0.clone()).collect();
        // Node 1 lost its last edge and goes; node 2 is still referenced.
        assert!(!ids.contains(&"1".to_string()));
        assert!(ids.contains(&"2".to_string()));
        assert!(ids.contains(&"4".to_string()));
        assert_eq!(payload.edges.len(), 2);
        assert_eq!(payload.meta.rev, 2);
    }

    #[test]
    fn msg_roundtrips_through_json() {
        let msg = Msg::Hook {
            hook: Hook::GraphDelta,
            payload: "{\"rev\":3}".to_string(),
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let back: Msg = serde_json::from_slice(&bytes).unwrap();
        match back {
            Msg::Hook { hook, payload } => {
                assert_eq!(hook, Hook::GraphDelta);
                assert_eq!(payload, "{\"rev\":3}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
