//! Normalized configuration record and its on-disk store.
//!
//! Loading fills defaults, migrates legacy layer names, drops unknown keys in
//! the fixed-schema numeric tables, coerces truthy strings and clamps
//! numerics. Saving is write-through and best-effort: a failed save is logged
//! and never surfaces to callers.

use notegraph_core::{
    command::CardDotState, Command, EdgeStyle, Layer, LayerSettings, NeighborScale, ViewSettings,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Which part of the pipeline a config mutation invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidate {
    None,
    Renderer,
    Solver,
    Assembler,
}

pub type NumKey = (&'static str, f64, f64, f64);

pub const SOLVER_KEYS: &[NumKey] = &[
    ("alpha", 0.0, 1.0, 1.0),
    ("alpha_min", 0.0001, 0.5, 0.001),
    ("alpha_decay", 0.0, 0.5, 0.0228),
    ("alpha_reheat", 0.0, 1.0, 0.3),
    ("velocity_decay", 0.0, 1.0, 0.4),
    ("warmup_ticks", 0.0, 1000.0, 30.0),
    ("cooldown_ticks", 0.0, 100_000.0, 1500.0),
    ("cooldown_secs", 0.0, 600.0, 30.0),
    ("center_strength", 0.0, 1.0, 0.03),
    ("center_x", -5000.0, 5000.0, 0.0),
    ("center_y", -5000.0, 5000.0, 0.0),
    ("charge_strength", -1000.0, 0.0, -120.0),
    ("charge_theta", 0.0, 2.0, 0.9),
    ("charge_distance_min", 0.1, 100.0, 1.0),
    ("charge_distance_max", 1.0, 10_000.0, 800.0),
    ("soft_pin_radius", 0.0, 2000.0, 160.0),
    ("soft_pin_strength", 0.0, 1.0, 0.05),
    ("hub_damping", 0.0, 1.0, 0.55),
    ("ref_damping", 0.0, 1.0, 0.5),
    ("mst_attenuation", 0.0, 1.0, 0.25),
    ("reheat_radius", 0.0, 8.0, 2.0),
];

pub const RENDERER_KEYS: &[NumKey] = &[
    ("zoom_min", 0.05, 1.0, 0.2),
    ("zoom_max", 1.0, 40.0, 8.0),
    ("label_zoom", 0.0, 10.0, 1.2),
    ("flow_speed", 0.0, 10.0, 1.0),
    ("flow_spacing", 1.0, 100.0, 14.0),
    ("flow_thickness", 0.1, 10.0, 1.6),
    ("transition_ms", 0.0, 5000.0, 450.0),
    ("hover_dwell_ms", 0.0, 2000.0, 180.0),
    ("selection_dim", 0.0, 1.0, 0.15),
    ("edge_opacity", 0.0, 1.0, 0.85),
];

pub const ENGINE_KEYS: &[NumKey] = &[
    ("max_visible_nodes", 100.0, 20_000.0, 4000.0),
    ("progressive_per_frame", 10.0, 5000.0, 300.0),
    ("refresh_debounce_ms", 0.0, 5000.0, 350.0),
    ("delta_debounce_ms", 0.0, 5000.0, 120.0),
    ("bulk_delta_cap", 1.0, 10_000.0, 250.0),
    ("slice_recursion", 0.0, 1.0, 0.0),
];

pub const NODE_KEYS: &[NumKey] = &[
    ("note_size", 1.0, 100.0, 14.0),
    ("hub_size", 1.0, 100.0, 18.0),
    ("kanji_size", 1.0, 100.0, 12.0),
    ("label_size", 4.0, 48.0, 12.0),
    ("dot_size", 0.5, 20.0, 3.0),
    ("glow_radius", 0.0, 50.0, 6.0),
];

fn layer_default(layer: Layer) -> LayerSettings {
    let mut s = LayerSettings::default();
    match layer {
        Layer::Notes => {
            s.color = "#5dade2".to_string();
            s.distance = 70.0;
        }
        Layer::Priority => {
            s.color = "#e74c3c".to_string();
            s.flow = true;
            s.distance = 55.0;
        }
        Layer::Families => {
            s.color = "#f39c12".to_string();
            s.distance = 45.0;
        }
        Layer::NoteLinks => {
            s.color = "#9b59b6".to_string();
            s.flow = true;
            s.distance = 90.0;
        }
        Layer::Examples => {
            s.color = "#2ecc71".to_string();
            s.style = EdgeStyle::Dotted;
            s.distance = 75.0;
        }
        Layer::Kanji => {
            s.color = "#e67e22".to_string();
            s.distance = 60.0;
        }
        Layer::KanjiComponent => {
            s.color = "#95a5a6".to_string();
            s.style = EdgeStyle::Dashed;
            s.distance = 50.0;
        }
    }
    s
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NoteTypeSettings {
    pub label_field: String,
    pub linked_field: Option<String>,
    pub tooltip_fields: Vec<String>,
    pub visible: bool,
    pub color: Option<String>,
}

impl Default for NoteTypeSettings {
    fn default() -> Self {
        Self {
            label_field: String::new(),
            linked_field: None,
            tooltip_fields: Vec::new(),
            visible: true,
            color: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FamilyGate {
    pub enabled: bool,
    pub note_types: Vec<i64>,
    pub field: String,
    pub separator: String,
    pub default_priority: i64,
}

impl Default for FamilyGate {
    fn default() -> Self {
        Self {
            enabled: true,
            note_types: Vec::new(),
            field: "Families".to_string(),
            separator: ";".to_string(),
            default_priority: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ExampleGate {
    pub enabled: bool,
    pub vocab_deck: String,
    pub vocab_field: String,
    pub example_deck: String,
    pub example_field: String,
    pub first_token: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KanjiGate {
    pub enabled: bool,
    pub kanji_note_types: Vec<i64>,
    pub kanji_field: String,
    pub component_field: String,
    pub vocab_note_types: Vec<i64>,
    pub vocab_field: String,
}

impl Default for KanjiGate {
    fn default() -> Self {
        Self {
            enabled: false,
            kanji_note_types: Vec::new(),
            kanji_field: "Kanji".to_string(),
            component_field: "Components".to_string(),
            vocab_note_types: Vec::new(),
            vocab_field: "Expression".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LinkerRule {
    pub note_type: i64,
    pub target_tag: String,
    pub template: Option<String>,
    pub label_field: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphConfig {
    pub layers: BTreeMap<Layer, LayerSettings>,
    pub note_types: BTreeMap<String, NoteTypeSettings>,
    pub solver: BTreeMap<String, f64>,
    pub renderer: BTreeMap<String, f64>,
    pub engine: BTreeMap<String, f64>,
    pub node: BTreeMap<String, f64>,
    pub neighbor_scale: NeighborScale,
    pub decks: Vec<String>,
    pub group_hubs: Vec<String>,
    pub family_gate: FamilyGate,
    pub example_gate: ExampleGate,
    pub kanji_gate: KanjiGate,
    pub linker_rules: Vec<LinkerRule>,
    pub link_mst: bool,
    pub hub_damp: bool,
    pub ref_damp: bool,
    pub ref_auto: f32,
    pub kanji_tfidf: bool,
    pub kanji_topk_enabled: bool,
    pub kanji_topk: u32,
    pub kanji_norm: bool,
    pub show_unlinked: bool,
    pub kanji_hubs: bool,
    pub kanji_components: bool,
    pub same_prio_edges: bool,
    pub same_prio_opacity: f32,
    pub family_chain: bool,
    pub card_dot_enabled: bool,
    pub card_dot_suspended: String,
    pub card_dot_buried: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        let mut cfg = Self {
            layers: BTreeMap::new(),
            note_types: BTreeMap::new(),
            solver: BTreeMap::new(),
            renderer: BTreeMap::new(),
            engine: BTreeMap::new(),
            node: BTreeMap::new(),
            neighbor_scale: NeighborScale::default(),
            decks: Vec::new(),
            group_hubs: Vec::new(),
            family_gate: FamilyGate::default(),
            example_gate: ExampleGate::default(),
            kanji_gate: KanjiGate::default(),
            linker_rules: Vec::new(),
            link_mst: false,
            hub_damp: true,
            ref_damp: false,
            ref_auto: 0.0,
            kanji_tfidf: false,
            kanji_topk_enabled: false,
            kanji_topk: 8,
            kanji_norm: false,
            show_unlinked: false,
            kanji_hubs: true,
            kanji_components: true,
            same_prio_edges: false,
            same_prio_opacity: 0.5,
            family_chain: false,
            card_dot_enabled: true,
            card_dot_suspended: "#f1c40f".to_string(),
            card_dot_buried: "#7f8c8d".to_string(),
        };
        cfg.normalize();
        cfg
    }
}

fn fill_table(table: &mut BTreeMap<String, f64>, keys: &[NumKey]) {
    table.retain(|k, _| keys.iter().any(|(name, ..)| name == k));
    for (name, min, max, default) in keys {
        let v = table.entry((*name).to_string()).or_insert(*default);
        *v = v.clamp(*min, *max);
        if !v.is_finite() {
            *v = *default;
        }
    }
}

fn dedup_case_insensitive(items: &mut Vec<String>) {
    let mut seen: Vec<String> = Vec::new();
    items.retain(|item| {
        let folded = item.to_lowercase();
        if seen.contains(&folded) {
            false
        } else {
            seen.push(folded);
            true
        }
    });
}

impl GraphConfig {
    /// Fill defaults, clamp, dedup. Idempotent.
    pub fn normalize(&mut self) {
        for layer in Layer::ALL {
            self.layers.entry(layer).or_insert_with(|| layer_default(layer));
        }
        fill_table(&mut self.solver, SOLVER_KEYS);
        fill_table(&mut self.renderer, RENDERER_KEYS);
        fill_table(&mut self.engine, ENGINE_KEYS);
        fill_table(&mut self.node, NODE_KEYS);
        dedup_case_insensitive(&mut self.decks);
        dedup_case_insensitive(&mut self.group_hubs);
        self.kanji_topk = self.kanji_topk.clamp(1, 64);
        self.ref_auto = self.ref_auto.clamp(0.0, 1.0);
        self.same_prio_opacity = self.same_prio_opacity.clamp(0.0, 1.0);
        for s in self.layers.values_mut() {
            s.strength = s.strength.clamp(0.0, 10.0);
            s.weight = s.weight.clamp(0.0, 100.0);
            s.distance = s.distance.clamp(1.0, 2000.0);
        }
    }

    pub fn solver_val(&self, key: &str) -> f64 {
        lookup(&self.solver, SOLVER_KEYS, key)
    }

    pub fn engine_val(&self, key: &str) -> f64 {
        lookup(&self.engine, ENGINE_KEYS, key)
    }

    pub fn renderer_val(&self, key: &str) -> f64 {
        lookup(&self.renderer, RENDERER_KEYS, key)
    }

    pub fn layer(&self, layer: Layer) -> LayerSettings {
        self.layers
            .get(&layer)
            .cloned()
            .unwrap_or_else(|| layer_default(layer))
    }

    pub fn note_type_mut(&mut self, mid: i64) -> &mut NoteTypeSettings {
        self.note_types.entry(mid.to_string()).or_default()
    }

    pub fn note_type(&self, mid: i64) -> NoteTypeSettings {
        self.note_types
            .get(&mid.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// The solver/renderer view of this config, as shipped inside payloads.
    pub fn view_settings(&self) -> ViewSettings {
        ViewSettings {
            solver: self.solver.clone(),
            renderer: self.renderer.clone(),
            engine: self.engine.clone(),
            node: self.node.clone(),
            neighbor_scale: self.neighbor_scale.clone(),
            link_mst: self.link_mst,
            hub_damp: self.hub_damp,
            ref_damp: self.ref_damp,
            ref_auto: self.ref_auto,
            same_prio_opacity: self.same_prio_opacity,
            show_unlinked: self.show_unlinked,
            card_dot_enabled: self.card_dot_enabled,
            card_dot_suspended: self.card_dot_suspended.clone(),
            card_dot_buried: self.card_dot_buried.clone(),
            note_type_colors: self
                .note_types
                .iter()
                .filter_map(|(mid, nt)| nt.color.clone().map(|c| (mid.clone(), c)))
                .collect(),
        }
    }

    /// Apply a bridge command to the record; returns what it invalidates.
    /// Non-config commands return `Invalidate::None` untouched.
    pub fn apply(&mut self, cmd: &Command) -> Invalidate {
        use Command::*;
        let inv = match cmd {
            LayerColor { layer, color } => {
                self.layers.entry(*layer).or_insert_with(|| layer_default(*layer)).color =
                    color.clone();
                Invalidate::Renderer
            }
            LayerEnabled { layer, on } => {
                self.layers.entry(*layer).or_insert_with(|| layer_default(*layer)).enabled = *on;
                Invalidate::Assembler
            }
            LayerStyle { layer, style } => {
                self.layers.entry(*layer).or_insert_with(|| layer_default(*layer)).style = *style;
                Invalidate::Renderer
            }
            LayerFlow { layer, on } => {
                self.layers.entry(*layer).or_insert_with(|| layer_default(*layer)).flow = *on;
                Invalidate::Renderer
            }
            LayerStrength { layer, value } => {
                self.layers
                    .entry(*layer)
                    .or_insert_with(|| layer_default(*layer))
                    .strength = *value;
                Invalidate::Solver
            }
            LayerWeight { layer, value } => {
                self.layers
                    .entry(*layer)
                    .or_insert_with(|| layer_default(*layer))
                    .weight = *value;
                Invalidate::Solver
            }
            LayerDistance { layer, value } => {
                self.layers
                    .entry(*layer)
                    .or_insert_with(|| layer_default(*layer))
                    .distance = *value;
                Invalidate::Solver
            }
            SolverParam { key, value } => {
                self.solver.insert(key.clone(), *value);
                Invalidate::Solver
            }
            RendererParam { key, value } => {
                self.renderer.insert(key.clone(), *value);
                Invalidate::Renderer
            }
            EngineParam { key, value } => {
                self.engine.insert(key.clone(), *value);
                Invalidate::Renderer
            }
            NodeParam { key, value } => {
                self.node.insert(key.clone(), *value);
                Invalidate::Renderer
            }
            NoteTypeVisible { mid, on } => {
                self.note_type_mut(*mid).visible = *on;
                Invalidate::Assembler
            }
            NoteTypeLabelField { mid, field } => {
                self.note_type_mut(*mid).label_field = field.clone();
                Invalidate::Assembler
            }
            NoteTypeLinkedField { mid, field } => {
                self.note_type_mut(*mid).linked_field = if field.is_empty() {
                    None
                } else {
                    Some(field.clone())
                };
                Invalidate::Assembler
            }
            NoteTypeTooltipFields { mid, fields } => {
                self.note_type_mut(*mid).tooltip_fields = fields.clone();
                Invalidate::Assembler
            }
            NoteTypeColor { mid, color } => {
                self.note_type_mut(*mid).color = Some(color.clone());
                Invalidate::Renderer
            }
            RefAuto { value } => {
                self.ref_auto = *value;
                Invalidate::Solver
            }
            RefDamp { on } => {
                self.ref_damp = *on;
                Invalidate::Solver
            }
            LinkMst { on } => {
                self.link_mst = *on;
                Invalidate::Solver
            }
            HubDamp { on } => {
                self.hub_damp = *on;
                Invalidate::Solver
            }
            KanjiComponents { on } => {
                self.kanji_components = *on;
                Invalidate::Assembler
            }
            KanjiTfidf { on } => {
                self.kanji_tfidf = *on;
                Invalidate::Assembler
            }
            KanjiTopKEnabled { on } => {
                self.kanji_topk_enabled = *on;
                Invalidate::Assembler
            }
            KanjiTopK { k } => {
                self.kanji_topk = *k;
                Invalidate::Assembler
            }
            KanjiNorm { on } => {
                self.kanji_norm = *on;
                Invalidate::Assembler
            }
            ShowUnlinked { on } => {
                self.show_unlinked = *on;
                Invalidate::Assembler
            }
            SamePrioEdges { on } => {
                self.same_prio_edges = *on;
                Invalidate::Assembler
            }
            SamePrioOpacity { value } => {
                self.same_prio_opacity = *value;
                Invalidate::Renderer
            }
            FamilyChain { on } => {
                self.family_chain = *on;
                Invalidate::Assembler
            }
            CardDotEnabled { on } => {
                self.card_dot_enabled = *on;
                Invalidate::Renderer
            }
            CardDotColor { state, color } => {
                match state {
                    CardDotState::Suspended => self.card_dot_suspended = color.clone(),
                    CardDotState::Buried => self.card_dot_buried = color.clone(),
                }
                Invalidate::Renderer
            }
            Decks { decks } => {
                self.decks = decks.clone();
                Invalidate::Assembler
            }
            GroupHubs { hubs } => {
                self.group_hubs = hubs.clone();
                Invalidate::Assembler
            }
            NeighborScaleCfg { scale } => {
                self.neighbor_scale = scale.clone();
                Invalidate::Solver
            }
            Refresh | Devtools | Log { .. } | Ctx(_) | DepTree { .. } | EmbedEditor(_) => {
                return Invalidate::None
            }
        };
        self.normalize();
        inv
    }
}

fn lookup(table: &BTreeMap<String, f64>, keys: &[NumKey], key: &str) -> f64 {
    table.get(key).copied().unwrap_or_else(|| {
        keys.iter()
            .find(|(name, ..)| *name == key)
            .map(|(_, _, _, d)| *d)
            .unwrap_or(0.0)
    })
}

// ---- legacy migration ----

const LEGACY_SPLIT_MAPS: &[(&str, &str)] = &[
    ("layer_colors", "color"),
    ("layer_enabled", "enabled"),
    ("layer_styles", "style"),
    ("layer_flow", "flow"),
    ("link_strengths", "strength"),
    ("link_weights", "weight"),
    ("link_distances", "distance"),
    ("weight_modes", "weight_mode"),
];

const BOOL_FLAGS: &[&str] = &[
    "link_mst",
    "hub_damp",
    "ref_damp",
    "kanji_tfidf",
    "kanji_topk_enabled",
    "kanji_norm",
    "show_unlinked",
    "kanji_hubs",
    "kanji_components",
    "same_prio_edges",
    "family_chain",
    "card_dot_enabled",
];

fn coerce_bool(v: &mut Value) {
    let truthy = match &*v {
        Value::Bool(_) => return,
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => return,
    };
    *v = Value::Bool(truthy);
}

/// Rewrite a raw on-disk record into the normalized shape before typed
/// deserialization: fold legacy per-property layer maps into `layers`,
/// rename legacy layer keys, drop removed layers, coerce truthy strings.
pub fn migrate(root: &mut Value) {
    let Some(obj) = root.as_object_mut() else {
        return;
    };

    // Legacy split maps like `layer_colors: {family: "#..."}`.
    for (legacy_key, field) in LEGACY_SPLIT_MAPS {
        let Some(Value::Object(map)) = obj.remove(*legacy_key) else {
            continue;
        };
        for (layer_name, value) in map {
            let Some(layer) = Layer::from_wire(&layer_name) else {
                continue; // removed layer
            };
            let layers = obj
                .entry("layers")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Some(layers) = layers.as_object_mut() {
                let entry = layers
                    .entry(layer.as_str())
                    .or_insert_with(|| Value::Object(Default::default()));
                if let Some(entry) = entry.as_object_mut() {
                    entry.entry((*field).to_string()).or_insert(value);
                }
            }
        }
    }

    // Legacy names inside the unified `layers` map itself.
    if let Some(Value::Object(layers)) = obj.get_mut("layers") {
        let keys: Vec<String> = layers.keys().cloned().collect();
        for key in keys {
            match Layer::from_wire(&key) {
                None => {
                    layers.remove(&key);
                }
                Some(layer) if layer.as_str() != key => {
                    if let Some(value) = layers.remove(&key) {
                        layers.entry(layer.as_str()).or_insert(value);
                    }
                }
                Some(_) => {}
            }
        }
        for entry in layers.values_mut() {
            if let Some(entry) = entry.as_object_mut() {
                for flag in ["enabled", "flow"] {
                    if let Some(v) = entry.get_mut(flag) {
                        coerce_bool(v);
                    }
                }
            }
        }
    }

    if let Some(v) = obj.remove("mass_linker_group_hubs") {
        obj.entry("group_hubs").or_insert(v);
    }

    for flag in BOOL_FLAGS {
        if let Some(v) = obj.get_mut(*flag) {
            coerce_bool(v);
        }
    }
    if let Some(Value::Object(nts)) = obj.get_mut("note_types") {
        for nt in nts.values_mut() {
            if let Some(v) = nt.get_mut("visible") {
                coerce_bool(v);
            }
        }
    }
    for gate in ["family_gate", "example_gate", "kanji_gate"] {
        if let Some(g) = obj.get_mut(gate) {
            for flag in ["enabled", "first_token"] {
                if let Some(v) = g.get_mut(flag) {
                    coerce_bool(v);
                }
            }
        }
    }
}

// ---- store ----

pub struct ConfigStore {
    path: PathBuf,
    cfg: GraphConfig,
}

impl ConfigStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cfg = load_from_path(&path);
        Self { path, cfg }
    }

    pub fn get(&self) -> &GraphConfig {
        &self.cfg
    }

    /// Mutate the record and write it through.
    pub fn update(&mut self, f: impl FnOnce(&mut GraphConfig)) {
        f(&mut self.cfg);
        self.cfg.normalize();
        self.save();
    }

    /// Apply a wire command and write through; fire-and-forget, idempotent.
    pub fn apply_command(&mut self, cmd: &Command) -> Invalidate {
        let inv = self.cfg.apply(cmd);
        if inv != Invalidate::None {
            self.save();
        }
        inv
    }

    pub fn save(&self) {
        if let Err(e) = save_to_path(&self.cfg, &self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "config save failed");
        }
    }
}

fn load_from_path(path: &Path) -> GraphConfig {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return GraphConfig::default();
    };
    let Ok(mut value) = serde_json::from_str::<Value>(&raw) else {
        tracing::warn!(path = %path.display(), "unreadable config, using defaults");
        return GraphConfig::default();
    };
    migrate(&mut value);
    match serde_json::from_value::<GraphConfig>(value) {
        Ok(mut cfg) => {
            cfg.normalize();
            cfg
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config did not deserialize, using defaults");
            GraphConfig::default()
        }
    }
}

fn save_to_path(cfg: &GraphConfig, path: &Path) -> anyhow::Result<()> {
    use anyhow::Context;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create config dir {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(cfg).context("serialize config")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_cover_every_layer_and_table_key() {
        let cfg = GraphConfig::default();
        assert_eq!(cfg.layers.len(), Layer::ALL.len());
        for (key, ..) in SOLVER_KEYS {
            assert!(cfg.solver.contains_key(*key), "missing solver key {key}");
        }
        for (key, ..) in ENGINE_KEYS {
            assert!(cfg.engine.contains_key(*key), "missing engine key {key}");
        }
    }

    #[test]
    fn legacy_layer_colors_migrate_to_normalized_layers() {
        let raw = serde_json::json!({
            "layer_colors": {
                "family": "#111111",
                "reference": "#222222",
                "example": "#333333",
                "ghost_layer": "#444444"
            }
        });
        let mut value = raw.clone();
        migrate(&mut value);
        let mut cfg: GraphConfig = serde_json::from_value(value).unwrap();
        cfg.normalize();

        assert_eq!(cfg.layer(Layer::Priority).color, "#111111");
        assert_eq!(cfg.layer(Layer::NoteLinks).color, "#222222");
        assert_eq!(cfg.layer(Layer::Examples).color, "#333333");

        // Saving and reloading the normalized record is the identity.
        let reserialized = serde_json::to_value(&cfg).unwrap();
        let mut again = reserialized.clone();
        migrate(&mut again);
        let mut cfg2: GraphConfig = serde_json::from_value(again).unwrap();
        cfg2.normalize();
        assert_eq!(cfg, cfg2);
    }

    #[test]
    fn truthy_strings_coerce_to_bools() {
        let mut value = serde_json::json!({
            "show_unlinked": "true",
            "family_chain": "0",
            "hub_damp": "On",
            "layers": { "kanji": { "enabled": "no", "flow": 1 } }
        });
        migrate(&mut value);
        let mut cfg: GraphConfig = serde_json::from_value(value).unwrap();
        cfg.normalize();
        assert!(cfg.show_unlinked);
        assert!(!cfg.family_chain);
        assert!(cfg.hub_damp);
        assert!(!cfg.layer(Layer::Kanji).enabled);
        assert!(cfg.layer(Layer::Kanji).flow);
    }

    #[test]
    fn unknown_numeric_keys_drop_and_values_clamp() {
        let mut value = serde_json::json!({
            "solver": { "alpha_decay": 99.0, "bogus_key": 1.0 }
        });
        migrate(&mut value);
        let mut cfg: GraphConfig = serde_json::from_value(value).unwrap();
        cfg.normalize();
        assert!(!cfg.solver.contains_key("bogus_key"));
        assert_eq!(cfg.solver_val("alpha_decay"), 0.5);
    }

    #[test]
    fn group_hubs_dedup_preserves_first_seen_case() {
        let mut cfg = GraphConfig::default();
        cfg.group_hubs = vec![
            "Verbs".to_string(),
            "verbs".to_string(),
            "VERBS".to_string(),
            "Nouns".to_string(),
        ];
        cfg.normalize();
        assert_eq!(cfg.group_hubs, vec!["Verbs".to_string(), "Nouns".to_string()]);
    }

    #[test]
    fn store_roundtrip_is_identity_on_normalized_records() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("graph_config.json");

        let mut store = ConfigStore::load(&path);
        store.update(|cfg| {
            cfg.decks = vec!["JP::Vocab".to_string()];
            cfg.show_unlinked = true;
            cfg.apply(&Command::LayerColor {
                layer: Layer::Kanji,
                color: "#010203".to_string(),
            });
        });
        let saved = store.get().clone();

        let reloaded = ConfigStore::load(&path);
        assert_eq!(&saved, reloaded.get());
    }

    #[test]
    fn apply_reports_invalidation_kind() {
        let mut cfg = GraphConfig::default();
        assert_eq!(
            cfg.apply(&Command::LayerColor {
                layer: Layer::Notes,
                color: "#fff".to_string()
            }),
            Invalidate::Renderer
        );
        assert_eq!(
            cfg.apply(&Command::SolverParam {
                key: "alpha_decay".to_string(),
                value: 0.05
            }),
            Invalidate::Solver
        );
        assert_eq!(
            cfg.apply(&Command::ShowUnlinked { on: true }),
            Invalidate::Assembler
        );
        assert_eq!(cfg.apply(&Command::Refresh), Invalidate::None);
        assert!(cfg.show_unlinked);
    }
}
