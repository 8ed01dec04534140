//! Force layout. One fixed-size velocity-Verlet step per rendered frame:
//! Barnes–Hut many-body, per-layer springs, centering, soft pinning and the
//! damping passes, all scaled by global alpha or the node's local heat.
//! Identical payloads produce identical positions; there is no randomness,
//! only id-derived placement.

use bevy::prelude::{Res, ResMut, Time, Vec3};
use notegraph_core::{Layer, NodeId, NodeKind};
use std::collections::HashMap;
use std::time::Instant;

use crate::graph::quadtree::QuadTree;
use crate::graph::state::GraphState;

pub fn update_layout(time: Res<Time>, mut st: ResMut<GraphState>) {
    st.prepare_layout();
    st.solver_step();
    st.advance_flow(time.delta_seconds());
}

fn id_hash(id: &NodeId) -> u64 {
    // FNV-1a; stable across runs, unlike the std hasher.
    let mut h: u64 = 0xcbf29ce484222325;
    for b in id.0.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

impl GraphState {
    /// Seat nodes that have no position yet: next to a placed neighbor when
    /// one exists, otherwise on a golden-angle spiral in id order.
    pub fn prepare_layout(&mut self) {
        if !self.spatial.dirty_layout {
            return;
        }
        let order = self.spatial.order.clone();
        let mut spiral_rank = 0usize;
        for id in &order {
            if self.spatial.positions.contains_key(id) {
                spiral_rank += 1;
                continue;
            }
            let neighbor_pos = self
                .index
                .neighbors(&self.graph, id)
                .into_iter()
                .find_map(|nb| self.spatial.positions.get(&nb).copied());
            let pos = match neighbor_pos {
                Some(base) => {
                    let h = id_hash(id);
                    let angle = (h % 6283) as f32 / 1000.0;
                    let radius = 8.0 + (h >> 16 & 0xf) as f32;
                    base + Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius)
                }
                None => {
                    let i = spiral_rank as f32;
                    let angle = i * 2.399_963; // golden angle
                    let radius = 18.0 * (i + 1.0).sqrt();
                    Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius)
                }
            };
            spiral_rank += 1;
            self.spatial.positions.insert(id.clone(), pos);
            self.spatial.velocities.insert(id.clone(), Vec3::ZERO);
            self.spatial.accels.insert(id.clone(), Vec3::ZERO);
            self.spatial.anchors.insert(id.clone(), pos);
        }
        self.spatial.dirty_layout = false;
        self.mark_redraw();
    }

    pub fn solver_step(&mut self) {
        if self.clock.idle && self.spatial.heat.is_empty() && self.ui.dragging.is_none() {
            return;
        }

        let alpha_min = self.sv("alpha_min", 0.001);
        let alpha_decay = self.sv("alpha_decay", 0.0228);
        let velocity_decay = self.sv("velocity_decay", 0.4);
        let charge = self.sv("charge_strength", -120.0);
        let theta = self.sv("charge_theta", 0.9);
        let dist_min = self.sv("charge_distance_min", 1.0);
        let dist_max = self.sv("charge_distance_max", 800.0);
        let center = Vec3::new(self.sv("center_x", 0.0), 0.0, self.sv("center_y", 0.0));
        let center_strength = self.sv("center_strength", 0.03);
        let pin_radius = self.sv("soft_pin_radius", 160.0);
        let pin_strength = self.sv("soft_pin_strength", 0.05);
        let hub_damping = self.sv("hub_damping", 0.55);
        let ref_damping = self.sv("ref_damping", 0.5);
        let mst_attenuation = self.sv("mst_attenuation", 0.25);
        let ref_auto = self.graph.meta.settings.ref_auto;

        let ids: Vec<NodeId> = self
            .spatial
            .order
            .iter()
            .filter(|id| self.spatial.positions.contains_key(*id))
            .cloned()
            .collect();
        if ids.len() <= 1 {
            self.tick_clock(alpha_min, alpha_decay);
            return;
        }
        let slot: HashMap<&NodeId, usize> =
            ids.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let points: Vec<(f32, f32)> = ids
            .iter()
            .map(|id| {
                let p = self.spatial.positions[id];
                (p.x, p.z)
            })
            .collect();

        let mut forces = vec![Vec3::ZERO; ids.len()];

        // Many-body
        let tree = QuadTree::build(&points);
        for (i, f) in forces.iter_mut().enumerate() {
            let (fx, fz) = tree.force_on(i, theta, dist_min, dist_max, charge);
            f.x += fx;
            f.z += fz;
        }

        // Links
        for (ei, edge) in self.graph.edges.iter().enumerate() {
            if edge.flow_only || !self.layer_enabled(edge.layer) {
                continue;
            }
            let (Some(&a), Some(&b)) = (slot.get(&edge.source), slot.get(&edge.target)) else {
                continue;
            };
            let ls = self.layer_settings(edge.layer);
            let mut k = ls.strength * self.weights.get(ei).copied().unwrap_or(1.0);
            if self.graph.meta.settings.link_mst && self.non_tree.contains(&ei) {
                k *= mst_attenuation;
            }
            if matches!(edge.layer, Layer::Notes | Layer::NoteLinks) {
                k *= 1.0 - ref_auto.clamp(0.0, 0.95);
            }
            let pa = self.spatial.positions[&edge.source];
            let pb = self.spatial.positions[&edge.target];
            let mut d = pb - pa;
            d.y = 0.0;
            let len = d.length().max(0.001);
            let stretch = len - ls.distance;
            let f = (d / len) * (k * 0.1 * stretch);
            forces[a] += f;
            forces[b] -= f;
        }

        // Centering + soft pin
        for (i, id) in ids.iter().enumerate() {
            let p = self.spatial.positions[id];
            forces[i] += (center - p) * center_strength;

            if let Some(anchor) = self.spatial.anchors.get(id) {
                let mut disp = p - *anchor;
                disp.y = 0.0;
                let d = disp.length();
                if d > pin_radius {
                    forces[i] -= disp / d * ((d - pin_radius) * pin_strength);
                }
            }
        }

        // Integrate (velocity Verlet, fixed unit step)
        let decay = (1.0 - velocity_decay).clamp(0.0, 1.0);
        let mut moved = false;
        for (i, id) in ids.iter().enumerate() {
            if self.ui.dragging.as_ref() == Some(id) {
                continue;
            }
            let alpha_eff = self
                .spatial
                .heat
                .get(id)
                .copied()
                .unwrap_or(0.0)
                .max(self.clock.alpha);
            if alpha_eff <= 0.0 {
                continue;
            }
            let mut damp = 1.0;
            let kind = self.graph.nodes[self.index.node_of[id]].kind;
            if self.graph.meta.settings.hub_damp && kind != NodeKind::Note {
                damp *= hub_damping;
            }
            if self.graph.meta.settings.ref_damp && self.reference_only(id) {
                damp *= ref_damping;
            }

            let a_new = forces[i] * alpha_eff;
            let a_prev = self.spatial.accels.get(id).copied().unwrap_or(Vec3::ZERO);
            let v = self.spatial.velocities.entry(id.clone()).or_insert(Vec3::ZERO);
            *v = (*v + (a_prev + a_new) * 0.5) * decay * damp;

            let mut step = *v;
            let max_step = 30.0;
            if step.length() > max_step {
                step = step.normalize_or_zero() * max_step;
            }
            if step.length_squared() > 1e-8 {
                moved = true;
            }
            let p = self.spatial.positions.entry(id.clone()).or_insert(Vec3::ZERO);
            *p += step;
            p.y = 0.0;
            self.spatial.accels.insert(id.clone(), a_new);
        }

        // Heat decays on the same curve as global alpha.
        self.spatial.heat.retain(|_, h| {
            *h *= 1.0 - alpha_decay;
            *h >= alpha_min
        });
        self.tick_clock(alpha_min, alpha_decay);

        if moved {
            self.mark_redraw();
        }
    }

    /// True when every incident visible edge is a reference edge; such
    /// chains unravel without extra damping.
    fn reference_only(&self, id: &NodeId) -> bool {
        let mut any = false;
        for ei in self.index.edges_for(id) {
            let e = &self.graph.edges[ei];
            if e.flow_only {
                continue;
            }
            if !matches!(e.layer, Layer::Notes | Layer::NoteLinks) {
                return false;
            }
            any = true;
        }
        any
    }

    fn tick_clock(&mut self, alpha_min: f32, alpha_decay: f32) {
        if self.clock.warmup_left > 0 {
            self.clock.warmup_left -= 1;
        } else {
            self.clock.alpha *= 1.0 - alpha_decay;
        }
        if self.clock.cooldown_left > 0 {
            self.clock.cooldown_left -= 1;
        }

        let timed_out = self
            .clock
            .cooldown_deadline
            .is_some_and(|d| Instant::now() > d);
        let exhausted = self.clock.cooldown_left == 0;
        if self.clock.alpha < alpha_min || timed_out || exhausted {
            self.clock.alpha = 0.0;
            // Idle only once local heat has drained too.
            if self.spatial.heat.is_empty() && self.ui.dragging.is_none() {
                self.clock.idle = true;
            }
        }
    }

    pub fn advance_flow(&mut self, dt: f32) {
        let speed = self.rv("flow_speed", 1.0);
        if speed <= 0.0 {
            return;
        }
        let any_flow = self
            .graph
            .meta
            .layer_settings
            .values()
            .any(|ls| ls.enabled && ls.flow);
        if !any_flow {
            return;
        }
        self.flow_phase = (self.flow_phase + dt * speed) % 1.0;
        self.mark_redraw();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::{GraphEdge, GraphMeta, GraphNode, GraphPayload};

    fn two_node_state() -> GraphState {
        let n = |id: i64| GraphNode::new(NodeId::note(id), NodeKind::Note, format!("n{id}"));
        let payload = GraphPayload {
            nodes: vec![n(1), n(2)],
            edges: vec![GraphEdge::new(
                NodeId::note(1),
                NodeId::note(2),
                Layer::Priority,
            )],
            meta: GraphMeta {
                rev: 1,
                ..GraphMeta::default()
            },
        };
        let mut st = GraphState::default();
        st.install_full(payload, 1.0);
        st
    }

    #[test]
    fn placement_is_deterministic() {
        let mut a = two_node_state();
        let mut b = two_node_state();
        a.prepare_layout();
        b.prepare_layout();
        assert_eq!(a.spatial.positions, b.spatial.positions);
    }

    #[test]
    fn identical_inputs_step_to_identical_positions() {
        let mut a = two_node_state();
        let mut b = two_node_state();
        for _ in 0..50 {
            a.prepare_layout();
            a.solver_step();
            b.prepare_layout();
            b.solver_step();
        }
        assert_eq!(a.spatial.positions, b.spatial.positions);
    }

    #[test]
    fn linked_nodes_approach_their_layer_distance() {
        let mut st = two_node_state();
        st.prepare_layout();
        let target = st.layer_settings(Layer::Priority).distance;
        for _ in 0..600 {
            st.solver_step();
            if st.clock.idle {
                break;
            }
        }
        let d = (st.spatial.positions[&NodeId::note(1)] - st.spatial.positions[&NodeId::note(2)])
            .length();
        assert!(
            (d - target).abs() < target,
            "distance {d} should be pulled toward {target}"
        );
    }

    #[test]
    fn solver_goes_idle_after_decay() {
        let mut st = two_node_state();
        st.prepare_layout();
        for _ in 0..5000 {
            st.solver_step();
            if st.clock.idle {
                break;
            }
        }
        assert!(st.clock.idle);
        // Idle means no integration: positions stop changing.
        let before = st.spatial.positions.clone();
        st.solver_step();
        assert_eq!(before, st.spatial.positions);
    }

    #[test]
    fn dragged_node_is_not_integrated() {
        let mut st = two_node_state();
        st.prepare_layout();
        st.ui.dragging = Some(NodeId::note(1));
        let pinned = st.spatial.positions[&NodeId::note(1)];
        for _ in 0..20 {
            st.solver_step();
        }
        assert_eq!(st.spatial.positions[&NodeId::note(1)], pinned);
        assert_ne!(st.spatial.positions[&NodeId::note(2)], pinned);
    }
}
