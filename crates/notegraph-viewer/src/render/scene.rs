use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts};
use notegraph_core::{NodeId, NodeKind};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::graph::state::{CtxMenu, CtxTarget};
use crate::graph::GraphState;
use crate::render::camera::CameraRig;
use crate::render::programs::{draw_flow, EdgeDrawParams, ProgramRegistry};
use crate::ui::tooltips::render_tooltip;

#[derive(Component)]
pub struct NodeMarker;

/// `#rgb` / `#rrggbb` to linear-ish srgb components; anything else falls
/// back to a neutral gray.
pub fn parse_hex(color: &str) -> (f32, f32, f32) {
    let hex = color.trim().trim_start_matches('#');
    let parse = |s: &str| u8::from_str_radix(s, 16).ok();
    let rgb = match hex.len() {
        3 => {
            let d = |i: usize| parse(&hex[i..=i].repeat(2));
            (d(0), d(1), d(2))
        }
        6 => (parse(&hex[0..2]), parse(&hex[2..4]), parse(&hex[4..6])),
        _ => (None, None, None),
    };
    match rgb {
        (Some(r), Some(g), Some(b)) => (
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
        ),
        _ => (0.55, 0.58, 0.65),
    }
}

fn project(
    camera: &Camera,
    cam_tf: &GlobalTransform,
    pos: Vec3,
) -> Option<Vec2> {
    camera.world_to_viewport(cam_tf, pos)
}

fn pick_node(
    st: &GraphState,
    camera: &Camera,
    cam_tf: &GlobalTransform,
    cursor: Vec2,
    radius: f32,
) -> Option<NodeId> {
    let mut best: Option<(f32, NodeId)> = None;
    for (id, pos) in st.spatial.positions.iter() {
        let Some(screen) = project(camera, cam_tf, *pos) else {
            continue;
        };
        let d = screen.distance(cursor);
        if d < radius && best.as_ref().map(|(bd, _)| d < *bd).unwrap_or(true) {
            best = Some((d, id.clone()));
        }
    }
    best.map(|(_, id)| id)
}

fn dist_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let t = ((p - a).dot(ab) / ab.length_squared().max(1e-6)).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

fn pick_edge(
    st: &GraphState,
    camera: &Camera,
    cam_tf: &GlobalTransform,
    cursor: Vec2,
) -> Option<usize> {
    let mut best: Option<(f32, usize)> = None;
    for (ei, edge) in st.graph.edges.iter().enumerate() {
        if edge.flow_only || !st.layer_enabled(edge.layer) {
            continue;
        }
        let (Some(pa), Some(pb)) = (
            st.spatial.positions.get(&edge.source),
            st.spatial.positions.get(&edge.target),
        ) else {
            continue;
        };
        let (Some(sa), Some(sb)) = (
            project(camera, cam_tf, *pa),
            project(camera, cam_tf, *pb),
        ) else {
            continue;
        };
        let d = dist_to_segment(cursor, sa, sb);
        if d < 7.0 && best.as_ref().map(|(bd, _)| d < *bd).unwrap_or(true) {
            best = Some((d, ei));
        }
    }
    best.map(|(_, ei)| ei)
}

pub fn hover_detection(
    windows: Query<&Window>,
    cam_q: Query<(&Camera, &GlobalTransform)>,
    mut contexts: EguiContexts,
    mut st: ResMut<GraphState>,
) {
    let Ok(window) = windows.get_single() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        st.ui.hovered = None;
        st.ui.hover_since = None;
        return;
    };
    let Ok((camera, cam_tf)) = cam_q.get_single() else {
        return;
    };
    if contexts.ctx_mut().wants_pointer_input() {
        return;
    }

    let hit = pick_node(&st, camera, cam_tf, cursor, 18.0);
    if hit != st.ui.hovered {
        st.ui.hovered = hit;
        st.ui.hover_since = Some(Instant::now());
        st.mark_redraw();
    }
}

/// Left button: select and drag nodes (dragging projects the cursor onto the
/// layout plane). Right button: open the context menu on whatever is under
/// the cursor.
pub fn pointer_interaction(
    buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window>,
    cam_q: Query<(&Camera, &GlobalTransform)>,
    mut contexts: EguiContexts,
    mut st: ResMut<GraphState>,
) {
    let Ok(window) = windows.get_single() else {
        return;
    };
    let Ok((camera, cam_tf)) = cam_q.get_single() else {
        return;
    };
    if contexts.ctx_mut().wants_pointer_input() {
        return;
    }
    let Some(cursor) = window.cursor_position() else {
        return;
    };

    if buttons.just_pressed(MouseButton::Left) {
        st.ui.ctx_menu = None;
        match pick_node(&st, camera, cam_tf, cursor, 14.0) {
            Some(id) => {
                st.ui.selected = Some(id.clone());
                st.ui.dragging = Some(id);
                st.clock.idle = false;
                st.mark_redraw();
            }
            None => {
                if st.ui.selected.take().is_some() {
                    st.mark_redraw();
                }
            }
        }
    }

    if buttons.pressed(MouseButton::Left) {
        if let Some(id) = st.ui.dragging.clone() {
            if let Some(ray) = camera.viewport_to_world(cam_tf, cursor) {
                if ray.direction.y.abs() > 1e-4 {
                    let t = -ray.origin.y / ray.direction.y;
                    if t > 0.0 {
                        let hit = ray.origin + ray.direction * t;
                        let alpha = st.sv("alpha_reheat", 0.3);
                        st.spatial.positions.insert(id.clone(), hit);
                        st.spatial.heat.insert(id, alpha);
                        st.mark_redraw();
                    }
                }
            }
        }
    }

    if buttons.just_released(MouseButton::Left) {
        st.ui.dragging = None;
    }

    if buttons.just_pressed(MouseButton::Right) {
        let target = match pick_node(&st, camera, cam_tf, cursor, 14.0) {
            Some(id) => CtxTarget::Node(id),
            None => match pick_edge(&st, camera, cam_tf, cursor) {
                Some(ei) => CtxTarget::Edge(ei),
                None => CtxTarget::Background,
            },
        };
        st.ui.ctx_menu = Some(CtxMenu {
            screen: (cursor.x, cursor.y),
            target,
        });
    }
}

fn node_color(st: &GraphState, node: &notegraph_core::GraphNode) -> (f32, f32, f32) {
    if node.kind == NodeKind::Note {
        if let Some(mid) = node.note_type_id {
            if let Some(hex) = st
                .graph
                .meta
                .settings
                .note_type_colors
                .get(&mid.to_string())
            {
                return parse_hex(hex);
            }
        }
        (0.36, 0.56, 0.78)
    } else if node.kind == NodeKind::Family {
        (0.86, 0.62, 0.16)
    } else {
        (0.78, 0.42, 0.22)
    }
}

#[allow(clippy::too_many_arguments)]
pub fn draw_scene(
    mut commands: Commands,
    mut st: ResMut<GraphState>,
    registry: Res<ProgramRegistry>,
    rig: Res<CameraRig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut mats: ResMut<Assets<StandardMaterial>>,
    query: Query<Entity, With<NodeMarker>>,
    mut gizmos: Gizmos,
    mut contexts: EguiContexts,
    cam_q: Query<(&Camera, &GlobalTransform)>,
) {
    draw_tooltip(&mut contexts, &st);

    // Retained node meshes are rebuilt only when something changed.
    if st.needs_redraw.swap(false, Ordering::Relaxed) {
        for entity in query.iter() {
            commands.entity(entity).despawn_recursive();
        }
        spawn_nodes(&mut commands, &st, &registry, &mut meshes, &mut mats);
    }

    // Edges are immediate-mode and cheap; they follow the solver every frame.
    draw_edges(&mut gizmos, &st, &registry);
    draw_extra_passes(&mut gizmos, &st);
    draw_labels(&mut contexts, &st, &rig, &cam_q);
}

fn draw_tooltip(contexts: &mut EguiContexts, st: &GraphState) {
    let Some(hovered) = st.ui.hovered.clone() else {
        return;
    };
    let dwell = Duration::from_millis(st.rv("hover_dwell_ms", 180.0) as u64);
    if !st
        .ui
        .hover_since
        .is_some_and(|since| since.elapsed() >= dwell)
    {
        return;
    }
    let ctx = contexts.ctx_mut();
    let pos = ctx
        .input(|i| i.pointer.hover_pos().unwrap_or(egui::pos2(0.0, 0.0)))
        + egui::vec2(14.0, 14.0);
    render_tooltip(ctx, "node_tooltip", pos, st.node_tooltip_lines(&hovered));
}

fn spawn_nodes(
    commands: &mut Commands,
    st: &GraphState,
    registry: &ProgramRegistry,
    meshes: &mut Assets<Mesh>,
    mats: &mut Assets<StandardMaterial>,
) {
    let cap = st.ev("max_visible_nodes", 4000.0) as usize;
    let mut spawned = 0usize;
    for node in &st.graph.nodes {
        if spawned >= cap {
            break;
        }
        if !st.passes_filter(&node.id) {
            continue;
        }
        let Some(pos) = st.spatial.positions.get(&node.id).copied() else {
            continue;
        };
        spawned += 1;
        let (program, size) = match node.kind {
            NodeKind::Note => (registry.node("note_card"), st.nv("note_size", 14.0)),
            NodeKind::Family => (registry.node("hub"), st.nv("hub_size", 18.0)),
            NodeKind::KanjiHub => (registry.node("hub"), st.nv("kanji_size", 12.0)),
        };
        let mesh = program.mesh(meshes, size);

        let (r, g, b) = node_color(st, node);
        let highlighted =
            st.ui.selected.as_ref() == Some(&node.id) || st.ui.hovered.as_ref() == Some(&node.id);
        let material = if highlighted {
            mats.add(StandardMaterial {
                base_color: Color::srgb(r, g, b),
                emissive: Color::srgb(r * 2.0, g * 2.0, b * 2.0).into(),
                ..default()
            })
        } else {
            mats.add(StandardMaterial {
                base_color: Color::srgb(r, g, b),
                ..default()
            })
        };

        commands.spawn((
            PbrBundle {
                mesh,
                material,
                transform: Transform::from_translation(pos),
                ..default()
            },
            NodeMarker,
        ));
    }
}

fn draw_edges(gizmos: &mut Gizmos, st: &GraphState, registry: &ProgramRegistry) {
    let opacity = st.rv("edge_opacity", 0.85);
    let dim = st.rv("selection_dim", 0.15);
    let thickness = st.rv("flow_thickness", 1.6);
    let spacing = st.rv("flow_spacing", 14.0);
    let selected = st.ui.selected.clone();
    let params = EdgeDrawParams { thickness };

    for edge in &st.graph.edges {
        if !st.layer_enabled(edge.layer) {
            continue;
        }
        let ls = st.layer_settings(edge.layer);
        let (Some(pa), Some(pb)) = (
            st.spatial.positions.get(&edge.source),
            st.spatial.positions.get(&edge.target),
        ) else {
            continue;
        };

        let (r, g, b) = parse_hex(&ls.color);
        let mut alpha = opacity;
        if edge.same_prio {
            alpha *= st.graph.meta.settings.same_prio_opacity;
        }
        if let Some(sel) = &selected {
            if edge.source != *sel && edge.target != *sel {
                alpha *= dim;
            }
        }
        let color = Color::srgba(r, g, b, alpha.clamp(0.0, 1.0));

        if !edge.flow_only {
            // Program lookup is style-keyed; styles live in config, not code.
            registry.edge(ls.style).draw(gizmos, *pa, *pb, color, &params);
        }
        if ls.flow {
            // Flow-only twins animate the reverse direction of a
            // bidirectional pair and draw no static line.
            draw_flow(gizmos, *pa, *pb, color, st.flow_phase, spacing, thickness);
        }
    }
}

/// Card-status dots and hover/selection rings.
fn draw_extra_passes(gizmos: &mut Gizmos, st: &GraphState) {
    let dot_size = st.nv("dot_size", 3.0) * 0.12;
    let glow = st.nv("glow_radius", 6.0) * 0.3;

    if st.graph.meta.settings.card_dot_enabled {
        let (sr, sg, sb) = parse_hex(&st.graph.meta.settings.card_dot_suspended);
        let (br, bg, bb) = parse_hex(&st.graph.meta.settings.card_dot_buried);
        for node in &st.graph.nodes {
            let Some(pos) = st.spatial.positions.get(&node.id) else {
                continue;
            };
            let mut offset = 0.0;
            for card in &node.cards {
                let color = if card.suspended {
                    Color::srgb(sr, sg, sb)
                } else if card.buried {
                    Color::srgb(br, bg, bb)
                } else {
                    continue;
                };
                let dot = *pos + Vec3::new(1.2 + offset, 0.4, -1.0);
                gizmos.sphere(dot, Quat::IDENTITY, dot_size, color);
                offset += dot_size * 2.6;
            }
        }
    }

    for id in [st.ui.selected.as_ref(), st.ui.hovered.as_ref()].into_iter().flatten() {
        if let Some(pos) = st.spatial.positions.get(id) {
            gizmos.circle(*pos + Vec3::Y * 0.1, Dir3::Y, glow, Color::srgb(1.0, 1.0, 0.85));
        }
    }
}

fn draw_labels(
    contexts: &mut EguiContexts,
    st: &GraphState,
    rig: &CameraRig,
    cam_q: &Query<(&Camera, &GlobalTransform)>,
) {
    let threshold = st.rv("label_zoom", 1.2);
    if rig.zoom() < threshold {
        return;
    }
    let Ok((camera, cam_tf)) = cam_q.get_single() else {
        return;
    };
    let size = st.nv("label_size", 12.0);
    let ctx = contexts.ctx_mut();
    let painter = ctx.layer_painter(egui::LayerId::new(
        egui::Order::Background,
        egui::Id::new("node_labels"),
    ));
    for node in &st.graph.nodes {
        if node.label.is_empty() || !st.passes_filter(&node.id) {
            continue;
        }
        let Some(pos) = st.spatial.positions.get(&node.id) else {
            continue;
        };
        let Some(screen) = project(camera, cam_tf, *pos + Vec3::new(0.0, 0.0, 1.6)) else {
            continue;
        };
        painter.text(
            egui::pos2(screen.x, screen.y),
            egui::Align2::CENTER_TOP,
            &node.label,
            egui::FontId::proportional(size),
            egui::Color32::from_rgb(225, 228, 235),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_with_fallback() {
        assert_eq!(parse_hex("#ff0000"), (1.0, 0.0, 0.0));
        assert_eq!(parse_hex("#0f0"), (0.0, 1.0, 0.0));
        let (r, g, b) = parse_hex("not-a-color");
        assert!(r > 0.0 && g > 0.0 && b > 0.0);
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(dist_to_segment(Vec2::new(5.0, 3.0), a, b), 3.0);
        assert_eq!(dist_to_segment(Vec2::new(-4.0, 0.0), a, b), 4.0);
    }
}
