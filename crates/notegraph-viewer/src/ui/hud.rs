use bevy::prelude::{Res, ResMut, Time};
use bevy_egui::{egui, EguiContexts};

use crate::graph::GraphState;

// Debug overlay; toggled with the devtools button / D.
pub fn hud_overlay(time: Res<Time>, mut contexts: EguiContexts, mut st: ResMut<GraphState>) {
    st.perf.fps = 1.0 / time.delta_seconds().max(0.0001);
    if !st.ui.hud_open {
        return;
    }
    let ctx = contexts.ctx_mut();
    let screen = ctx.screen_rect();

    egui::Area::new(egui::Id::new("hud"))
        .order(egui::Order::Foreground)
        .fixed_pos(egui::pos2(screen.max.x - 230.0, screen.min.y + 8.0))
        .show(ctx, |ui| {
            ui.group(|ui| {
                ui.label(format!("FPS: {:.0}", st.perf.fps));
                ui.label(format!(
                    "Nodes: {} / Edges: {}",
                    st.graph.nodes.len(),
                    st.graph.edges.len()
                ));
                ui.label(format!("Rev: {}", st.graph.meta.rev));
                ui.label(format!(
                    "Alpha: {:.4}{}",
                    st.clock.alpha,
                    if st.clock.idle { " (idle)" } else { "" }
                ));
                ui.label(format!("Hot nodes: {}", st.spatial.heat.len()));
                ui.label(format!("Msgs: {}", st.perf.msg_total));
                if st.perf.stale_deltas > 0 {
                    ui.label(format!("Stale deltas: {}", st.perf.stale_deltas));
                }
                if st.perf.decode_errors > 0 {
                    ui.label(format!("Decode errors: {}", st.perf.decode_errors));
                }
                let diag = &st.graph.meta.diagnostics;
                ui.label(format!(
                    "Skipped: {} / bad links: {} / bad families: {}",
                    diag.skipped_notes, diag.malformed_links, diag.malformed_families
                ));
                ui.label(if st.connected {
                    "Host: connected".to_string()
                } else {
                    "Host: disconnected".to_string()
                });
            });
        });
}
