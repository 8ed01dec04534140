use bevy::prelude::{Res, ResMut};
use bevy_egui::{egui, EguiContexts};
use notegraph_core::Command;

use crate::app::resources::NetTx;
use crate::graph::GraphState;

/// Dependency-tree panel, fed by the `setActiveDepTreeFromPy` hook.
pub fn deptree_panel(mut contexts: EguiContexts, mut st: ResMut<GraphState>, net: Res<NetTx>) {
    if !st.ui.deptree_open {
        return;
    }
    let Some(tree) = st.ui.deptree.clone() else {
        return;
    };
    let ctx = contexts.ctx_mut().clone();
    let mut open = true;

    egui::Window::new("Dependency tree")
        .open(&mut open)
        .resizable(true)
        .show(&ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(format!("root: {}", tree.root.0));
                if let Some(nid) = tree.root.as_note() {
                    if ui.small_button("refresh").clicked() {
                        net.send(&Command::DepTree { note_id: nid });
                    }
                }
            });
            ui.separator();
            egui::ScrollArea::vertical()
                .max_height(320.0)
                .show(ui, |ui| {
                    for node in &tree.nodes {
                        ui.horizontal(|ui| {
                            ui.add_space(node.depth as f32 * 16.0);
                            let text = if node.depth == 0 {
                                format!("▸ {}", node.label)
                            } else {
                                format!("└ {}", node.label)
                            };
                            if ui.selectable_label(false, text).clicked() {
                                st.request_jump(node.id.clone());
                            }
                        });
                    }
                });
        });

    if !open {
        st.ui.deptree_open = false;
    }
}
