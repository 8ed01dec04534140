use bevy::prelude::{Res, ResMut};
use bevy_egui::{egui, EguiContexts};
use notegraph_core::{Command, CtxAction, EmbedEditorCmd};

use crate::app::resources::NetTx;
use crate::graph::GraphState;

/// Embedded note editor mount. The heavy editing surface lives host-side;
/// this window shows the mounted note and drives the `embed_editor` wire
/// commands (open/select/rect/close).
pub fn editor_mount(mut contexts: EguiContexts, mut st: ResMut<GraphState>, net: Res<NetTx>) {
    if !st.ui.editor_open {
        return;
    }
    let ctx = contexts.ctx_mut().clone();
    let mut open = true;
    let note = st
        .ui
        .editor_note
        .clone()
        .and_then(|id| st.node(&id).cloned());

    let response = egui::Window::new("Note editor")
        .open(&mut open)
        .resizable(true)
        .default_width(300.0)
        .show(&ctx, |ui| {
            let Some(node) = note else {
                ui.label("no note selected");
                return;
            };
            ui.heading(&node.label);
            if let Some(nt) = &node.note_type {
                ui.label(format!("type: {nt}"));
            }
            if !node.families.is_empty() {
                ui.label(format!("families: {}", node.families.join(", ")));
            }
            ui.separator();
            for (name, value) in &node.extra {
                ui.label(format!("{name}:"));
                ui.monospace(value);
                ui.add_space(4.0);
            }
            ui.separator();
            if let Some(nid) = node.id.as_note() {
                ui.horizontal(|ui| {
                    if ui.button("Open full editor").clicked() {
                        net.send(&Command::Ctx(CtxAction::EditApi { note_id: nid }));
                    }
                    if ui.button("Reload styles").clicked() {
                        net.send(&Command::EmbedEditor(EmbedEditorCmd::CssReload));
                    }
                });
            }
        });

    // Report the mount rectangle so the host-side surface can align.
    if let Some(inner) = response {
        let rect = inner.response.rect;
        net.send(&Command::EmbedEditor(EmbedEditorCmd::Rect {
            x: rect.min.x,
            y: rect.min.y,
            w: rect.width(),
            h: rect.height(),
        }));
    }

    if !open {
        st.ui.editor_open = false;
        net.send(&Command::EmbedEditor(EmbedEditorCmd::Close));
    }
}
