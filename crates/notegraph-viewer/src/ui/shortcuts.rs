use bevy::prelude::{Res, ResMut};
use bevy_egui::{egui, EguiContexts};
use notegraph_core::{Command, EmbedEditorCmd};

use crate::app::resources::NetTx;
use crate::graph::GraphState;

pub fn handle_shortcuts(mut contexts: EguiContexts, mut st: ResMut<GraphState>, net: Res<NetTx>) {
    let ctx = contexts.ctx_mut();
    let esc_pressed = ctx.input(|i| i.key_pressed(egui::Key::Escape));
    let wants_keyboard = ctx.wants_keyboard_input();

    if esc_pressed {
        let mut changed = false;
        if st.ui.search_open {
            st.ui.search_open = false;
            changed = true;
        }
        if st.ui.help_open {
            st.ui.help_open = false;
            changed = true;
        }
        if st.ui.ctx_menu.is_some() {
            st.ui.ctx_menu = None;
            changed = true;
        }
        if st.ui.famedit.open {
            st.ui.famedit.open = false;
            changed = true;
        }
        if st.ui.deptree_open {
            st.ui.deptree_open = false;
            changed = true;
        }
        if st.ui.editor_open {
            st.ui.editor_open = false;
            net.send(&Command::EmbedEditor(EmbedEditorCmd::Close));
            changed = true;
        }
        if st.ui.selected.is_some() || st.ui.hovered.is_some() {
            st.ui.selected = None;
            st.ui.hovered = None;
            changed = true;
        }
        if changed {
            st.mark_redraw();
        }
    }

    if wants_keyboard {
        return;
    }

    if ctx.input(|i| i.key_pressed(egui::Key::P) && i.modifiers.ctrl) {
        st.ui.search_open = true;
    }
    if ctx.input(|i| i.key_pressed(egui::Key::Questionmark)) {
        st.ui.help_open = !st.ui.help_open;
    }
    if ctx.input(|i| i.key_pressed(egui::Key::V)) {
        st.ui.fit_to_view = true;
    }
    if ctx.input(|i| i.key_pressed(egui::Key::D)) {
        st.ui.hud_open = !st.ui.hud_open;
    }
    if ctx.input(|i| i.key_pressed(egui::Key::E)) {
        if let Some(id) = st.ui.selected.clone() {
            st.ui.editor_open = true;
            st.ui.editor_note = Some(id.clone());
            net.send(&Command::EmbedEditor(EmbedEditorCmd::Open));
            if let Some(nid) = id.as_note() {
                net.send(&Command::EmbedEditor(EmbedEditorCmd::Select { note_id: nid }));
            }
        }
    }
}
