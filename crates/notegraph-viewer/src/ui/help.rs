use bevy::prelude::ResMut;
use bevy_egui::{egui, EguiContexts};

use crate::graph::GraphState;

pub fn help_overlay(mut contexts: EguiContexts, st: ResMut<GraphState>) {
    if !st.ui.help_open {
        return;
    }

    egui::Window::new("Help / Shortcuts")
        .collapsible(false)
        .resizable(false)
        .show(contexts.ctx_mut(), |ui| {
            ui.label("Ctrl+P — Search");
            ui.label("Esc — Clear selection, close overlays");
            ui.label("V — Fit view");
            ui.label("D — Debug overlay");
            ui.label("E — Embedded editor for selection");
            ui.label("Right click — Context menu");
            ui.label("Drag node — Move it (layout reheats locally)");
            ui.label("Wheel / middle drag — Zoom / pan");
            ui.label("? — Toggle help");
        });
}
