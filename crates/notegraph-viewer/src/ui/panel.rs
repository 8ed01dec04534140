use bevy::prelude::{Res, ResMut, Resource};
use bevy_egui::{egui, EguiContexts};
use notegraph_core::{Command, EdgeStyle, Layer, LayerSettings, ViewSettings};
use std::collections::BTreeMap;

use crate::app::resources::NetTx;
use crate::graph::GraphState;

/// Local copies of everything the panel edits. Synced from meta whenever a
/// new revision arrives, so sliders don't fight the host round-trip.
#[derive(Resource, Default)]
pub struct PanelState {
    pub synced_rev: u64,
    pub synced_once: bool,
    pub layers: BTreeMap<Layer, LayerSettings>,
    pub settings: ViewSettings,
}

impl PanelState {
    fn sync(&mut self, st: &GraphState) {
        if self.synced_once && self.synced_rev == st.graph.meta.rev {
            return;
        }
        self.synced_rev = st.graph.meta.rev;
        self.synced_once = true;
        self.layers = st.graph.meta.layer_settings.clone();
        self.settings = st.graph.meta.settings.clone();
    }
}

fn hex_to_rgb(hex: &str) -> [u8; 3] {
    let (r, g, b) = crate::render::scene::parse_hex(hex);
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}

fn rgb_to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

pub fn ui_panel(
    mut contexts: EguiContexts,
    mut st: ResMut<GraphState>,
    mut panel: ResMut<PanelState>,
    net: Res<NetTx>,
) {
    panel.sync(&st);

    egui::SidePanel::left("left")
        .default_width(270.0)
        .show(contexts.ctx_mut(), |ui| {
            ui.heading("Notegraph");
            if let Some(err) = &st.conn_error {
                ui.colored_label(egui::Color32::LIGHT_RED, err);
            }
            if !st.connected {
                ui.colored_label(egui::Color32::YELLOW, "waiting for host…");
            }
            if st.graph.meta.error.as_deref() == Some("missing_tools_config") {
                ui.colored_label(egui::Color32::YELLOW, "No collection");
            }
            ui.label(format!(
                "nodes: {}  edges: {}  rev: {}",
                st.graph.nodes.len(),
                st.graph.edges.len(),
                st.graph.meta.rev
            ));

            ui.horizontal(|ui| {
                if ui.button("Refresh").clicked() {
                    net.send(&Command::Refresh);
                }
                if ui.button("Fit view").clicked() {
                    st.ui.fit_to_view = true;
                }
                if ui.button("Debug").clicked() {
                    st.ui.hud_open = !st.ui.hud_open;
                    net.send(&Command::Devtools);
                }
            });

            ui.add_space(6.0);
            ui.label("Filter (substring):");
            if ui.text_edit_singleline(&mut st.ui.filter).changed() {
                st.mark_redraw();
            }

            ui.add_space(8.0);
            ui.separator();
            ui.heading("Layers");
            egui::ScrollArea::vertical().show(ui, |ui| {
                layer_section(ui, &mut panel, &net);
                solver_section(ui, &mut panel, &net);
                flags_section(ui, &mut panel, &net);
            });
        });
}

fn layer_section(ui: &mut egui::Ui, panel: &mut PanelState, net: &NetTx) {
    for layer in Layer::ALL {
        let Some(ls) = panel.layers.get_mut(&layer) else {
            continue;
        };
        egui::CollapsingHeader::new(layer.as_str())
            .default_open(false)
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    if ui.checkbox(&mut ls.enabled, "enabled").changed() {
                        net.send(&Command::LayerEnabled {
                            layer,
                            on: ls.enabled,
                        });
                    }
                    let mut rgb = hex_to_rgb(&ls.color);
                    if ui.color_edit_button_srgb(&mut rgb).changed() {
                        ls.color = rgb_to_hex(rgb);
                        net.send(&Command::LayerColor {
                            layer,
                            color: ls.color.clone(),
                        });
                    }
                    if ui.checkbox(&mut ls.flow, "flow").changed() {
                        net.send(&Command::LayerFlow { layer, on: ls.flow });
                    }
                });

                let before = ls.style;
                egui::ComboBox::from_id_source((layer, "style"))
                    .selected_text(ls.style.as_str())
                    .show_ui(ui, |ui| {
                        for style in [
                            EdgeStyle::Solid,
                            EdgeStyle::Dashed,
                            EdgeStyle::Dotted,
                            EdgeStyle::Curved,
                        ] {
                            ui.selectable_value(&mut ls.style, style, style.as_str());
                        }
                    });
                if ls.style != before {
                    net.send(&Command::LayerStyle {
                        layer,
                        style: ls.style,
                    });
                }

                if ui
                    .add(egui::Slider::new(&mut ls.strength, 0.0..=5.0).text("strength"))
                    .changed()
                {
                    net.send(&Command::LayerStrength {
                        layer,
                        value: ls.strength,
                    });
                }
                if ui
                    .add(egui::Slider::new(&mut ls.weight, 0.0..=10.0).text("weight"))
                    .changed()
                {
                    net.send(&Command::LayerWeight {
                        layer,
                        value: ls.weight,
                    });
                }
                if ui
                    .add(egui::Slider::new(&mut ls.distance, 5.0..=400.0).text("distance"))
                    .changed()
                {
                    net.send(&Command::LayerDistance {
                        layer,
                        value: ls.distance,
                    });
                }
            });
    }
}

fn solver_slider(
    ui: &mut egui::Ui,
    table: &mut BTreeMap<String, f64>,
    net: &NetTx,
    key: &str,
    range: std::ops::RangeInclusive<f64>,
) {
    let Some(value) = table.get_mut(key) else {
        return;
    };
    if ui
        .add(egui::Slider::new(value, range).text(key))
        .changed()
    {
        net.send(&Command::SolverParam {
            key: key.to_string(),
            value: *value,
        });
    }
}

fn solver_section(ui: &mut egui::Ui, panel: &mut PanelState, net: &NetTx) {
    ui.add_space(8.0);
    ui.separator();
    ui.heading("Solver");
    let table = &mut panel.settings.solver;
    solver_slider(ui, table, net, "alpha_decay", 0.001..=0.2);
    solver_slider(ui, table, net, "velocity_decay", 0.05..=0.9);
    solver_slider(ui, table, net, "charge_strength", -400.0..=0.0);
    solver_slider(ui, table, net, "charge_theta", 0.3..=1.5);
    solver_slider(ui, table, net, "center_strength", 0.0..=0.3);
    solver_slider(ui, table, net, "soft_pin_radius", 20.0..=600.0);
    solver_slider(ui, table, net, "soft_pin_strength", 0.0..=0.5);
    solver_slider(ui, table, net, "hub_damping", 0.0..=1.0);
    solver_slider(ui, table, net, "ref_damping", 0.0..=1.0);
}

fn flags_section(ui: &mut egui::Ui, panel: &mut PanelState, net: &NetTx) {
    ui.add_space(8.0);
    ui.separator();
    ui.heading("Behavior");
    let s = &mut panel.settings;

    if ui.checkbox(&mut s.link_mst, "MST pruning").changed() {
        net.send(&Command::LinkMst { on: s.link_mst });
    }
    if ui.checkbox(&mut s.hub_damp, "hub damping").changed() {
        net.send(&Command::HubDamp { on: s.hub_damp });
    }
    if ui.checkbox(&mut s.ref_damp, "reference damping").changed() {
        net.send(&Command::RefDamp { on: s.ref_damp });
    }
    if ui
        .add(egui::Slider::new(&mut s.ref_auto, 0.0..=0.95).text("ref auto-weaken"))
        .changed()
    {
        net.send(&Command::RefAuto { value: s.ref_auto });
    }
    if ui.checkbox(&mut s.show_unlinked, "show unlinked").changed() {
        net.send(&Command::ShowUnlinked {
            on: s.show_unlinked,
        });
    }
    if ui
        .add(egui::Slider::new(&mut s.same_prio_opacity, 0.0..=1.0).text("same-prio opacity"))
        .changed()
    {
        net.send(&Command::SamePrioOpacity {
            value: s.same_prio_opacity,
        });
    }
    if ui.checkbox(&mut s.card_dot_enabled, "card dots").changed() {
        net.send(&Command::CardDotEnabled {
            on: s.card_dot_enabled,
        });
    }
}
