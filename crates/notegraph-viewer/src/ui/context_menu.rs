use bevy::prelude::{Res, ResMut};
use bevy_egui::{egui, EguiContexts};
use notegraph_core::{Command, CtxAction, CtxPayload, Layer, NodeId, NodeKind};

use crate::app::resources::NetTx;
use crate::graph::state::CtxTarget;
use crate::graph::GraphState;

fn payload_pair(source: &NodeId, target: &NodeId) -> CtxPayload {
    CtxPayload {
        source: source.as_note(),
        target: target.as_note(),
        ..CtxPayload::default()
    }
}

pub fn context_menu(mut contexts: EguiContexts, mut st: ResMut<GraphState>, net: Res<NetTx>) {
    famedit_dialog(&mut contexts, &mut st, &net);

    let Some(menu) = st.ui.ctx_menu.clone() else {
        return;
    };
    let ctx = contexts.ctx_mut().clone();
    let mut close = false;

    egui::Area::new(egui::Id::new("ctx_menu"))
        .order(egui::Order::Foreground)
        .fixed_pos(egui::pos2(menu.screen.0, menu.screen.1))
        .show(&ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.set_min_width(180.0);
                match &menu.target {
                    CtxTarget::Node(id) => close = node_menu(ui, &mut st, &net, id),
                    CtxTarget::Edge(ei) => close = edge_menu(ui, &mut st, &net, *ei),
                    CtxTarget::Background => {
                        if ui.button("Refresh graph").clicked() {
                            net.send(&Command::Refresh);
                            close = true;
                        }
                        if ui.button("Fit view").clicked() {
                            st.ui.fit_to_view = true;
                            close = true;
                        }
                    }
                }
            });
        });

    // Left-click elsewhere and Esc are handled by the interaction systems.
    if close {
        st.ui.ctx_menu = None;
    }
}

fn node_menu(ui: &mut egui::Ui, st: &mut GraphState, net: &NetTx, id: &NodeId) -> bool {
    let mut close = false;
    let Some(node) = st.node(id).cloned() else {
        return true;
    };
    ui.label(&node.label);
    ui.separator();

    match node.kind {
        NodeKind::Note => {
            let nid = id.as_note().unwrap_or_default();
            if ui.button("Preview").clicked() {
                net.send(&Command::Ctx(CtxAction::Preview { note_id: nid }));
                close = true;
            }
            if ui.button("Edit").clicked() {
                net.send(&Command::Ctx(CtxAction::Edit { note_id: nid }));
                close = true;
            }
            if ui.button("Open in browser").clicked() {
                net.send(&Command::Ctx(CtxAction::Browser { note_id: nid }));
                close = true;
            }
            if ui.button("Dependency tree").clicked() {
                net.send(&Command::DepTree { note_id: nid });
                close = true;
            }
            if ui.button("Embedded editor").clicked() {
                st.ui.editor_open = true;
                st.ui.editor_note = Some(id.clone());
                net.send(&Command::EmbedEditor(notegraph_core::EmbedEditorCmd::Open));
                net.send(&Command::EmbedEditor(notegraph_core::EmbedEditorCmd::Select {
                    note_id: nid,
                }));
                close = true;
            }

            if let Some(selected) = st.ui.selected.clone() {
                if selected != *id && selected.as_note().is_some() {
                    ui.separator();
                    if ui.button("Link selected → this").clicked() {
                        net.send(&Command::Ctx(CtxAction::LinkActive(payload_pair(
                            &selected, id,
                        ))));
                        close = true;
                    }
                    if ui.button("Link both ways").clicked() {
                        net.send(&Command::Ctx(CtxAction::LinkBoth(payload_pair(
                            &selected, id,
                        ))));
                        close = true;
                    }
                    if ui.button("Unlink both ways").clicked() {
                        net.send(&Command::Ctx(CtxAction::UnlinkBoth(payload_pair(
                            &selected, id,
                        ))));
                        close = true;
                    }
                    if ui.button("Connect into this family").clicked() {
                        net.send(&Command::Ctx(CtxAction::Connect(CtxPayload {
                            source: selected.as_note(),
                            target: id.as_note(),
                            prio_mode: Some("below".to_string()),
                            ..CtxPayload::default()
                        })));
                        close = true;
                    }
                    if ui.button("Disconnect from shared families").clicked() {
                        net.send(&Command::Ctx(CtxAction::Disconnect(payload_pair(
                            &selected, id,
                        ))));
                        close = true;
                    }
                }
            }

            if let Some(fid) = node.families.first() {
                ui.separator();
                if ui.button(format!("Rename family “{fid}”…")).clicked() {
                    st.ui.famedit = crate::graph::state::FameditDialog {
                        open: true,
                        old_fid: fid.clone(),
                        new_fid: fid.clone(),
                        preview: None,
                        result: None,
                    };
                    close = true;
                }
            }
        }
        NodeKind::Family => {
            if let Some(fid) = id.family_id() {
                if ui.button("Rename family…").clicked() {
                    st.ui.famedit = crate::graph::state::FameditDialog {
                        open: true,
                        old_fid: fid.to_string(),
                        new_fid: fid.to_string(),
                        preview: None,
                        result: None,
                    };
                    close = true;
                }
                if ui.button("Browse members").clicked() {
                    net.send(&Command::Ctx(CtxAction::Filter {
                        query: format!("family:{fid}"),
                    }));
                    close = true;
                }
            }
        }
        NodeKind::KanjiHub => {
            if ui.button("Filter to this kanji").clicked() {
                st.ui.filter = node.label.clone();
                st.mark_redraw();
                close = true;
            }
        }
    }
    close
}

fn edge_menu(ui: &mut egui::Ui, st: &mut GraphState, net: &NetTx, ei: usize) -> bool {
    let mut close = false;
    let Some(edge) = st.graph.edges.get(ei).cloned() else {
        return true;
    };
    ui.label(format!("{} edge", edge.layer.as_str()));
    ui.separator();

    match edge.layer {
        Layer::Notes | Layer::NoteLinks => {
            if ui.button("Unlink").clicked() {
                net.send(&Command::Ctx(CtxAction::Unlink(payload_pair(
                    &edge.source,
                    &edge.target,
                ))));
                close = true;
            }
            if edge.bidirectional && ui.button("Unlink both ways").clicked() {
                net.send(&Command::Ctx(CtxAction::UnlinkBoth(payload_pair(
                    &edge.source,
                    &edge.target,
                ))));
                close = true;
            }
        }
        Layer::Priority | Layer::Families => {
            let (note_end, other_end) = if edge.source.as_note().is_some() {
                (edge.source.clone(), edge.target.clone())
            } else {
                (edge.target.clone(), edge.source.clone())
            };
            if ui.button("Disconnect").clicked() {
                let families = other_end
                    .family_id()
                    .map(|fid| vec![fid.to_string()])
                    .or_else(|| {
                        st.node(&other_end)
                            .map(|n| n.families.clone())
                            .filter(|f| !f.is_empty())
                    });
                net.send(&Command::Ctx(CtxAction::Disconnect(CtxPayload {
                    source: note_end.as_note(),
                    target: other_end.as_note(),
                    families,
                    ..CtxPayload::default()
                })));
                close = true;
            }
        }
        _ => {
            ui.label("derived edge");
        }
    }
    close
}

fn famedit_dialog(contexts: &mut EguiContexts, st: &mut GraphState, net: &NetTx) {
    if !st.ui.famedit.open {
        return;
    }
    let ctx = contexts.ctx_mut().clone();
    let mut famedit = st.ui.famedit.clone();
    let mut open = famedit.open;

    egui::Window::new("Rename family")
        .open(&mut open)
        .collapsible(false)
        .show(&ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("From:");
                ui.text_edit_singleline(&mut famedit.old_fid);
            });
            ui.horizontal(|ui| {
                ui.label("To:");
                ui.text_edit_singleline(&mut famedit.new_fid);
            });

            ui.horizontal(|ui| {
                if ui.button("Preview").clicked() {
                    famedit.preview = None;
                    famedit.result = None;
                    net.send(&Command::Ctx(CtxAction::FamilyEditPreview(CtxPayload {
                        old_fid: Some(famedit.old_fid.clone()),
                        new_fid: Some(famedit.new_fid.clone()),
                        ..CtxPayload::default()
                    })));
                }
                let can_apply = famedit.preview.as_ref().is_some_and(|p| p.ok);
                if ui
                    .add_enabled(can_apply, egui::Button::new("Apply"))
                    .clicked()
                {
                    net.send(&Command::Ctx(CtxAction::FamilyEditApply(CtxPayload {
                        old_fid: Some(famedit.old_fid.clone()),
                        new_fid: Some(famedit.new_fid.clone()),
                        ..CtxPayload::default()
                    })));
                }
            });

            if let Some(p) = &famedit.preview {
                ui.separator();
                if p.ok {
                    ui.label(format!(
                        "scanned {} / affected {} / collisions {}",
                        p.scanned_notes, p.affected_notes, p.collisions
                    ));
                } else {
                    ui.colored_label(
                        egui::Color32::LIGHT_RED,
                        p.error.clone().unwrap_or_else(|| "preview failed".into()),
                    );
                }
            }
            if let Some(r) = &famedit.result {
                ui.separator();
                if r.ok {
                    ui.label(format!("changed {} notes", r.changed_notes));
                } else {
                    ui.colored_label(
                        egui::Color32::LIGHT_RED,
                        r.error.clone().unwrap_or_else(|| "apply failed".into()),
                    );
                }
            }
        });

    famedit.open = open;
    // Keep host-delivered results if they arrived while the frame rendered.
    if st.ui.famedit.preview.is_some() && famedit.preview.is_none() {
        famedit.preview = st.ui.famedit.preview.clone();
    }
    if st.ui.famedit.result.is_some() && famedit.result.is_none() {
        famedit.result = st.ui.famedit.result.clone();
    }
    st.ui.famedit = famedit;
}
