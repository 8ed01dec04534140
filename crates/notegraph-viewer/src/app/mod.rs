use bevy::prelude::*;

use crate::app::resources::NetRx;
use crate::graph::GraphState;
use crate::render::{CameraRig, ProgramRegistry};
use crate::ui::PanelState;

pub mod resources;

pub struct NoteGraphViewerPlugin;

impl Plugin for NoteGraphViewerPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(GraphState::default())
            .insert_resource(CameraRig::default())
            .insert_resource(ProgramRegistry::default())
            .insert_resource(PanelState::default())
            .add_systems(Startup, crate::render::setup_scene)
            .add_systems(
                Update,
                (
                    pump_network,
                    crate::ui::handle_shortcuts,
                    crate::ui::ui_panel,
                    crate::ui::search_overlay,
                    crate::ui::help_overlay,
                    crate::ui::hud_overlay,
                    crate::ui::context_menu,
                    crate::ui::deptree_panel,
                    crate::ui::editor_mount,
                    crate::render::hover_detection,
                    crate::render::pointer_interaction,
                    crate::render::camera_controls,
                    crate::graph::update_layout,
                    crate::render::apply_camera,
                    crate::render::draw_scene,
                )
                    .chain(),
            );
    }
}

fn pump_network(mut st: ResMut<GraphState>, rx: Res<NetRx>) {
    for msg in rx.0.try_iter().take(100_000) {
        st.apply(msg);
    }
}
