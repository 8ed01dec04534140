mod app;
mod graph;
mod net;
mod render;
mod ui;

use app::resources::{NetRx, NetTx};
use app::NoteGraphViewerPlugin;
use bevy::prelude::*;
use bevy_egui::EguiPlugin;

fn sock_path() -> String {
    if let Ok(explicit) = std::env::var("NOTEGRAPH_SOCK") {
        return explicit;
    }
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        format!("{dir}/notegraph.sock")
    } else {
        "/tmp/notegraph.sock".to_string()
    }
}

fn main() {
    let (in_tx, in_rx) = crossbeam_channel::unbounded();
    let (out_tx, out_rx) = crossbeam_channel::unbounded();
    net::uds::spawn_io(sock_path(), in_tx, out_rx);

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Notegraph".into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(EguiPlugin)
        .insert_resource(NetRx(in_rx))
        .insert_resource(NetTx(out_tx))
        .add_plugins(NoteGraphViewerPlugin)
        .run();
}
