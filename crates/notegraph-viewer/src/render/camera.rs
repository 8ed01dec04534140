use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::prelude::*;
use bevy_egui::EguiContexts;

use crate::graph::GraphState;

/// Camera height that corresponds to zoom 1.0.
pub const BASE_HEIGHT: f32 = 420.0;

#[derive(Resource)]
pub struct CameraRig {
    pub center: Vec3,
    pub height: f32,
    pub target_center: Vec3,
    pub target_height: f32,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            height: BASE_HEIGHT,
            target_center: Vec3::ZERO,
            target_height: BASE_HEIGHT,
        }
    }
}

impl CameraRig {
    pub fn zoom(&self) -> f32 {
        BASE_HEIGHT / self.height.max(1.0)
    }
}

pub fn setup_scene(mut commands: Commands) {
    commands.spawn(PointLightBundle {
        point_light: PointLight {
            intensity: 80_000_000.0,
            range: 4000.0,
            shadows_enabled: false,
            ..default()
        },
        transform: Transform::from_xyz(0.0, 600.0, 120.0),
        ..default()
    });

    commands.spawn(Camera3dBundle {
        transform: Transform::from_xyz(0.0, BASE_HEIGHT, BASE_HEIGHT * 0.25)
            .looking_at(Vec3::ZERO, Vec3::Y),
        ..default()
    });
}

/// Wheel zoom (clamped to the configured ratio range) and drag panning.
/// Left-drag pans only when it starts on empty space; node dragging and egui
/// own their pointer.
pub fn camera_controls(
    mut rig: ResMut<CameraRig>,
    mut wheel: EventReader<MouseWheel>,
    mut motion: EventReader<MouseMotion>,
    buttons: Res<ButtonInput<MouseButton>>,
    mut contexts: EguiContexts,
    st: Res<GraphState>,
) {
    let over_egui = contexts.ctx_mut().wants_pointer_input();

    let zoom_min = st.rv("zoom_min", 0.2).max(0.05);
    let zoom_max = st.rv("zoom_max", 8.0).max(zoom_min);
    let min_height = BASE_HEIGHT / zoom_max;
    let max_height = BASE_HEIGHT / zoom_min;

    for ev in wheel.read() {
        if over_egui {
            continue;
        }
        let factor = (1.0 - ev.y * 0.1).clamp(0.5, 1.5);
        rig.target_height = (rig.target_height * factor).clamp(min_height, max_height);
    }

    let mut delta = Vec2::ZERO;
    for ev in motion.read() {
        delta += ev.delta;
    }

    let panning = !over_egui
        && (buttons.pressed(MouseButton::Middle)
            || (buttons.pressed(MouseButton::Left)
                && st.ui.dragging.is_none()
                && st.ui.hovered.is_none()));
    if panning && delta != Vec2::ZERO {
        let scale = rig.height / 600.0;
        let pan = Vec3::new(-delta.x * scale, 0.0, -delta.y * scale);
        rig.target_center += pan;
        // Panning tracks the pointer without easing.
        rig.center += pan;
    }
}

/// Eased transitions, jump-to-node and fit-to-view, then the actual camera
/// transform.
pub fn apply_camera(
    time: Res<Time>,
    mut rig: ResMut<CameraRig>,
    mut st: ResMut<GraphState>,
    mut cam_q: Query<&mut Transform, With<Camera>>,
) {
    if st.ui.fit_to_view {
        st.ui.fit_to_view = false;
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for pos in st.spatial.positions.values() {
            min = min.min(*pos);
            max = max.max(*pos);
        }
        if min.x.is_finite() {
            rig.target_center = (min + max) * 0.5;
            let extent = (max.x - min.x).max(max.z - min.z).max(40.0);
            rig.target_height = (extent * 1.2).clamp(BASE_HEIGHT * 0.2, BASE_HEIGHT * 6.0);
        }
    }

    if let Some(id) = st.ui.jump_to.take() {
        if let Some(pos) = st.spatial.positions.get(&id).copied() {
            rig.target_center = pos;
            rig.target_height = rig.target_height.min(BASE_HEIGHT * 0.6);
        }
        st.ui.selected = Some(id);
        st.mark_redraw();
    }

    let ms = st.rv("transition_ms", 450.0).max(16.0);
    let k = (time.delta_seconds() * 1000.0 / ms).clamp(0.0, 1.0);
    rig.center = rig.center.lerp(rig.target_center, k);
    rig.height += (rig.target_height - rig.height) * k;

    let Ok(mut tf) = cam_q.get_single_mut() else {
        return;
    };
    let eye = rig.center + Vec3::new(0.0, rig.height, rig.height * 0.25);
    *tf = Transform::from_translation(eye).looking_at(rig.center, Vec3::Y);

    if (rig.center - rig.target_center).length() > 0.05
        || (rig.height - rig.target_height).abs() > 0.05
    {
        st.mark_redraw();
    }
}
