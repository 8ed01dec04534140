pub mod camera;
pub mod programs;
pub mod scene;

pub use camera::{apply_camera, camera_controls, setup_scene, CameraRig};
pub use programs::ProgramRegistry;
pub use scene::{draw_scene, hover_detection, pointer_interaction};
