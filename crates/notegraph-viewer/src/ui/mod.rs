pub mod context_menu;
pub mod deptree;
pub mod editor_mount;
pub mod help;
pub mod hud;
pub mod panel;
pub mod search;
pub mod shortcuts;
pub mod tooltips;

pub use context_menu::context_menu;
pub use deptree::deptree_panel;
pub use editor_mount::editor_mount;
pub use help::help_overlay;
pub use hud::hud_overlay;
pub use panel::{ui_panel, PanelState};
pub use search::search_overlay;
pub use shortcuts::handle_shortcuts;
