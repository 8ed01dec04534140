pub mod layout;
pub mod metrics;
pub mod model;
pub mod mst;
pub mod quadtree;
pub mod state;

pub use layout::update_layout;
pub use state::GraphState;
