mod token_service;
mod tombstone_service;
mod tracked_visual;
mod visual_registry;

pub use token_service::VisualTokenService;
pub use tombstone_service::VisualTombstoneService;
pub use tracked_visual::{DirtyFlags, TrackedVisual, VisualSnapshot};
pub use visual_registry::{Registration, StateUpdate, VisualRegistry};
