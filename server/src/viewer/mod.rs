mod lod;
mod pending_destroy;
mod tracking_state;
mod viewer_slot;

pub use lod::{LodLevel, SentTransform};
pub use pending_destroy::{PendingDestroyBatch, PendingDestroyState};
pub use tracking_state::PlayerTrackingState;
pub use viewer_slot::ViewerSlot;
