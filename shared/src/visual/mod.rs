mod location;
mod visual_kind;

pub use location::{Location, Rotation};
pub use visual_kind::{VisualHandle, VisualKind};
