use crate::{ChunkCoord, Location, ViewerId};

/// Where a connected viewer stands this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewerFrame {
    pub viewer: ViewerId,
    pub location: Location,
}

impl ViewerFrame {
    pub fn new(viewer: ViewerId, location: Location) -> Self {
        Self { viewer, location }
    }

    pub fn chunk(&self) -> ChunkCoord {
        self.location.chunk()
    }
}

/// Host-side source of connected viewers, read once per tick on the dispatch thread.
pub trait SessionProvider {
    fn viewer_frames(&self) -> Vec<ViewerFrame>;

    /// Squared view distance in blocks for this tick.
    fn view_distance_squared(&self) -> f64;
}
