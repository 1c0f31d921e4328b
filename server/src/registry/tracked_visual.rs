use visync_shared::{ChunkKey, Location, Rotation, VisualHandle, VisualId};

/// Per-tick change flags of a Visual.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    pub position_changed: bool,
    pub metadata_dirty: bool,
    pub metadata_critical: bool,
}

impl DirtyFlags {
    pub fn is_clear(&self) -> bool {
        !self.position_changed && !self.metadata_dirty
    }
}

/// Canonical state of one registered Visual.
///
/// Producers write into `pending`; `begin_tick` moves it into `frame`, which is
/// what the async phase reads for the rest of the tick.
pub struct TrackedVisual {
    handle: VisualHandle,
    location: Location,
    rotation: Rotation,
    pending: DirtyFlags,
    frame: DirtyFlags,
}

impl TrackedVisual {
    pub(crate) fn new(handle: VisualHandle, location: Location, rotation: Rotation) -> Self {
        Self {
            handle,
            location,
            rotation,
            pending: DirtyFlags::default(),
            frame: DirtyFlags::default(),
        }
    }

    pub fn id(&self) -> VisualId {
        self.handle.id()
    }

    pub fn handle(&self) -> &VisualHandle {
        &self.handle
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn rotation(&self) -> &Rotation {
        &self.rotation
    }

    pub fn chunk_key(&self) -> ChunkKey {
        self.location.chunk_key()
    }

    /// Flags visible to the current async phase.
    pub fn frame_flags(&self) -> DirtyFlags {
        self.frame
    }

    pub fn pending_flags(&self) -> DirtyFlags {
        self.pending
    }

    pub(crate) fn update(&mut self, location: Location, rotation: Rotation) {
        if self.location != location || self.rotation != rotation {
            self.pending.position_changed = true;
        }
        self.location = location;
        self.rotation = rotation;
    }

    /// Critical never downgrades until the next `begin_tick`.
    pub(crate) fn mark_meta_dirty(&mut self, critical: bool) {
        self.pending.metadata_dirty = true;
        self.pending.metadata_critical |= critical;
    }

    pub(crate) fn begin_tick(&mut self) {
        self.frame = std::mem::take(&mut self.pending);
    }

    pub(crate) fn snapshot(&self) -> VisualSnapshot {
        VisualSnapshot {
            handle: self.handle.clone(),
            location: self.location,
            rotation: self.rotation,
            flags: self.frame,
        }
    }
}

/// Copy of a Visual's state taken under its lock, safe to use after the lock is released.
#[derive(Clone)]
pub struct VisualSnapshot {
    pub handle: VisualHandle,
    pub location: Location,
    pub rotation: Rotation,
    pub flags: DirtyFlags,
}

impl VisualSnapshot {
    pub fn id(&self) -> VisualId {
        self.handle.id()
    }
}
