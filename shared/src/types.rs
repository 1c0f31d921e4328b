use std::fmt;

/// Server tick counter. Monotonic for the lifetime of a tracker.
pub type Tick = u64;

/// Per-visual registration version, see `VisualTokenService`.
pub type TokenVersion = u64;

/// Stable integer id of a Visual, assigned by the host.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct VisualId(u32);

impl VisualId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for VisualId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for VisualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Visual({})", self.0)
    }
}

// ViewerId
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct ViewerId(u64);

impl ViewerId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Viewer({})", self.0)
    }
}

// WorldId
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct WorldId(u64);

impl WorldId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}
