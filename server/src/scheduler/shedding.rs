use visync_shared::{Tick, VisualId};

use crate::viewer::LodLevel;

/// Queue depths summed over every viewer at the start of a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueBacklog {
    pub total_packets: usize,
    pub metadata_packets: usize,
    pub destroy_packets: usize,
    /// Ids hidden from a viewer whose DESTROY is not queued yet.
    pub pending_destroy_ids: usize,
}

impl QueueBacklog {
    /// True once either half of the destroy backlog reaches `threshold`. While
    /// set, viewers skip their visibility pass and drain extra DESTROYs.
    pub fn destroy_drain_fast_path(&self, threshold: usize) -> bool {
        let threshold = threshold.max(1);
        self.pending_destroy_ids >= threshold || self.destroy_packets >= threshold
    }
}

/// How hard the async phase backs off under queue backlog.
///
/// MID and FAR update intervals are multiplied by the two interval factors.
/// Non-critical metadata outside the NEAR tier is kept for only one Visual in
/// `metadata_drop_modulo` per tick; the rest stays owed for a later tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SheddingState {
    pub intensity: u8,
    pub mid_interval_multiplier: u64,
    pub far_interval_multiplier: u64,
    pub metadata_drop_modulo: u64,
}

impl SheddingState {
    pub const MAX_INTENSITY: u8 = 4;

    pub const fn disabled() -> Self {
        Self {
            intensity: 0,
            mid_interval_multiplier: 1,
            far_interval_multiplier: 1,
            metadata_drop_modulo: 1,
        }
    }

    pub fn of(intensity: u8) -> Self {
        let (mid, far, modulo) = match intensity {
            0 => return Self::disabled(),
            1 => (2, 2, 2),
            2 => (2, 3, 3),
            3 => (3, 4, 4),
            _ => (4, 6, 6),
        };
        Self {
            intensity: intensity.min(Self::MAX_INTENSITY),
            mid_interval_multiplier: mid,
            far_interval_multiplier: far,
            metadata_drop_modulo: modulo,
        }
    }

    pub fn is_active(&self) -> bool {
        self.intensity > 0
    }

    /// Whether a non-critical metadata update of `id` is held back this tick.
    pub fn drops_metadata(&self, id: VisualId, tick: Tick, level: LodLevel) -> bool {
        if level == LodLevel::Near || self.metadata_drop_modulo <= 1 {
            return false;
        }
        let mixed = u64::from(id.value()).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ tick;
        mixed % self.metadata_drop_modulo != 0
    }
}

impl Default for SheddingState {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Maps the tick's backlog to a `SheddingState`. Each of a deep total queue,
/// a deep metadata lane and a deep destroy backlog adds one step; an active
/// destroy drain fast path adds two.
pub fn resolve_shedding(backlog: &QueueBacklog, destroy_backlog_threshold: usize) -> SheddingState {
    let threshold = destroy_backlog_threshold.max(1);
    let destroy_depth = backlog.destroy_packets + backlog.pending_destroy_ids;

    let mut intensity = 0u8;
    if backlog.total_packets > threshold {
        intensity += 1;
    }
    if backlog.metadata_packets > threshold / 2 {
        intensity += 1;
    }
    if destroy_depth > threshold {
        intensity += 1;
    }
    if backlog.destroy_drain_fast_path(threshold) {
        intensity += 2;
    }
    SheddingState::of(intensity.min(SheddingState::MAX_INTENSITY))
}
