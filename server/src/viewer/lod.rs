use visync_shared::{LodConfig, Location, Rotation, Tick};

use crate::scheduler::SheddingState;

/// Distance tier of a visible Visual relative to its viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LodLevel {
    Near,
    Mid,
    Far,
}

impl LodLevel {
    pub fn resolve(distance_squared: f64, lod: &LodConfig) -> Self {
        if distance_squared <= lod.mid_distance_sq {
            LodLevel::Near
        } else if distance_squared <= lod.far_distance_sq {
            LodLevel::Mid
        } else {
            LodLevel::Far
        }
    }

    /// Minimum ticks between two teleports in this tier. `0` for NEAR.
    pub fn update_interval(&self, lod: &LodConfig, shedding: &SheddingState) -> u64 {
        match self {
            LodLevel::Near => 0,
            LodLevel::Mid => lod
                .mid_update_interval_ticks
                .saturating_mul(shedding.mid_interval_multiplier),
            LodLevel::Far => lod
                .far_update_interval_ticks
                .saturating_mul(shedding.far_interval_multiplier),
        }
    }
}

/// What one viewer was last sent for one of its visible Visuals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SentTransform {
    pub location: Location,
    pub rotation: Rotation,
    pub sent_at: Tick,
    /// A change above threshold is waiting for its tier interval.
    pub deferred: bool,
    /// A metadata update was held back by the tier or by shedding.
    pub metadata_owed: bool,
}

impl SentTransform {
    pub fn new(location: Location, rotation: Rotation, sent_at: Tick) -> Self {
        Self {
            location,
            rotation,
            sent_at,
            deferred: false,
            metadata_owed: false,
        }
    }

    /// Whether `location` or `rotation` differ from what was sent by more
    /// than the configured thresholds. A world change always counts.
    pub fn differs(&self, location: &Location, rotation: &Rotation, lod: &LodConfig) -> bool {
        if !self.location.same_world(location) {
            return true;
        }
        self.location.distance_squared(location) > lod.pos_threshold_sq
            || self.rotation.dot(rotation).abs() < lod.rot_threshold_dot
    }

    pub fn interval_reached(&self, tick: Tick, interval: u64) -> bool {
        tick.saturating_sub(self.sent_at) >= interval
    }

    pub fn mark_sent(&mut self, location: Location, rotation: Rotation, tick: Tick) {
        self.location = location;
        self.rotation = rotation;
        self.sent_at = tick;
        self.deferred = false;
    }
}
