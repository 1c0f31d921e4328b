use std::time::Duration;

use crate::ConfigError;

pub const MIN_FLUSH_TIME_BUDGET_NANOS: u64 = 100_000;
pub const MAX_VIEW_DISTANCE_CHUNKS: u32 = 64;
pub const MAX_NETWORK_COMPUTE_THREADS: usize = 64;

/// Contains Config properties which will be used by the visual tracker
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// Worker threads used by the async compute phase. `0` runs the phase
    /// inline on the thread that calls `tick`.
    pub network_compute_threads: usize,
    /// Hard cutoff for the dispatch drain of a single tick, across all viewers
    pub flush_time_budget_nanos: u64,
    /// Byte cap per viewer per tick. `0` disables the cap
    pub max_bytes_per_tick: usize,
    /// Packet cap per viewer per tick. `0` disables the cap
    pub max_packets_per_tick: usize,
    /// Default view distance, used when a tick does not supply its own
    pub view_distance_chunks: u32,
    /// Candidates tested per viewer per tick before the backlog multiplier
    /// is applied. `0` tests the whole candidate list at once
    pub max_visibility_updates_per_tick: usize,
    /// Visible Visuals checked for transform/metadata changes per viewer per tick.
    /// `0` checks all of them
    pub max_transform_checks_per_tick: usize,
    /// A viewer's candidate list is rebuilt at least this often
    pub full_recalc_interval_ticks: u64,
    /// How long an unregistered id stays closed to late updates
    pub tombstone_ttl_ticks: u64,
    /// Batch size at which unregistering switches to the visible-set scan path
    pub bulk_destroy_threshold: usize,
    /// Maps async phase duration to catch-up work
    pub backlog_pressure: BacklogPressureConfig,
    /// Distance tiers that thin out transform and metadata updates
    pub lod: LodConfig,
    /// Destroy backlog (pending ids or queued DESTROY packets, across all
    /// viewers) at which the destroy drain fast path engages and load
    /// shedding ramps up
    pub destroy_backlog_threshold: usize,
    /// Extra DESTROY packets a viewer may receive past `max_packets_per_tick`
    /// while the fast path is active
    pub destroy_drain_extra_packets_per_tick: usize,
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_time_budget_nanos < MIN_FLUSH_TIME_BUDGET_NANOS {
            return Err(ConfigError::FlushBudgetTooSmall {
                nanos: self.flush_time_budget_nanos,
                minimum: MIN_FLUSH_TIME_BUDGET_NANOS,
            });
        }
        if self.view_distance_chunks == 0 || self.view_distance_chunks > MAX_VIEW_DISTANCE_CHUNKS {
            return Err(ConfigError::ViewDistanceOutOfRange {
                chunks: self.view_distance_chunks,
                maximum: MAX_VIEW_DISTANCE_CHUNKS,
            });
        }
        if self.network_compute_threads > MAX_NETWORK_COMPUTE_THREADS {
            return Err(ConfigError::TooManyComputeThreads {
                threads: self.network_compute_threads,
                maximum: MAX_NETWORK_COMPUTE_THREADS,
            });
        }
        if self.full_recalc_interval_ticks == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "full_recalc_interval_ticks",
            });
        }
        self.backlog_pressure.validate()?;
        self.lod.validate()
    }

    /// Squared view distance in blocks for the configured chunk radius.
    pub fn view_distance_squared(&self) -> f64 {
        let blocks = f64::from(self.view_distance_chunks) * crate::CHUNK_SIZE_BLOCKS;
        blocks * blocks
    }

    pub fn flush_time_budget(&self) -> Duration {
        Duration::from_nanos(self.flush_time_budget_nanos)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            network_compute_threads: 2,
            flush_time_budget_nanos: 2_000_000,
            max_bytes_per_tick: 64 * 1024,
            max_packets_per_tick: 0,
            view_distance_chunks: 8,
            max_visibility_updates_per_tick: 256,
            max_transform_checks_per_tick: 0,
            full_recalc_interval_ticks: 20,
            tombstone_ttl_ticks: 40,
            bulk_destroy_threshold: 64,
            backlog_pressure: BacklogPressureConfig::default(),
            lod: LodConfig::default(),
            destroy_backlog_threshold: 512,
            destroy_drain_extra_packets_per_tick: 128,
        }
    }
}

/// Async phase durations at or above `moderate_threshold` double the
/// visibility catch-up work; at or above `heavy_threshold` they quadruple it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BacklogPressureConfig {
    pub moderate_threshold: Duration,
    pub heavy_threshold: Duration,
}

impl BacklogPressureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.moderate_threshold >= self.heavy_threshold {
            return Err(ConfigError::PressureThresholdsNotIncreasing {
                moderate_ms: self.moderate_threshold.as_millis(),
                heavy_ms: self.heavy_threshold.as_millis(),
            });
        }
        Ok(())
    }
}

impl Default for BacklogPressureConfig {
    fn default() -> Self {
        Self {
            moderate_threshold: Duration::from_millis(50),
            heavy_threshold: Duration::from_millis(90),
        }
    }
}

/// Transform and metadata thinning by viewer distance.
///
/// A visible Visual within `mid_distance_sq` of the viewer is NEAR and gets
/// every change above the thresholds right away. Up to `far_distance_sq` it
/// is MID, beyond that FAR; those tiers send a change at most once per their
/// update interval. FAR Visuals only get non-critical metadata when
/// `far_allow_metadata_updates` is set.
#[derive(Clone, Debug, PartialEq)]
pub struct LodConfig {
    /// Squared distance in blocks a Visual must move before a teleport is sent
    pub pos_threshold_sq: f64,
    /// A rotation counts as changed once the absolute dot product with the
    /// last sent rotation drops below this
    pub rot_threshold_dot: f32,
    pub mid_distance_sq: f64,
    pub far_distance_sq: f64,
    pub mid_update_interval_ticks: u64,
    pub far_update_interval_ticks: u64,
    pub far_allow_metadata_updates: bool,
}

impl LodConfig {
    /// Every visible Visual is NEAR.
    pub fn near_only() -> Self {
        Self {
            mid_distance_sq: f64::INFINITY,
            far_distance_sq: f64::INFINITY,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.far_distance_sq < self.mid_distance_sq {
            return Err(ConfigError::LodDistancesNotIncreasing);
        }
        if !(0.0..=1.0).contains(&self.rot_threshold_dot) {
            return Err(ConfigError::RotationThresholdOutOfRange);
        }
        if self.mid_update_interval_ticks == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "mid_update_interval_ticks",
            });
        }
        if self.far_update_interval_ticks == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "far_update_interval_ticks",
            });
        }
        Ok(())
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            pos_threshold_sq: 0.01 * 0.01,
            rot_threshold_dot: 0.9999,
            mid_distance_sq: 24.0 * 24.0,
            far_distance_sq: 56.0 * 56.0,
            mid_update_interval_ticks: 2,
            far_update_interval_ticks: 4,
            far_allow_metadata_updates: false,
        }
    }
}
