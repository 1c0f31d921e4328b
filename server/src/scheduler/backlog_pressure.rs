use std::time::Duration;

use visync_shared::BacklogPressureConfig;

pub const PRESSURE_NONE: usize = 1;
pub const PRESSURE_MODERATE: usize = 2;
pub const PRESSURE_HEAVY: usize = 4;

/// Maps how long the last async phase took to a catch-up multiplier for the
/// visibility cursor. Monotonic in `last_phase`.
pub fn resolve_backlog_pressure_multiplier(
    last_phase: Duration,
    config: &BacklogPressureConfig,
) -> usize {
    if last_phase >= config.heavy_threshold {
        PRESSURE_HEAVY
    } else if last_phase >= config.moderate_threshold {
        PRESSURE_MODERATE
    } else {
        PRESSURE_NONE
    }
}
