use thiserror::Error;

use crate::ViewerId;

/// Errors raised while validating a `TrackerConfig`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The flush time budget is too small to send anything useful
    #[error("Flush time budget of {nanos}ns is below the minimum of {minimum}ns")]
    FlushBudgetTooSmall { nanos: u64, minimum: u64 },

    /// View distance outside the supported chunk range
    #[error("View distance of {chunks} chunks is outside the supported range 1..={maximum}")]
    ViewDistanceOutOfRange { chunks: u32, maximum: u32 },

    /// Backlog pressure thresholds must grow with duration
    #[error("Backlog pressure thresholds must be increasing: moderate {moderate_ms}ms, heavy {heavy_ms}ms")]
    PressureThresholdsNotIncreasing { moderate_ms: u128, heavy_ms: u128 },

    /// Compute thread count above what the engine will spawn
    #[error("Network compute thread count {threads} exceeds the maximum of {maximum}")]
    TooManyComputeThreads { threads: usize, maximum: usize },

    /// A periodic interval that must be at least one tick
    #[error("{field} must be at least 1 tick")]
    ZeroInterval { field: &'static str },

    /// The far tier must start at or beyond the mid tier
    #[error("LOD far distance must not be smaller than the mid distance")]
    LodDistancesNotIncreasing,

    /// Rotation thresholds compare absolute quaternion dot products
    #[error("LOD rotation threshold must be within 0.0..=1.0")]
    RotationThresholdOutOfRange,
}

/// Errors reported by a `PacketFactory` when handing payloads to a viewer's connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The viewer has no live connection
    #[error("{viewer} is not connected")]
    ViewerUnavailable { viewer: ViewerId },

    /// The connection refused or failed to write the payloads
    #[error("Failed to send {count} packet(s) to {viewer}: {reason}")]
    SendFailed {
        viewer: ViewerId,
        count: usize,
        reason: String,
    },
}
