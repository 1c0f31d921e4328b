//! # Visync Server
//! Keeps server-authoritative Visuals synchronized to connected viewers:
//! a chunk grid narrows each viewer's candidates, an incremental visibility
//! pass decides what to spawn and destroy, per-viewer priority queues coalesce
//! redundant updates, and a budgeted dispatcher hands packets to the host's
//! transport every tick.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

#[macro_use]
extern crate cfg_if;

pub mod shared {
    pub use visync_shared::{
        ChunkCoord, ChunkKey, DestroyIntent, Location, LodConfig, MetadataIntent, MetadataValue,
        PacketFactory, PacketIntent, PacketPriority, Rotation, SessionProvider, SpawnIntent,
        TeleportIntent, TrackerConfig, TransportError, ViewerFrame, ViewerId, VisualHandle,
        VisualId, VisualKind,
    };
}

mod error;
mod grid;
mod packet;
mod registry;
mod scheduler;
mod sync;
mod tracker;
mod viewer;

pub use error::TrackerError;
pub use grid::ChunkGridIndex;
pub use packet::{
    EnqueueResult, HeadAction, PacketHeader, PlayerPacketQueue, Polled, QueuedPacket,
};
pub use registry::{
    DirtyFlags, Registration, StateUpdate, TrackedVisual, VisualRegistry, VisualSnapshot,
    VisualTokenService, VisualTombstoneService,
};
pub use scheduler::{
    drain_queue, resolve_backlog_pressure_multiplier, resolve_shedding, AsyncPhaseCoordinator,
    AsyncPhaseRequest, AsyncPhaseRunner, DestroyBurst, DrainBudget, DrainReport, PhaseExecutor,
    PhaseParallelism, PhaseSubmission, QueueBacklog, RenderNetworkBudgetScheduler, SheddingState,
    TrackerStats, ViewerDrain, PRESSURE_HEAVY, PRESSURE_MODERATE, PRESSURE_NONE,
};
pub use tracker::VisualTracker;
pub use viewer::{
    LodLevel, PendingDestroyBatch, PendingDestroyState, PlayerTrackingState, SentTransform,
    ViewerSlot,
};
