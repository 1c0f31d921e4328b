//! # Visync Shared
//! Identifiers, packet intents, configuration and collaborator traits shared
//! between the visync engine and the host adapters that feed it.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod chunk;
mod config;
mod error;
mod packet;
mod session;
mod types;
mod visual;

pub use chunk::{block_coord, view_distance_chunks, ChunkCoord, ChunkKey, CHUNK_SHIFT, CHUNK_SIZE_BLOCKS};
pub use config::{
    BacklogPressureConfig, LodConfig, TrackerConfig, MAX_NETWORK_COMPUTE_THREADS,
    MAX_VIEW_DISTANCE_CHUNKS, MIN_FLUSH_TIME_BUDGET_NANOS,
};
pub use error::{ConfigError, TransportError};
pub use packet::{
    DestroyIntent, MetadataEntry, MetadataIntent, MetadataValue, PacketFactory, PacketIntent,
    PacketPriority, SpawnIntent, SpawnKind, TeleportIntent,
};
pub use session::{SessionProvider, ViewerFrame};
pub use types::{Tick, TokenVersion, ViewerId, VisualId, WorldId};
pub use visual::{Location, Rotation, VisualHandle, VisualKind};
pub use uuid::Uuid;
