use std::sync::Arc;

use uuid::Uuid;

use crate::{Location, MetadataIntent, Rotation, SpawnIntent, VisualId};

/// Capability interface implemented by every kind of Visual the host can show
/// (armor stands, item displays, block displays, ...). The engine never looks
/// inside a Visual; it only asks it for the data a `PacketFactory` needs.
pub trait VisualKind: Send + Sync {
    /// Stable id, shared with the host's entity id space.
    fn id(&self) -> VisualId;

    /// Client-side uuid of the spawned stand-in.
    fn uuid(&self) -> Uuid;

    /// Data needed to spawn this Visual at the given pose.
    fn spawn_intent(&self, location: &Location, rotation: &Rotation) -> SpawnIntent;

    /// Current metadata values, read when the Visual's metadata was marked dirty.
    fn metadata_intent(&self) -> MetadataIntent;

    /// Ground flag sent with teleports to this pose. Stand-ins float by default.
    fn on_ground(&self, _location: &Location) -> bool {
        false
    }
}

/// Shared handle to a registered Visual.
pub type VisualHandle = Arc<dyn VisualKind>;
