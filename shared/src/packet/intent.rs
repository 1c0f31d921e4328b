use uuid::Uuid;

use crate::{Location, PacketPriority, Rotation, VisualId};

/// Host-defined entity type used to spawn a Visual's stand-in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpawnKind(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub struct SpawnIntent {
    pub kind: SpawnKind,
    pub id: VisualId,
    pub uuid: Uuid,
    pub position: [f64; 3],
    pub yaw: f32,
    pub pitch: f32,
    pub rotation: Rotation,
}

impl SpawnIntent {
    pub fn new(kind: SpawnKind, id: VisualId, uuid: Uuid, location: &Location, rotation: &Rotation) -> Self {
        Self {
            kind,
            id,
            uuid,
            position: location.position(),
            yaw: location.yaw,
            pitch: location.pitch,
            rotation: *rotation,
        }
    }
}

/// Moves an already spawned stand-in. Carries the full pose, so a
/// rotation-only change is delivered the same way as a move.
#[derive(Clone, Debug, PartialEq)]
pub struct TeleportIntent {
    pub id: VisualId,
    pub position: [f64; 3],
    pub yaw: f32,
    pub pitch: f32,
    pub rotation: Rotation,
    pub on_ground: bool,
}

impl TeleportIntent {
    pub fn new(id: VisualId, location: &Location, rotation: &Rotation, on_ground: bool) -> Self {
        Self {
            id,
            position: location.position(),
            yaw: location.yaw,
            pitch: location.pitch,
            rotation: *rotation,
            on_ground,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MetadataValue {
    Byte(i8),
    Int(i32),
    Float(f32),
    Bool(bool),
    Text(String),
    Vector3([f32; 3]),
    Quaternion([f32; 4]),
    Raw(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetadataEntry {
    pub index: u8,
    pub value: MetadataValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetadataIntent {
    pub id: VisualId,
    pub values: Vec<MetadataEntry>,
}

impl MetadataIntent {
    pub fn new(id: VisualId) -> Self {
        Self {
            id,
            values: Vec::new(),
        }
    }

    pub fn with(mut self, index: u8, value: MetadataValue) -> Self {
        self.values.push(MetadataEntry { index, value });
        self
    }
}

/// Destroys one or many Visuals in a single packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestroyIntent {
    pub ids: Vec<VisualId>,
}

impl DestroyIntent {
    pub fn single(id: VisualId) -> Self {
        Self { ids: vec![id] }
    }

    pub fn bulk(ids: Vec<VisualId>) -> Self {
        Self { ids }
    }
}

/// A high-level update decided by the engine, before it is encoded.
#[derive(Clone, Debug, PartialEq)]
pub enum PacketIntent {
    Spawn(SpawnIntent),
    Teleport(TeleportIntent),
    Metadata(MetadataIntent),
    Destroy(DestroyIntent),
}

impl PacketIntent {
    pub fn priority(&self) -> PacketPriority {
        match self {
            PacketIntent::Spawn(_) => PacketPriority::Spawn,
            PacketIntent::Teleport(_) => PacketPriority::Teleport,
            PacketIntent::Metadata(_) => PacketPriority::Metadata,
            PacketIntent::Destroy(_) => PacketPriority::Destroy,
        }
    }

    /// The single Visual this intent refers to, if any. Destroys carry id lists and report none.
    pub fn visual_id(&self) -> Option<VisualId> {
        match self {
            PacketIntent::Spawn(intent) => Some(intent.id),
            PacketIntent::Teleport(intent) => Some(intent.id),
            PacketIntent::Metadata(intent) => Some(intent.id),
            PacketIntent::Destroy(_) => None,
        }
    }
}
