mod intent;
mod packet_factory;
mod priority;

pub use intent::{
    DestroyIntent, MetadataEntry, MetadataIntent, MetadataValue, PacketIntent, SpawnIntent,
    SpawnKind, TeleportIntent,
};
pub use packet_factory::PacketFactory;
pub use priority::PacketPriority;
