/// Lanes of a viewer's packet queue, drained strictly in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketPriority {
    Destroy,
    Spawn,
    Teleport,
    Metadata,
}

impl PacketPriority {
    pub const COUNT: usize = 4;

    /// All lanes, highest priority first.
    pub const ORDERED: [PacketPriority; PacketPriority::COUNT] = [
        PacketPriority::Destroy,
        PacketPriority::Spawn,
        PacketPriority::Teleport,
        PacketPriority::Metadata,
    ];

    pub fn index(self) -> usize {
        match self {
            PacketPriority::Destroy => 0,
            PacketPriority::Spawn => 1,
            PacketPriority::Teleport => 2,
            PacketPriority::Metadata => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketPriority::Destroy => "destroy",
            PacketPriority::Spawn => "spawn",
            PacketPriority::Teleport => "teleport",
            PacketPriority::Metadata => "metadata",
        }
    }
}
