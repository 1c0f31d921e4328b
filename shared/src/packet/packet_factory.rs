use crate::{
    DestroyIntent, MetadataIntent, PacketIntent, SpawnIntent, TeleportIntent, TransportError,
    ViewerId,
};

/// Wire-layer collaborator: encodes intents into opaque payloads and owns the
/// connections to viewers. Only the dispatch thread calls the `send_*` methods;
/// the `create_*` methods may be called from async phase workers.
pub trait PacketFactory: Send + Sync + 'static {
    type Payload: Send + 'static;

    fn create_spawn_packet(&self, intent: &SpawnIntent) -> Self::Payload;

    fn create_teleport_packet(&self, intent: &TeleportIntent) -> Self::Payload;

    fn create_metadata_packet(&self, intent: &MetadataIntent) -> Self::Payload;

    fn create_destroy_packet(&self, intent: &DestroyIntent) -> Self::Payload;

    /// Estimated encoded size, used for the per-tick byte budget.
    fn estimate_packet_size_bytes(&self, payload: &Self::Payload) -> usize;

    fn send_packet(&self, viewer: ViewerId, payload: Self::Payload) -> Result<(), TransportError>;

    /// Sends several payloads to one viewer, bundled if the transport supports it.
    fn send_bundle(
        &self,
        viewer: ViewerId,
        payloads: Vec<Self::Payload>,
    ) -> Result<(), TransportError> {
        for payload in payloads {
            self.send_packet(viewer, payload)?;
        }
        Ok(())
    }

    fn create_packet(&self, intent: &PacketIntent) -> Self::Payload {
        match intent {
            PacketIntent::Spawn(intent) => self.create_spawn_packet(intent),
            PacketIntent::Teleport(intent) => self.create_teleport_packet(intent),
            PacketIntent::Metadata(intent) => self.create_metadata_packet(intent),
            PacketIntent::Destroy(intent) => self.create_destroy_packet(intent),
        }
    }
}
