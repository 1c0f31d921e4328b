use std::{
    collections::HashSet,
    sync::Mutex,
};

use visync_server::shared::{
    DestroyIntent, MetadataIntent, PacketFactory, Rotation, SpawnIntent, TeleportIntent,
    TransportError, ViewerId, VisualId,
};

/// Payload produced by `RecordingPacketFactory`: the decoded intent plus a
/// size used for byte budgets.
#[derive(Clone, Debug, PartialEq)]
pub enum TestPacket {
    Spawn { id: VisualId },
    Teleport {
        id: VisualId,
        position: [f64; 3],
        rotation: Rotation,
        on_ground: bool,
    },
    Metadata { id: VisualId, entries: usize },
    Destroy { ids: Vec<VisualId> },
}

impl TestPacket {
    pub fn visual_ids(&self) -> Vec<VisualId> {
        match self {
            TestPacket::Spawn { id }
            | TestPacket::Teleport { id, .. }
            | TestPacket::Metadata { id, .. } => vec![*id],
            TestPacket::Destroy { ids } => ids.clone(),
        }
    }

    pub fn is_spawn_of(&self, visual: VisualId) -> bool {
        matches!(self, TestPacket::Spawn { id } if *id == visual)
    }

    pub fn is_teleport_of(&self, visual: VisualId) -> bool {
        matches!(self, TestPacket::Teleport { id, .. } if *id == visual)
    }

    pub fn is_metadata_of(&self, visual: VisualId) -> bool {
        matches!(self, TestPacket::Metadata { id, .. } if *id == visual)
    }

    pub fn destroys(&self, visual: VisualId) -> bool {
        matches!(self, TestPacket::Destroy { ids } if ids.contains(&visual))
    }
}

/// In-memory `PacketFactory` that records every bundle it is asked to send
/// and can be told to fail sends for particular viewers.
pub struct RecordingPacketFactory {
    packet_size: usize,
    sent: Mutex<Vec<(ViewerId, TestPacket)>>,
    bundles: Mutex<Vec<(ViewerId, usize)>>,
    failing: Mutex<HashSet<ViewerId>>,
}

impl RecordingPacketFactory {
    pub fn new() -> Self {
        Self::with_packet_size(16)
    }

    /// Every payload is estimated at `packet_size` bytes.
    pub fn with_packet_size(packet_size: usize) -> Self {
        Self {
            packet_size,
            sent: Mutex::new(Vec::new()),
            bundles: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_viewer(&self, viewer: ViewerId) {
        self.failing.lock().unwrap().insert(viewer);
    }

    pub fn heal_viewer(&self, viewer: ViewerId) {
        self.failing.lock().unwrap().remove(&viewer);
    }

    /// Everything successfully sent so far, in send order.
    pub fn sent(&self) -> Vec<(ViewerId, TestPacket)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, viewer: ViewerId) -> Vec<TestPacket> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| *target == viewer)
            .map(|(_, packet)| packet.clone())
            .collect()
    }

    pub fn take_sent_to(&self, viewer: ViewerId) -> Vec<TestPacket> {
        let mut sent = self.sent.lock().unwrap();
        let (taken, kept): (Vec<_>, Vec<_>) = sent.drain(..).partition(|(target, _)| *target == viewer);
        *sent = kept;
        taken.into_iter().map(|(_, packet)| packet).collect()
    }

    /// (viewer, payload count) per successful bundle.
    pub fn bundles(&self) -> Vec<(ViewerId, usize)> {
        self.bundles.lock().unwrap().clone()
    }

    pub fn spawn_count(&self, viewer: ViewerId, visual: VisualId) -> usize {
        self.count(viewer, |packet| packet.is_spawn_of(visual))
    }

    pub fn destroy_count(&self, viewer: ViewerId, visual: VisualId) -> usize {
        self.count(viewer, |packet| packet.destroys(visual))
    }

    pub fn teleport_count(&self, viewer: ViewerId, visual: VisualId) -> usize {
        self.count(viewer, |packet| packet.is_teleport_of(visual))
    }

    pub fn metadata_count(&self, viewer: ViewerId, visual: VisualId) -> usize {
        self.count(viewer, |packet| packet.is_metadata_of(visual))
    }

    fn count(&self, viewer: ViewerId, predicate: impl Fn(&TestPacket) -> bool) -> usize {
        self.sent_to(viewer).iter().filter(|packet| predicate(packet)).count()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
        self.bundles.lock().unwrap().clear();
    }
}

impl Default for RecordingPacketFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketFactory for RecordingPacketFactory {
    type Payload = TestPacket;

    fn create_spawn_packet(&self, intent: &SpawnIntent) -> TestPacket {
        TestPacket::Spawn { id: intent.id }
    }

    fn create_teleport_packet(&self, intent: &TeleportIntent) -> TestPacket {
        TestPacket::Teleport {
            id: intent.id,
            position: intent.position,
            rotation: intent.rotation,
            on_ground: intent.on_ground,
        }
    }

    fn create_metadata_packet(&self, intent: &MetadataIntent) -> TestPacket {
        TestPacket::Metadata {
            id: intent.id,
            entries: intent.values.len(),
        }
    }

    fn create_destroy_packet(&self, intent: &DestroyIntent) -> TestPacket {
        TestPacket::Destroy {
            ids: intent.ids.clone(),
        }
    }

    fn estimate_packet_size_bytes(&self, _payload: &TestPacket) -> usize {
        self.packet_size
    }

    fn send_packet(&self, viewer: ViewerId, payload: TestPacket) -> Result<(), TransportError> {
        self.send_bundle(viewer, vec![payload])
    }

    fn send_bundle(&self, viewer: ViewerId, payloads: Vec<TestPacket>) -> Result<(), TransportError> {
        if self.failing.lock().unwrap().contains(&viewer) {
            return Err(TransportError::SendFailed {
                viewer,
                count: payloads.len(),
                reason: "connection reset".to_string(),
            });
        }
        self.bundles.lock().unwrap().push((viewer, payloads.len()));
        let mut sent = self.sent.lock().unwrap();
        sent.extend(payloads.into_iter().map(|payload| (viewer, payload)));
        Ok(())
    }
}
