use std::time::Instant;

use visync_shared::{PacketPriority, Tick, TokenVersion, VisualId};

/// A payload waiting in a viewer's queue, with everything the dispatcher needs
/// to decide whether and when to send it.
pub struct QueuedPacket<P> {
    payload: P,
    priority: PacketPriority,
    estimated_bytes: usize,
    visual_id: Option<VisualId>,
    coalescible: bool,
    critical_metadata: bool,
    enqueued_at: Instant,
    token: Option<TokenVersion>,
    destroy_registered_at: Option<Tick>,
    pub(crate) sequence: u64,
}

impl<P> QueuedPacket<P> {
    /// Estimates below one byte are counted as one, so a byte cap still
    /// bounds a drain of payloads the factory sizes at zero.
    pub fn new(payload: P, priority: PacketPriority, estimated_bytes: usize) -> Self {
        Self {
            payload,
            priority,
            estimated_bytes: estimated_bytes.max(1),
            visual_id: None,
            coalescible: false,
            critical_metadata: false,
            enqueued_at: Instant::now(),
            token: None,
            destroy_registered_at: None,
            sequence: 0,
        }
    }

    /// Ties the packet to a Visual and the token version it was built against.
    pub fn for_visual(mut self, id: VisualId, token: TokenVersion) -> Self {
        self.visual_id = Some(id);
        self.token = Some(token);
        self
    }

    /// Ties the packet to a Visual without token checks.
    pub fn for_untracked_visual(mut self, id: VisualId) -> Self {
        self.visual_id = Some(id);
        self.token = None;
        self
    }

    pub fn coalescible(mut self) -> Self {
        self.coalescible = true;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical_metadata = critical;
        self
    }

    /// Tick at which the destroyed Visuals were hidden, for latency stats.
    pub fn destroy_registered_at(mut self, tick: Tick) -> Self {
        self.destroy_registered_at = Some(tick);
        self
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    pub fn priority(&self) -> PacketPriority {
        self.priority
    }

    pub fn estimated_bytes(&self) -> usize {
        self.estimated_bytes
    }

    pub fn visual_id(&self) -> Option<VisualId> {
        self.visual_id
    }

    pub fn is_coalescible(&self) -> bool {
        self.coalescible
    }

    pub fn is_critical_metadata(&self) -> bool {
        self.critical_metadata
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub fn token(&self) -> Option<TokenVersion> {
        self.token
    }

    pub fn destroy_registered_tick(&self) -> Option<Tick> {
        self.destroy_registered_at
    }

    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            priority: self.priority,
            estimated_bytes: self.estimated_bytes,
            visual_id: self.visual_id,
            token: self.token,
        }
    }

    /// Coalescible teleports replace each other per Visual.
    pub(crate) fn replaces_teleport(&self) -> Option<VisualId> {
        match (self.priority, self.coalescible) {
            (PacketPriority::Teleport, true) => self.visual_id,
            _ => None,
        }
    }

    /// Non-critical metadata replaces each other per Visual.
    pub(crate) fn replaces_metadata(&self) -> Option<VisualId> {
        match (self.priority, self.critical_metadata) {
            (PacketPriority::Metadata, false) => self.visual_id,
            _ => None,
        }
    }
}

/// What a dispatcher can inspect about the head of a queue without taking it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub priority: PacketPriority,
    pub estimated_bytes: usize,
    pub visual_id: Option<VisualId>,
    pub token: Option<TokenVersion>,
}
