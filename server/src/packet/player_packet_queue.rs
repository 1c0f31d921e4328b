use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Mutex,
    time::{Duration, Instant},
};

use visync_shared::{PacketPriority, TokenVersion, VisualId};

use crate::sync::lock;

use super::queued_packet::{PacketHeader, QueuedPacket};

/// Result of offering a packet to a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueResult {
    /// The packet's token was stale; nothing was inserted.
    Rejected,
    Queued,
    /// The packet replaced an older one of the same lane and Visual.
    Coalesced(PacketPriority),
}

impl EnqueueResult {
    /// Number of queued packets this insert made redundant.
    pub fn coalesced(&self) -> usize {
        match self {
            EnqueueResult::Coalesced(_) => 1,
            _ => 0,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, EnqueueResult::Rejected)
    }
}

/// What the dispatcher wants done with the packet at the head of a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadAction {
    Take,
    /// Remove without sending (stale token).
    Discard,
    /// Leave it queued and stop.
    Keep,
}

pub enum Polled<P> {
    Empty,
    Kept,
    Taken(QueuedPacket<P>),
    Discarded(QueuedPacket<P>),
}

struct QueueInner<P> {
    lanes: [VecDeque<QueuedPacket<P>>; PacketPriority::COUNT],
    // visual -> sequence of its single outstanding coalescible teleport
    teleport_by_visual: HashMap<VisualId, u64>,
    // visual -> sequence of its single outstanding non-critical metadata
    metadata_by_visual: HashMap<VisualId, u64>,
    next_sequence: u64,
}

impl<P> QueueInner<P> {
    fn new() -> Self {
        Self {
            lanes: [
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
            ],
            teleport_by_visual: HashMap::new(),
            metadata_by_visual: HashMap::new(),
            next_sequence: 0,
        }
    }

    fn lane(&self, priority: PacketPriority) -> &VecDeque<QueuedPacket<P>> {
        &self.lanes[priority.index()]
    }

    fn lane_mut(&mut self, priority: PacketPriority) -> &mut VecDeque<QueuedPacket<P>> {
        &mut self.lanes[priority.index()]
    }

    fn remove_sequence(&mut self, priority: PacketPriority, sequence: u64) -> bool {
        let lane = self.lane_mut(priority);
        match lane.iter().position(|packet| packet.sequence == sequence) {
            Some(index) => lane.remove(index).is_some(),
            None => false,
        }
    }

    fn front_priority(&self) -> Option<PacketPriority> {
        PacketPriority::ORDERED
            .into_iter()
            .find(|priority| !self.lane(*priority).is_empty())
    }

    /// Drops the replace-index entry that points at this packet, if any.
    fn forget(&mut self, packet: &QueuedPacket<P>) {
        self.unindex(
            packet.replaces_teleport(),
            packet.replaces_metadata(),
            packet.sequence,
        );
    }

    fn unindex(&mut self, teleport: Option<VisualId>, metadata: Option<VisualId>, sequence: u64) {
        if let Some(id) = teleport {
            if self.teleport_by_visual.get(&id) == Some(&sequence) {
                self.teleport_by_visual.remove(&id);
            }
        }
        if let Some(id) = metadata {
            if self.metadata_by_visual.get(&id) == Some(&sequence) {
                self.metadata_by_visual.remove(&id);
            }
        }
    }

    fn retain_lane(
        &mut self,
        priority: PacketPriority,
        mut keep: impl FnMut(&QueuedPacket<P>) -> bool,
    ) -> usize {
        let mut removed = Vec::new();
        let lane = self.lane_mut(priority);
        let before = lane.len();
        lane.retain(|packet| {
            let kept = keep(packet);
            if !kept {
                removed.push((packet.replaces_teleport(), packet.replaces_metadata(), packet.sequence));
            }
            kept
        });
        let count = before - lane.len();
        for (teleport, metadata, sequence) in removed {
            self.unindex(teleport, metadata, sequence);
        }
        count
    }
}

/// One viewer's outgoing packets: four strictly ordered lanes
/// (DESTROY, SPAWN, TELEPORT, METADATA) plus replace-indexes that keep at most
/// one coalescible TELEPORT and one non-critical METADATA per Visual.
///
/// All access goes through a single mutex. There is exactly one consumer (the
/// dispatch thread) and a handful of producer calls per tick.
pub struct PlayerPacketQueue<P> {
    inner: Mutex<QueueInner<P>>,
}

impl<P> PlayerPacketQueue<P> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::new()),
        }
    }

    /// Offers a packet. Packets tied to a Visual and a token version are
    /// validated first and rejected if stale.
    pub fn add(
        &self,
        mut packet: QueuedPacket<P>,
        token_validator: impl Fn(VisualId, TokenVersion) -> bool,
    ) -> EnqueueResult {
        if let (Some(id), Some(token)) = (packet.visual_id(), packet.token()) {
            if !token_validator(id, token) {
                return EnqueueResult::Rejected;
            }
        }

        let mut inner = lock(&self.inner);
        packet.sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let priority = packet.priority();
        let mut coalesced = false;
        if let Some(id) = packet.replaces_teleport() {
            if let Some(previous) = inner.teleport_by_visual.insert(id, packet.sequence) {
                coalesced = inner.remove_sequence(PacketPriority::Teleport, previous);
            }
        } else if let Some(id) = packet.replaces_metadata() {
            if let Some(previous) = inner.metadata_by_visual.insert(id, packet.sequence) {
                coalesced = inner.remove_sequence(PacketPriority::Metadata, previous);
            }
        }
        inner.lane_mut(priority).push_back(packet);

        if coalesced {
            EnqueueResult::Coalesced(priority)
        } else {
            EnqueueResult::Queued
        }
    }

    /// Header of the packet `poll` would return next.
    pub fn peek(&self) -> Option<PacketHeader> {
        let inner = lock(&self.inner);
        let priority = inner.front_priority()?;
        inner.lane(priority).front().map(QueuedPacket::header)
    }

    /// Removes the packet at the head of the highest-priority non-empty lane.
    pub fn poll(&self) -> Option<QueuedPacket<P>> {
        let mut inner = lock(&self.inner);
        let priority = inner.front_priority()?;
        let packet = inner.lane_mut(priority).pop_front()?;
        inner.forget(&packet);
        Some(packet)
    }

    /// Inspects the head packet and removes it according to `decide`, under a
    /// single lock so producers pruning the queue cannot swap the head between
    /// the decision and the removal.
    pub fn poll_with(&self, decide: impl FnOnce(&PacketHeader) -> HeadAction) -> Polled<P> {
        let mut inner = lock(&self.inner);
        let Some(priority) = inner.front_priority() else {
            return Polled::Empty;
        };
        let action = match inner.lane(priority).front() {
            Some(packet) => decide(&packet.header()),
            None => return Polled::Empty,
        };
        if action == HeadAction::Keep {
            return Polled::Kept;
        }
        let Some(packet) = inner.lane_mut(priority).pop_front() else {
            return Polled::Empty;
        };
        inner.forget(&packet);
        match action {
            HeadAction::Discard => Polled::Discarded(packet),
            _ => Polled::Taken(packet),
        }
    }

    /// Removes queued SPAWN/TELEPORT/METADATA packets for `id` that were built
    /// against a token other than `active_token`. Untracked packets are kept.
    pub fn invalidate_visual(&self, id: VisualId, active_token: TokenVersion) -> usize {
        let mut inner = lock(&self.inner);
        let mut removed = 0;
        for priority in [PacketPriority::Spawn, PacketPriority::Teleport, PacketPriority::Metadata] {
            removed += inner.retain_lane(priority, |packet| {
                packet.visual_id() != Some(id)
                    || packet.token().map_or(true, |token| token == active_token)
            });
        }
        removed
    }

    /// Removes every pending SPAWN/TELEPORT/METADATA for Visuals about to be destroyed.
    pub fn prune_before_bulk_destroy(&self, ids: &[VisualId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let doomed: HashSet<VisualId> = ids.iter().copied().collect();
        let mut inner = lock(&self.inner);
        let mut removed = 0;
        for priority in [PacketPriority::Spawn, PacketPriority::Teleport, PacketPriority::Metadata] {
            removed += inner.retain_lane(priority, |packet| {
                packet
                    .visual_id()
                    .map_or(true, |id| !doomed.contains(&id))
            });
        }
        removed
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).lanes.iter().map(VecDeque::len).sum()
    }

    pub fn lane_len(&self, priority: PacketPriority) -> usize {
        lock(&self.inner).lane(priority).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).lanes.iter().all(VecDeque::is_empty)
    }

    /// Total estimated bytes waiting in all lanes.
    pub fn queued_bytes(&self) -> usize {
        lock(&self.inner)
            .lanes
            .iter()
            .flat_map(|lane| lane.iter())
            .map(QueuedPacket::estimated_bytes)
            .sum()
    }

    /// Age of the oldest packet at the head of any lane.
    pub fn oldest_age(&self, now: Instant) -> Duration {
        lock(&self.inner)
            .lanes
            .iter()
            .filter_map(VecDeque::front)
            .map(|packet| now.saturating_duration_since(packet.enqueued_at()))
            .max()
            .unwrap_or_default()
    }

    /// Empties every lane and returns how many packets were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = lock(&self.inner);
        let dropped = inner.lanes.iter().map(VecDeque::len).sum();
        for lane in inner.lanes.iter_mut() {
            lane.clear();
        }
        inner.teleport_by_visual.clear();
        inner.metadata_by_visual.clear();
        dropped
    }
}

impl<P> Default for PlayerPacketQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}
