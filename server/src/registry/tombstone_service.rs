use dashmap::DashMap;

use visync_shared::{Tick, VisualId};

/// Time-bounded "dead" markers for unregistered Visuals. While
/// `now <= expires_at` an id is tombstoned and late updates for it are ignored.
pub struct VisualTombstoneService {
    tombstones: DashMap<VisualId, Tick>,
}

impl VisualTombstoneService {
    pub fn new() -> Self {
        Self {
            tombstones: DashMap::new(),
        }
    }

    pub fn add(&self, id: VisualId, expires_at: Tick) {
        self.tombstones.insert(id, expires_at);
    }

    pub fn clear_id(&self, id: VisualId) {
        self.tombstones.remove(&id);
    }

    /// Expired entries are evicted on read.
    pub fn is_tombstoned(&self, id: VisualId, now: Tick) -> bool {
        let Some(expires_at) = self.tombstones.get(&id).map(|entry| *entry) else {
            return false;
        };
        if now > expires_at {
            // only evict the entry we looked at, a concurrent re-tombstone wins
            self.tombstones
                .remove_if(&id, |_, current| *current == expires_at);
            return false;
        }
        true
    }

    /// Drops every expired entry, for ids that are never queried again.
    pub fn prune_expired(&self, now: Tick) -> usize {
        let before = self.tombstones.len();
        self.tombstones.retain(|_, expires_at| now <= *expires_at);
        before.saturating_sub(self.tombstones.len())
    }

    pub fn len(&self) -> usize {
        self.tombstones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tombstones.is_empty()
    }

    pub fn clear(&self) {
        self.tombstones.clear();
    }
}

impl Default for VisualTombstoneService {
    fn default() -> Self {
        Self::new()
    }
}
