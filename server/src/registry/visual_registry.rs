use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use log::trace;

use visync_shared::{Location, Rotation, Tick, TokenVersion, VisualHandle, VisualId};

use crate::grid::ChunkGridIndex;

use super::{
    token_service::VisualTokenService,
    tombstone_service::VisualTombstoneService,
    tracked_visual::{TrackedVisual, VisualSnapshot},
};

/// Outcome of a `register` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registration {
    pub token: TokenVersion,
    /// True if the id was already registered and its state was overwritten.
    pub replaced: bool,
}

/// Outcome of an `update_state` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateUpdate {
    /// The id is tombstoned, nothing changed.
    Suppressed,
    /// The id was unknown and was registered.
    Registered(Registration),
    Moved { chunk_changed: bool },
}

/// Canonical store of every registered Visual.
///
/// Each Visual is updated under its own shard lock, and grid relocation for a
/// Visual happens while that lock is held, so concurrent producers of the same
/// id cannot interleave bucket moves and readers never see half an update.
pub struct VisualRegistry {
    visuals: DashMap<VisualId, TrackedVisual>,
    chunk_grid: Arc<ChunkGridIndex>,
    tokens: Arc<VisualTokenService>,
    tombstones: Arc<VisualTombstoneService>,
}

impl VisualRegistry {
    pub fn new(
        chunk_grid: Arc<ChunkGridIndex>,
        tokens: Arc<VisualTokenService>,
        tombstones: Arc<VisualTombstoneService>,
    ) -> Self {
        Self {
            visuals: DashMap::new(),
            chunk_grid,
            tokens,
            tombstones,
        }
    }

    pub fn chunk_grid(&self) -> &Arc<ChunkGridIndex> {
        &self.chunk_grid
    }

    pub fn tokens(&self) -> &Arc<VisualTokenService> {
        &self.tokens
    }

    pub fn tombstones(&self) -> &Arc<VisualTombstoneService> {
        &self.tombstones
    }

    pub fn register(&self, visual: VisualHandle, location: Location, rotation: Rotation) -> Registration {
        let id = visual.id();
        match self.visuals.entry(id) {
            Entry::Occupied(mut occupied) => {
                let old_chunk = occupied.get().chunk_key();
                let token = self.admit(id);
                occupied.insert(TrackedVisual::new(visual, location, rotation));
                self.chunk_grid
                    .relocate(id, old_chunk, location.chunk_key());
                Registration {
                    token,
                    replaced: true,
                }
            }
            Entry::Vacant(vacant) => {
                let token = self.admit(id);
                vacant.insert(TrackedVisual::new(visual, location, rotation));
                self.chunk_grid.add(id, &location);
                Registration {
                    token,
                    replaced: false,
                }
            }
        }
    }

    fn admit(&self, id: VisualId) -> TokenVersion {
        self.tombstones.clear_id(id);
        self.tokens.bump(id)
    }

    pub fn update_state(
        &self,
        visual: &VisualHandle,
        location: Location,
        rotation: Rotation,
        tick: Tick,
    ) -> StateUpdate {
        let id = visual.id();
        if self.tombstones.is_tombstoned(id, tick) {
            trace!("ignoring state update for closed {}", id);
            return StateUpdate::Suppressed;
        }

        match self.visuals.entry(id) {
            Entry::Occupied(mut occupied) => {
                let old_chunk = occupied.get().chunk_key();
                let new_chunk = location.chunk_key();
                occupied.get_mut().update(location, rotation);
                let chunk_changed = old_chunk != new_chunk;
                if chunk_changed {
                    self.chunk_grid.relocate(id, old_chunk, new_chunk);
                }
                StateUpdate::Moved { chunk_changed }
            }
            Entry::Vacant(vacant) => {
                // unregister tombstones while holding this entry, so checking again here is exact
                if self.tombstones.is_tombstoned(id, tick) {
                    return StateUpdate::Suppressed;
                }
                let token = self.admit(id);
                vacant.insert(TrackedVisual::new(visual.clone(), location, rotation));
                self.chunk_grid.add(id, &location);
                StateUpdate::Registered(Registration {
                    token,
                    replaced: false,
                })
            }
        }
    }

    /// Returns false if the id is not registered.
    pub fn mark_meta_dirty(&self, id: VisualId, critical: bool) -> bool {
        match self.visuals.get_mut(&id) {
            Some(mut tracked) => {
                tracked.mark_meta_dirty(critical);
                true
            }
            None => false,
        }
    }

    /// Removes the Visual, tombstoning its id until `tombstone_until`.
    /// Returns the removed state, or None if the id was not registered.
    pub fn unregister(&self, id: VisualId, tombstone_until: Tick) -> Option<VisualSnapshot> {
        match self.visuals.entry(id) {
            Entry::Occupied(occupied) => {
                self.tombstones.add(id, tombstone_until);
                self.chunk_grid.remove(id, occupied.get().chunk_key());
                let (_, tracked) = occupied.remove_entry();
                Some(tracked.snapshot())
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Latches every Visual's pending flags for the phase that is starting.
    pub fn begin_tick(&self) {
        for mut tracked in self.visuals.iter_mut() {
            tracked.begin_tick();
        }
    }

    pub fn is_closed(&self, id: VisualId, tick: Tick) -> bool {
        self.tombstones.is_tombstoned(id, tick)
    }

    pub fn contains(&self, id: VisualId) -> bool {
        self.visuals.contains_key(&id)
    }

    pub fn snapshot(&self, id: VisualId) -> Option<VisualSnapshot> {
        self.visuals.get(&id).map(|tracked| tracked.snapshot())
    }

    pub fn location(&self, id: VisualId) -> Option<Location> {
        self.visuals.get(&id).map(|tracked| *tracked.location())
    }

    pub fn current_token(&self, id: VisualId) -> TokenVersion {
        self.tokens.current(id)
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }

    pub fn clear(&self) {
        self.visuals.clear();
        self.chunk_grid.clear();
        self.tombstones.clear();
    }
}
