use std::collections::{HashMap, HashSet};

use visync_shared::{ChunkCoord, Location, Rotation, Tick, VisualId, WorldId};

use crate::grid::ChunkGridIndex;

use super::lod::SentTransform;

/// Incremental visibility bookkeeping for one viewer.
///
/// A viewer starts uninitialized and begins tracking the first time its
/// position is recorded. The candidate list is a snapshot of the chunk grid
/// around the viewer, rebuilt only on chunk or world change, on a periodic
/// interval, or when forced. Candidates are tested a bounded number at a time
/// through a wrapping cursor, so a large neighbourhood is spread over several
/// ticks. Every visible id remembers the pose the viewer was last sent.
pub struct PlayerTrackingState {
    chunk: ChunkCoord,
    world: Option<WorldId>,
    initialized: bool,
    // None forces a rebuild on the next pass
    last_full_recalc_tick: Option<Tick>,
    // subtracted from the first recalc tick so viewers don't rebuild in lockstep
    recalc_stagger: Tick,

    candidates: Vec<VisualId>,
    candidate_lookup: HashSet<VisualId>,
    candidate_cursor: usize,

    visible: HashSet<VisualId>,
    visible_order: Vec<VisualId>,
    visible_order_dirty: bool,
    visible_cursor: usize,
    sent: HashMap<VisualId, SentTransform>,
}

impl PlayerTrackingState {
    /// `recalc_interval` bounds the random stagger applied to the first periodic rebuild.
    pub fn new(recalc_interval: Tick) -> Self {
        Self {
            chunk: ChunkCoord::new(0, 0),
            world: None,
            initialized: false,
            last_full_recalc_tick: None,
            recalc_stagger: fastrand::u64(0..recalc_interval.max(1)),
            candidates: Vec::new(),
            candidate_lookup: HashSet::new(),
            candidate_cursor: 0,
            visible: HashSet::new(),
            visible_order: Vec::new(),
            visible_order_dirty: false,
            visible_cursor: 0,
            sent: HashMap::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn chunk(&self) -> ChunkCoord {
        self.chunk
    }

    pub fn world(&self) -> Option<WorldId> {
        self.world
    }

    pub fn last_full_recalc_tick(&self) -> Option<Tick> {
        self.last_full_recalc_tick
    }

    /// Records where the viewer stands this tick. Returns true if the chunk or
    /// world differs from the previously recorded one.
    pub fn update_position(&mut self, chunk: ChunkCoord, world: WorldId) -> bool {
        let moved = !self.initialized || self.chunk != chunk || self.world != Some(world);
        self.chunk = chunk;
        self.world = Some(world);
        self.initialized = true;
        moved
    }

    /// Whether the candidate list should be rebuilt at `tick`.
    pub fn needs_full_recalc(&self, tick: Tick, interval: Tick) -> bool {
        match self.last_full_recalc_tick {
            None => true,
            Some(last) => tick.saturating_sub(last) >= interval,
        }
    }

    pub fn mark_full_recalc_done(&mut self, tick: Tick) {
        let stagger = std::mem::take(&mut self.recalc_stagger);
        self.last_full_recalc_tick = Some(tick.saturating_sub(stagger));
    }

    pub fn force_recalc(&mut self) {
        self.last_full_recalc_tick = None;
    }

    /// Replaces the candidate list with every id in the square of chunks of
    /// `radius` around `center`, and resets the cursor.
    ///
    /// Visible ids that are no longer candidates are removed from the visible
    /// set and returned; the caller owes the viewer a DESTROY for each.
    pub fn rebuild_candidates(
        &mut self,
        grid: &ChunkGridIndex,
        center: ChunkCoord,
        radius: u32,
    ) -> Vec<VisualId> {
        self.candidates.clear();
        self.candidate_lookup.clear();
        grid.collect_neighbourhood(center, radius, &mut self.candidate_lookup, &mut self.candidates);
        self.candidate_cursor = 0;

        let lookup = &self.candidate_lookup;
        let dropped: Vec<VisualId> = self
            .visible
            .iter()
            .filter(|id| !lookup.contains(id))
            .copied()
            .collect();
        for id in &dropped {
            self.visible.remove(id);
            self.sent.remove(id);
        }
        if !dropped.is_empty() {
            self.visible_order_dirty = true;
        }
        self.visible_cursor = 0;
        dropped
    }

    pub fn candidate_len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_candidate(&self, id: VisualId) -> bool {
        self.candidate_lookup.contains(&id)
    }

    /// Next slice of at most `budget` candidates (`0` means all of them),
    /// continuing from where the previous slice stopped and wrapping around.
    /// A slice never yields the same candidate twice.
    pub fn next_candidates(&mut self, budget: usize) -> Vec<VisualId> {
        Self::wrapping_slice(&self.candidates, &mut self.candidate_cursor, budget)
    }

    /// Next slice of at most `budget` visible ids in the cached iteration order
    /// (`0` means all of them), wrapping around.
    pub fn next_visible(&mut self, budget: usize) -> Vec<VisualId> {
        if self.visible_order_dirty {
            self.visible_order.clear();
            self.visible_order.extend(self.visible.iter().copied());
            self.visible_order.sort_unstable();
            self.visible_order_dirty = false;
        }
        Self::wrapping_slice(&self.visible_order, &mut self.visible_cursor, budget)
    }

    fn wrapping_slice(items: &[VisualId], cursor: &mut usize, budget: usize) -> Vec<VisualId> {
        let len = items.len();
        if len == 0 {
            *cursor = 0;
            return Vec::new();
        }
        let count = if budget == 0 { len } else { budget.min(len) };
        let mut slice = Vec::with_capacity(count);
        for _ in 0..count {
            if *cursor >= len {
                *cursor = 0;
            }
            slice.push(items[*cursor]);
            *cursor += 1;
        }
        slice
    }

    pub fn is_visible(&self, id: VisualId) -> bool {
        self.visible.contains(&id)
    }

    /// Returns true if the id was not visible before.
    pub fn add_visible(&mut self, id: VisualId) -> bool {
        let added = self.visible.insert(id);
        if added {
            self.visible_order_dirty = true;
        }
        added
    }

    /// Marks `id` visible and remembers the pose it was spawned with.
    pub fn add_spawned(&mut self, id: VisualId, location: Location, rotation: Rotation, tick: Tick) -> bool {
        self.sent.insert(id, SentTransform::new(location, rotation, tick));
        self.add_visible(id)
    }

    /// Last pose sent for a visible id. Ids made visible without a pose
    /// have none.
    pub fn sent(&self, id: VisualId) -> Option<&SentTransform> {
        self.sent.get(&id)
    }

    /// Last pose sent for a visible id, starting from the given pose if the id
    /// was made visible without one.
    pub fn sent_or_insert(&mut self, id: VisualId, location: Location, rotation: Rotation, tick: Tick) -> &mut SentTransform {
        self.sent
            .entry(id)
            .or_insert_with(|| SentTransform::new(location, rotation, tick))
    }

    /// Returns true if the id was visible.
    pub fn remove_visible(&mut self, id: VisualId) -> bool {
        let removed = self.visible.remove(&id);
        if removed {
            self.sent.remove(&id);
            self.visible_order_dirty = true;
        }
        removed
    }

    /// Removes every id of `ids` that is visible, scanning the visible set
    /// instead of looking up each id. Suited to large batches.
    pub fn remove_visible_bulk(&mut self, ids: &HashSet<VisualId>) -> Vec<VisualId> {
        let mut removed = Vec::new();
        let sent = &mut self.sent;
        self.visible.retain(|id| {
            if ids.contains(id) {
                sent.remove(id);
                removed.push(*id);
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            self.visible_order_dirty = true;
        }
        removed
    }

    pub fn clear_visible(&mut self) -> Vec<VisualId> {
        let cleared: Vec<VisualId> = self.visible.drain().collect();
        self.sent.clear();
        self.visible_order.clear();
        self.visible_order_dirty = false;
        self.visible_cursor = 0;
        cleared
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn visible_ids(&self) -> impl Iterator<Item = VisualId> + '_ {
        self.visible.iter().copied()
    }
}
