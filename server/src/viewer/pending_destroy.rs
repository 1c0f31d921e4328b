use std::{collections::HashSet, time::Instant};

use visync_shared::{Tick, VisualId};

/// Ids hidden from a viewer by a producer (batch unregister, re-registration)
/// that the viewer's next update has to apply. Producers only ever touch this
/// state, never the viewer's tracking state, so they cannot block on a
/// running async phase.
#[derive(Default)]
pub struct PendingDestroyState {
    ids: Vec<VisualId>,
    lookup: HashSet<VisualId>,
    backlog_since: Option<Instant>,
    first_unregister_tick: Option<Tick>,
    force_recalc: bool,
}

/// A drained set of pending hides.
#[derive(Debug)]
pub struct PendingDestroyBatch {
    pub ids: Vec<VisualId>,
    pub first_unregister_tick: Tick,
    /// Rebuild the candidate list once the hides are applied.
    pub force_recalc: bool,
}

impl PendingDestroyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an id hidden at `tick`. Returns false if it was already pending.
    pub fn add(&mut self, id: VisualId, tick: Tick) -> bool {
        if !self.lookup.insert(id) {
            return false;
        }
        self.ids.push(id);
        if self.first_unregister_tick.is_none() {
            self.first_unregister_tick = Some(tick);
            self.backlog_since = Some(Instant::now());
        }
        true
    }

    pub fn extend(&mut self, ids: impl IntoIterator<Item = VisualId>, tick: Tick) -> usize {
        ids.into_iter().filter(|id| self.add(*id, tick)).count()
    }

    /// Like `extend`, additionally asking for a candidate rebuild.
    pub fn hide(&mut self, ids: impl IntoIterator<Item = VisualId>, tick: Tick, force_recalc: bool) -> usize {
        let added = self.extend(ids, tick);
        self.force_recalc |= force_recalc;
        added
    }

    pub fn contains(&self, id: VisualId) -> bool {
        self.lookup.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// When the oldest pending id was added.
    pub fn backlog_since(&self) -> Option<Instant> {
        self.backlog_since
    }

    pub fn take(&mut self) -> Option<PendingDestroyBatch> {
        let first_unregister_tick = self.first_unregister_tick.take()?;
        self.backlog_since = None;
        self.lookup.clear();
        Some(PendingDestroyBatch {
            ids: std::mem::take(&mut self.ids),
            first_unregister_tick,
            force_recalc: std::mem::take(&mut self.force_recalc),
        })
    }
}
