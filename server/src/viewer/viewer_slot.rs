use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard, TryLockError,
};

use visync_shared::ViewerId;

use crate::{packet::PlayerPacketQueue, sync::lock};

use super::{pending_destroy::PendingDestroyState, tracking_state::PlayerTrackingState};

/// Everything the engine keeps for one connected viewer.
///
/// Lock order is tracking, then pending destroys. The queue has its own
/// internal lock and may be used while either is held. Producers only take
/// the pending destroy lock and the queue.
pub struct ViewerSlot<P> {
    viewer: ViewerId,
    tracking: Mutex<PlayerTrackingState>,
    pending_destroys: Mutex<PendingDestroyState>,
    queue: PlayerPacketQueue<P>,
    closed: AtomicBool,
    visibility_task_queued: AtomicBool,
    transform_task_queued: AtomicBool,
}

impl<P> ViewerSlot<P> {
    pub fn new(viewer: ViewerId, recalc_interval: u64) -> Self {
        Self {
            viewer,
            tracking: Mutex::new(PlayerTrackingState::new(recalc_interval)),
            pending_destroys: Mutex::new(PendingDestroyState::new()),
            queue: PlayerPacketQueue::new(),
            closed: AtomicBool::new(false),
            visibility_task_queued: AtomicBool::new(false),
            transform_task_queued: AtomicBool::new(false),
        }
    }

    pub fn viewer(&self) -> ViewerId {
        self.viewer
    }

    pub fn tracking(&self) -> MutexGuard<'_, PlayerTrackingState> {
        lock(&self.tracking)
    }

    /// The tracking state, unless a job is holding it right now.
    pub fn try_tracking(&self) -> Option<MutexGuard<'_, PlayerTrackingState>> {
        match self.tracking.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn pending_destroys(&self) -> MutexGuard<'_, PendingDestroyState> {
        lock(&self.pending_destroys)
    }

    pub fn queue(&self) -> &PlayerPacketQueue<P> {
        &self.queue
    }

    /// Claims the viewer's visibility job for the phase being scheduled.
    /// Returns false if one is already queued or running.
    pub fn try_queue_visibility_task(&self) -> bool {
        !self.visibility_task_queued.swap(true, Ordering::AcqRel)
    }

    pub fn finish_visibility_task(&self) {
        self.visibility_task_queued.store(false, Ordering::Release);
    }

    /// Claims the viewer's transform job. Returns false if one is already
    /// queued or running.
    pub fn try_queue_transform_task(&self) -> bool {
        !self.transform_task_queued.swap(true, Ordering::AcqRel)
    }

    pub fn finish_transform_task(&self) {
        self.transform_task_queued.store(false, Ordering::Release);
    }

    /// A closed slot belongs to a disconnected viewer; work still holding it
    /// must discard its output.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the slot closed and drops everything it holds.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.tracking().clear_visible();
        self.pending_destroys().take();
        self.queue.clear();
    }
}
