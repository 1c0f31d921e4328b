use std::{
    collections::HashSet,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use log::{debug, error, trace};

use visync_shared::{
    view_distance_chunks, DestroyIntent, Location, PacketFactory, PacketPriority, Tick,
    TeleportIntent, TokenVersion, TrackerConfig, ViewerFrame, ViewerId, VisualId,
    MAX_VIEW_DISTANCE_CHUNKS,
};

use crate::{
    packet::{EnqueueResult, QueuedPacket},
    registry::{VisualRegistry, VisualSnapshot},
    scheduler::{AsyncPhaseRequest, PhaseExecutor, PhaseParallelism, TrackerCounters},
    viewer::{LodLevel, PlayerTrackingState, ViewerSlot},
};

/// Ticks the drain keeps the mass destroy boost after a large unregister.
const MASS_DESTROY_BOOST_TICKS: u64 = 2;

/// State shared between the producer API, the async phase and the dispatcher.
pub(crate) struct TrackerCore<F: PacketFactory> {
    pub config: TrackerConfig,
    pub factory: F,
    pub registry: VisualRegistry,
    pub viewers: DashMap<ViewerId, Arc<ViewerSlot<F::Payload>>>,
    pub tick: AtomicU64,
    pub counters: TrackerCounters,
    pub mass_destroy_boost_ticks: AtomicU64,
}

/// One viewer's share of an async phase. The flags say which task guards
/// this job claimed and must release.
struct ViewerJob<P> {
    slot: Arc<ViewerSlot<P>>,
    frame: ViewerFrame,
    visibility: bool,
    transform: bool,
}

fn in_range(visual: &Location, viewer: &Location, view_distance_squared: f64) -> bool {
    visual.same_world(viewer) && visual.distance_squared(viewer) <= view_distance_squared
}

impl<F: PacketFactory> TrackerCore<F> {
    pub fn new(config: TrackerConfig, factory: F, registry: VisualRegistry) -> Self {
        Self {
            config,
            factory,
            registry,
            viewers: DashMap::new(),
            tick: AtomicU64::new(0),
            counters: TrackerCounters::default(),
            mass_destroy_boost_ticks: AtomicU64::new(0),
        }
    }

    pub fn current_tick(&self) -> Tick {
        self.tick.load(Ordering::Acquire)
    }

    pub fn is_current(&self, id: VisualId, token: TokenVersion) -> bool {
        self.registry.tokens().is_current(Some(id), Some(token))
    }

    pub fn viewer_slot(&self, viewer: ViewerId) -> Arc<ViewerSlot<F::Payload>> {
        self.viewers
            .entry(viewer)
            .or_insert_with(|| {
                Arc::new(ViewerSlot::new(viewer, self.config.full_recalc_interval_ticks))
            })
            .clone()
    }

    /// Viewer slots ordered by viewer id.
    pub fn sorted_slots(&self) -> Vec<Arc<ViewerSlot<F::Payload>>> {
        let mut slots: Vec<_> = self
            .viewers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        slots.sort_by_key(|slot| slot.viewer());
        slots
    }

    pub fn arm_mass_destroy_boost(&self) {
        self.mass_destroy_boost_ticks
            .fetch_max(MASS_DESTROY_BOOST_TICKS, Ordering::AcqRel);
    }

    /// Whether this tick's drain gets the mass destroy boost. Uses up one tick of it.
    pub fn take_mass_destroy_boost(&self) -> bool {
        self.mass_destroy_boost_ticks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |ticks| ticks.checked_sub(1))
            .is_ok()
    }

    fn enqueue(&self, slot: &ViewerSlot<F::Payload>, packet: QueuedPacket<F::Payload>) -> EnqueueResult {
        if slot.is_closed() {
            trace!("discarding packet for disconnected {}", slot.viewer());
            return EnqueueResult::Rejected;
        }
        let result = slot
            .queue()
            .add(packet, |id, token| self.is_current(id, token));
        match result {
            EnqueueResult::Rejected => {
                TrackerCounters::add(&self.counters.dropped_stale_packets, 1);
            }
            EnqueueResult::Coalesced(PacketPriority::Metadata) => {
                TrackerCounters::add(&self.counters.coalesced_task_count, 1);
            }
            EnqueueResult::Coalesced(_) => {
                TrackerCounters::add(&self.counters.coalesced_updates, 1);
            }
            EnqueueResult::Queued => {}
        }
        result
    }

    fn enqueue_spawn(&self, slot: &ViewerSlot<F::Payload>, snapshot: &VisualSnapshot) -> bool {
        let id = snapshot.id();
        let token = self.registry.current_token(id);

        let intent = snapshot
            .handle
            .spawn_intent(&snapshot.location, &snapshot.rotation);
        let payload = self.factory.create_spawn_packet(&intent);
        let bytes = self.factory.estimate_packet_size_bytes(&payload);
        let spawn = QueuedPacket::new(payload, PacketPriority::Spawn, bytes).for_visual(id, token);
        if self.enqueue(slot, spawn).is_rejected() {
            return false;
        }

        // a freshly spawned stand-in needs its full metadata once
        let intent = snapshot.handle.metadata_intent();
        let payload = self.factory.create_metadata_packet(&intent);
        let bytes = self.factory.estimate_packet_size_bytes(&payload);
        let metadata = QueuedPacket::new(payload, PacketPriority::Metadata, bytes)
            .for_visual(id, token)
            .critical(true);
        self.enqueue(slot, metadata);
        true
    }

    fn enqueue_teleport(&self, slot: &ViewerSlot<F::Payload>, snapshot: &VisualSnapshot) {
        let id = snapshot.id();
        let on_ground = snapshot.handle.on_ground(&snapshot.location);
        let intent = TeleportIntent::new(id, &snapshot.location, &snapshot.rotation, on_ground);
        let payload = self.factory.create_teleport_packet(&intent);
        let bytes = self.factory.estimate_packet_size_bytes(&payload);
        let packet = QueuedPacket::new(payload, PacketPriority::Teleport, bytes)
            .for_visual(id, self.registry.current_token(id))
            .coalescible();
        self.enqueue(slot, packet);
    }

    fn enqueue_metadata(&self, slot: &ViewerSlot<F::Payload>, snapshot: &VisualSnapshot, critical: bool) {
        let id = snapshot.id();
        let intent = snapshot.handle.metadata_intent();
        let payload = self.factory.create_metadata_packet(&intent);
        let bytes = self.factory.estimate_packet_size_bytes(&payload);
        let packet = QueuedPacket::new(payload, PacketPriority::Metadata, bytes)
            .for_visual(id, self.registry.current_token(id))
            .critical(critical);
        self.enqueue(slot, packet);
    }

    /// Queues a DESTROY for `ids`, first dropping anything still queued for them.
    pub fn enqueue_destroy(&self, slot: &ViewerSlot<F::Payload>, ids: Vec<VisualId>, registered_at: Tick) {
        if ids.is_empty() {
            return;
        }
        slot.queue().prune_before_bulk_destroy(&ids);
        let intent = if ids.len() == 1 {
            DestroyIntent::single(ids[0])
        } else {
            DestroyIntent::bulk(ids)
        };
        let payload = self.factory.create_destroy_packet(&intent);
        let bytes = self.factory.estimate_packet_size_bytes(&payload);
        let mut packet = QueuedPacket::new(payload, PacketPriority::Destroy, bytes)
            .destroy_registered_at(registered_at);
        if let [id] = intent.ids.as_slice() {
            packet = packet.for_untracked_visual(*id);
        }
        self.enqueue(slot, packet);
    }

    /// Records `ids` as hidden for every viewer and prunes their queued
    /// updates. Only takes each viewer's pending destroy lock and queue, never
    /// its tracking state; the hides are applied by `apply_pending_hides`.
    pub fn hide_from_viewers(&self, ids: &[VisualId], force_recalc: bool) {
        if ids.is_empty() {
            return;
        }
        let tick = self.current_tick();
        for entry in self.viewers.iter() {
            let slot = entry.value();
            if slot.is_closed() {
                continue;
            }
            slot.queue().prune_before_bulk_destroy(ids);
            slot.pending_destroys()
                .hide(ids.iter().copied(), tick, force_recalc);
        }
    }

    /// Applies the hides producers recorded for this viewer. Every hidden id
    /// that was visible is dropped from the visible set, and all of them share
    /// one DESTROY.
    pub fn apply_pending_hides(&self, slot: &ViewerSlot<F::Payload>, tracking: &mut PlayerTrackingState) {
        let Some(batch) = slot.pending_destroys().take() else {
            return;
        };
        let hidden: Vec<VisualId> = if batch.ids.len() >= self.config.bulk_destroy_threshold {
            let doomed: HashSet<VisualId> = batch.ids.iter().copied().collect();
            tracking.remove_visible_bulk(&doomed)
        } else {
            batch
                .ids
                .iter()
                .copied()
                .filter(|id| tracking.remove_visible(*id))
                .collect()
        };
        if batch.force_recalc {
            tracking.force_recalc();
        }
        if !hidden.is_empty() {
            debug!("{} hidden from {}", hidden.len(), slot.viewer());
        }
        self.enqueue_destroy(slot, hidden, batch.first_unregister_tick);
    }

    fn run_viewer_job(&self, job: &ViewerJob<F::Payload>, request: &AsyncPhaseRequest, radius: u32) {
        let slot = &job.slot;
        if !slot.is_closed() {
            let outcome = catch_unwind(AssertUnwindSafe(|| self.update_viewer(job, request, radius)));
            if outcome.is_err() {
                error!("update of {} panicked at tick {}", slot.viewer(), request.tick);
                slot.tracking().force_recalc();
            }
        }
        if job.visibility {
            slot.finish_visibility_task();
        }
        if job.transform {
            slot.finish_transform_task();
        }
    }

    fn update_viewer(&self, job: &ViewerJob<F::Payload>, request: &AsyncPhaseRequest, radius: u32) {
        let slot = &job.slot;
        let frame = &job.frame;
        let mut tracking = slot.tracking();

        // destroys owed from unregisters must precede any respawn below
        self.apply_pending_hides(slot, &mut tracking);

        let moved = tracking.update_position(frame.chunk(), frame.location.world);
        if moved
            || tracking.needs_full_recalc(request.tick, self.config.full_recalc_interval_ticks)
        {
            let dropped = tracking.rebuild_candidates(
                self.registry.chunk_grid(),
                frame.chunk(),
                radius,
            );
            tracking.mark_full_recalc_done(request.tick);
            for id in dropped {
                self.enqueue_destroy(slot, vec![id], request.tick);
            }
        }

        let mut spawned = HashSet::new();
        if job.visibility {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                self.visibility_slice(slot, &mut tracking, frame, request, &mut spawned)
            }));
            if outcome.is_err() {
                error!("visibility pass for {} panicked at tick {}", slot.viewer(), request.tick);
                tracking.force_recalc();
            }
        }

        if job.transform {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                self.transform_slice(slot, &mut tracking, frame, request, &spawned)
            }));
            if outcome.is_err() {
                error!("transform pass for {} panicked at tick {}", slot.viewer(), request.tick);
                tracking.force_recalc();
            }
        }
    }

    fn visibility_slice(
        &self,
        slot: &ViewerSlot<F::Payload>,
        tracking: &mut PlayerTrackingState,
        frame: &ViewerFrame,
        request: &AsyncPhaseRequest,
        spawned: &mut HashSet<VisualId>,
    ) {
        let budget = self
            .config
            .max_visibility_updates_per_tick
            .saturating_mul(request.pressure_multiplier.max(1));

        for id in tracking.next_candidates(budget) {
            match self.registry.snapshot(id) {
                Some(snapshot)
                    if in_range(&snapshot.location, &frame.location, request.view_distance_squared) =>
                {
                    if !tracking.is_visible(id) && self.enqueue_spawn(slot, &snapshot) {
                        tracking.add_spawned(id, snapshot.location, snapshot.rotation, request.tick);
                        spawned.insert(id);
                    }
                }
                _ => {
                    if tracking.remove_visible(id) {
                        self.enqueue_destroy(slot, vec![id], request.tick);
                    }
                }
            }
        }
    }

    /// Sends visible Visuals' changes, thinned by distance tier: NEAR changes
    /// go out right away, MID and FAR ones at most once per tier interval.
    /// Held back changes stay owed to the viewer until they can be sent.
    fn transform_slice(
        &self,
        slot: &ViewerSlot<F::Payload>,
        tracking: &mut PlayerTrackingState,
        frame: &ViewerFrame,
        request: &AsyncPhaseRequest,
        spawned: &HashSet<VisualId>,
    ) {
        let lod = &self.config.lod;
        let mut lod_skipped = 0;
        let mut lod_skipped_metadata = 0;
        let mut shed_metadata = 0;

        for id in tracking.next_visible(self.config.max_transform_checks_per_tick) {
            if spawned.contains(&id) {
                continue;
            }
            let snapshot = match self.registry.snapshot(id) {
                Some(snapshot)
                    if in_range(&snapshot.location, &frame.location, request.view_distance_squared) =>
                {
                    snapshot
                }
                _ => {
                    if tracking.remove_visible(id) {
                        self.enqueue_destroy(slot, vec![id], request.tick);
                    }
                    continue;
                }
            };

            let level = LodLevel::resolve(snapshot.location.distance_squared(&frame.location), lod);
            let sent = tracking.sent_or_insert(id, snapshot.location, snapshot.rotation, request.tick);

            let mut teleport = false;
            if snapshot.flags.position_changed || sent.deferred {
                if !sent.differs(&snapshot.location, &snapshot.rotation, lod) {
                    sent.deferred = false;
                } else if sent.interval_reached(request.tick, level.update_interval(lod, &request.shedding)) {
                    sent.mark_sent(snapshot.location, snapshot.rotation, request.tick);
                    teleport = true;
                } else {
                    sent.deferred = true;
                    lod_skipped += 1;
                }
            }

            let mut metadata = None;
            if snapshot.flags.metadata_dirty || sent.metadata_owed {
                let critical = snapshot.flags.metadata_dirty && snapshot.flags.metadata_critical;
                if critical {
                    metadata = Some(true);
                } else if level == LodLevel::Far && !lod.far_allow_metadata_updates {
                    sent.metadata_owed = true;
                    lod_skipped_metadata += 1;
                } else if request.shedding.drops_metadata(id, request.tick, level) {
                    sent.metadata_owed = true;
                    shed_metadata += 1;
                } else {
                    metadata = Some(false);
                }
                if metadata.is_some() {
                    sent.metadata_owed = false;
                }
            }

            if teleport {
                self.enqueue_teleport(slot, &snapshot);
            }
            if let Some(critical) = metadata {
                self.enqueue_metadata(slot, &snapshot, critical);
            }
        }

        TrackerCounters::add(&self.counters.lod_skipped_updates, lod_skipped);
        TrackerCounters::add(&self.counters.lod_skipped_metadata_updates, lod_skipped_metadata);
        TrackerCounters::add(&self.counters.shed_metadata_updates, shed_metadata);
    }
}

impl<F: PacketFactory> PhaseExecutor for TrackerCore<F> {
    fn run_phase(&self, request: &AsyncPhaseRequest, parallelism: &PhaseParallelism) {
        self.registry.begin_tick();
        self.counters
            .last_pressure_multiplier
            .store(request.pressure_multiplier as u64, Ordering::Relaxed);

        let radius = view_distance_chunks(request.view_distance_squared).min(MAX_VIEW_DISTANCE_CHUNKS);
        let jobs: Vec<ViewerJob<F::Payload>> = request
            .frames
            .iter()
            .filter_map(|frame| {
                let slot = self.viewers.get(&frame.viewer)?.value().clone();
                let visibility = !request.destroy_drain_fast_path && slot.try_queue_visibility_task();
                let transform = slot.try_queue_transform_task();
                if !visibility && !transform {
                    trace!("{} already has work queued at tick {}", frame.viewer, request.tick);
                    return None;
                }
                Some(ViewerJob {
                    slot,
                    frame: *frame,
                    visibility,
                    transform,
                })
            })
            .collect();

        parallelism.for_each(&jobs, |job| self.run_viewer_job(job, request, radius));
    }
}
