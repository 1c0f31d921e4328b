use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::{debug, info, warn};

use visync_shared::{
    Location, PacketFactory, PacketPriority, Rotation, SessionProvider, Tick, TokenVersion,
    TrackerConfig, ViewerFrame, ViewerId, VisualHandle, VisualId,
};

use crate::{
    error::TrackerError,
    grid::ChunkGridIndex,
    registry::{StateUpdate, VisualRegistry, VisualTokenService, VisualTombstoneService},
    scheduler::{
        resolve_backlog_pressure_multiplier, resolve_shedding, AsyncPhaseCoordinator,
        AsyncPhaseRequest, AsyncPhaseRunner, DestroyBurst, DrainBudget, DrainReport, QueueBacklog,
        RenderNetworkBudgetScheduler, TrackerCounters, TrackerStats,
    },
};

use super::tracker_core::TrackerCore;

/// Entry point of the engine. Producers register and move Visuals from any
/// thread; the host's main thread calls `tick` once per server tick, which
/// admits an async phase and then drains every viewer's queue to the
/// `PacketFactory`.
pub struct VisualTracker<F: PacketFactory> {
    core: Arc<TrackerCore<F>>,
    runner: AsyncPhaseRunner,
    scheduler: RenderNetworkBudgetScheduler,
    started: AtomicBool,
}

impl<F: PacketFactory> VisualTracker<F> {
    /// Create a new tracker. Nothing runs until `start` is called.
    pub fn new(config: TrackerConfig, factory: F) -> Result<Self, TrackerError> {
        config.validate()?;

        let registry = VisualRegistry::new(
            Arc::new(ChunkGridIndex::new()),
            Arc::new(VisualTokenService::new()),
            Arc::new(VisualTombstoneService::new()),
        );
        let scheduler = RenderNetworkBudgetScheduler::new(DrainBudget::from_config(&config));
        let core = Arc::new(TrackerCore::new(config, factory, registry));
        let runner = AsyncPhaseRunner::new(Arc::new(AsyncPhaseCoordinator::new()), core.clone());

        Ok(Self {
            core,
            runner,
            scheduler,
            started: AtomicBool::new(false),
        })
    }

    /// Starts the async phase worker. Calling it again is a no-op.
    pub fn start(&self) -> Result<(), TrackerError> {
        if self.started.load(Ordering::Acquire) {
            debug!("visual tracker already started");
            return Ok(());
        }
        self.runner.start(self.core.config.network_compute_threads)?;
        self.started.store(true, Ordering::Release);
        info!(
            "visual tracker started ({} compute thread(s))",
            self.core.config.network_compute_threads
        );
        Ok(())
    }

    /// Stops the async phase worker, waiting for a phase in flight.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        self.runner.stop();
        info!("visual tracker stopped at tick {}", self.current_tick());
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.core.config
    }

    pub fn factory(&self) -> &F {
        &self.core.factory
    }

    pub fn registry(&self) -> &VisualRegistry {
        &self.core.registry
    }

    pub fn current_tick(&self) -> Tick {
        self.core.current_tick()
    }

    // Producers

    /// Registers a Visual, or re-registers a known one. Re-registration bumps
    /// its token, drops every queued packet built against the old token and
    /// respawns it for viewers that could see it.
    pub fn register(&self, visual: VisualHandle, location: Location, rotation: Rotation) -> TokenVersion {
        let id = visual.id();
        let registration = self.core.registry.register(visual, location, rotation);
        if registration.replaced {
            debug!("{} re-registered with token {}", id, registration.token);
            self.reset_viewers(&[(id, registration.token)]);
        }
        registration.token
    }

    /// Registers many Visuals at once. Returns their tokens in input order.
    /// Viewers of every re-registered one are reset together.
    pub fn register_batch(
        &self,
        visuals: impl IntoIterator<Item = (VisualHandle, Location, Rotation)>,
    ) -> Vec<TokenVersion> {
        let mut tokens = Vec::new();
        let mut replaced = Vec::new();
        for (visual, location, rotation) in visuals {
            let id = visual.id();
            let registration = self.core.registry.register(visual, location, rotation);
            if registration.replaced {
                replaced.push((id, registration.token));
            }
            tokens.push(registration.token);
        }
        if !replaced.is_empty() {
            debug!("batch re-registered {} visual(s)", replaced.len());
            self.reset_viewers(&replaced);
        }
        tokens
    }

    /// Moves a Visual. Unknown ids are registered; tombstoned ids are ignored.
    pub fn update_state(&self, visual: &VisualHandle, location: Location, rotation: Rotation) -> StateUpdate {
        self.core
            .registry
            .update_state(visual, location, rotation, self.current_tick())
    }

    /// Marks a Visual's metadata dirty. Critical metadata is never coalesced away.
    pub fn update_metadata(&self, visual: &VisualHandle, critical: bool) -> bool {
        let id = visual.id();
        if self.core.registry.is_closed(id, self.current_tick()) {
            return false;
        }
        self.core.registry.mark_meta_dirty(id, critical)
    }

    /// Removes a Visual. Returns false if it was not registered.
    pub fn unregister(&self, visual: &VisualHandle) -> bool {
        self.unregister_batch(&[visual.id()]) == 1
    }

    /// Removes many Visuals at once and tombstones their ids. Every viewer
    /// that could see one of them gets a single DESTROY for all of them at the
    /// start of its next update. Returns how many ids were registered.
    pub fn unregister_batch(&self, ids: &[VisualId]) -> usize {
        let until = self
            .current_tick()
            .saturating_add(self.core.config.tombstone_ttl_ticks);
        let removed: Vec<VisualId> = ids
            .iter()
            .copied()
            .filter(|id| self.core.registry.unregister(*id, until).is_some())
            .collect();
        if removed.is_empty() {
            return 0;
        }
        if removed.len() >= self.core.config.bulk_destroy_threshold {
            debug!("mass unregister of {} visual(s), boosting destroy drain", removed.len());
            self.core.arm_mass_destroy_boost();
        }
        self.core.hide_from_viewers(&removed, false);
        removed.len()
    }

    fn reset_viewers(&self, replaced: &[(VisualId, TokenVersion)]) {
        for entry in self.core.viewers.iter() {
            for (id, token) in replaced {
                let dropped = entry.value().queue().invalidate_visual(*id, *token);
                TrackerCounters::add(&self.core.counters.dropped_stale_packets, dropped as u64);
            }
        }
        let ids: Vec<VisualId> = replaced.iter().map(|(id, _)| *id).collect();
        self.core.hide_from_viewers(&ids, true);
    }

    /// Whether `id` was recently unregistered and must not be acted on.
    pub fn is_visual_closed(&self, id: VisualId) -> bool {
        self.core.registry.is_closed(id, self.current_tick())
    }

    // Viewers

    /// Returns false if the viewer was already known.
    pub fn add_viewer(&self, viewer: ViewerId) -> bool {
        if self.core.viewers.contains_key(&viewer) {
            return false;
        }
        self.core.viewer_slot(viewer);
        true
    }

    /// Drops the viewer's tracking state and queue. Work still in flight for
    /// it is discarded.
    pub fn remove_viewer(&self, viewer: ViewerId) -> bool {
        match self.core.viewers.remove(&viewer) {
            Some((_, slot)) => {
                slot.close();
                debug!("{} disconnected", viewer);
                true
            }
            None => {
                warn!("remove_viewer called for unknown {}", viewer);
                false
            }
        }
    }

    pub fn has_viewer(&self, viewer: ViewerId) -> bool {
        self.core.viewers.contains_key(&viewer)
    }

    pub fn viewer_count(&self) -> usize {
        self.core.viewers.len()
    }

    /// Ids currently considered spawned for `viewer`.
    pub fn visible_ids(&self, viewer: ViewerId) -> Vec<VisualId> {
        let Some(slot) = self.core.viewers.get(&viewer).map(|entry| entry.value().clone()) else {
            return Vec::new();
        };
        let mut ids: Vec<VisualId> = slot.tracking().visible_ids().collect();
        ids.sort_unstable();
        ids
    }

    /// Packets waiting in `viewer`'s queue.
    pub fn queued_packets(&self, viewer: ViewerId) -> usize {
        self.core
            .viewers
            .get(&viewer)
            .map_or(0, |slot| slot.queue().len())
    }

    // Tick

    /// Runs one tick from a session provider.
    pub fn tick_sessions(&self, sessions: &dyn SessionProvider) -> DrainReport {
        self.tick(sessions.viewer_frames(), sessions.view_distance_squared())
    }

    /// Runs one tick: expires tombstones, applies owed hides for viewers no
    /// job is holding, sizes this tick's shedding from the queue backlog,
    /// admits the async phase for `frames` and drains every queue within
    /// budget.
    /// Viewers seen for the first time are added. A non-positive view distance
    /// falls back to the configured one.
    pub fn tick(&self, frames: Vec<ViewerFrame>, view_distance_squared: f64) -> DrainReport {
        if !self.is_started() {
            warn!("tick called on a visual tracker that is not started");
            return DrainReport::default();
        }

        let tick = self.core.tick.fetch_add(1, Ordering::AcqRel) + 1;
        let expired = self.core.registry.tombstones().prune_expired(tick);
        if expired > 0 {
            debug!("expired {} tombstone(s) at tick {}", expired, tick);
        }

        for frame in &frames {
            self.core.viewer_slot(frame.viewer);
        }

        let slots = self.core.sorted_slots();
        let mut backlog = QueueBacklog::default();
        for slot in &slots {
            backlog.pending_destroy_ids += slot.pending_destroys().len();
            backlog.total_packets += slot.queue().len();
            backlog.metadata_packets += slot.queue().lane_len(PacketPriority::Metadata);
            backlog.destroy_packets += slot.queue().lane_len(PacketPriority::Destroy);
            // a viewer whose job is running applies its own hides
            if let Some(mut tracking) = slot.try_tracking() {
                self.core.apply_pending_hides(slot, &mut tracking);
            }
        }

        let threshold = self.core.config.destroy_backlog_threshold;
        let destroy_drain_fast_path = backlog.destroy_drain_fast_path(threshold);
        let shedding = resolve_shedding(&backlog, threshold);
        if shedding.is_active() {
            debug!("shedding at intensity {} on tick {} ({:?})", shedding.intensity, tick, backlog);
        }
        let counters = &self.core.counters;
        counters
            .pending_destroy_backlog
            .store(backlog.pending_destroy_ids as u64, Ordering::Relaxed);
        counters
            .shedding_intensity
            .store(u64::from(shedding.intensity), Ordering::Relaxed);
        counters
            .destroy_drain_fast_path
            .store(u64::from(destroy_drain_fast_path), Ordering::Relaxed);

        let view_distance_squared = if view_distance_squared.is_finite() && view_distance_squared > 0.0 {
            view_distance_squared
        } else {
            self.core.config.view_distance_squared()
        };
        let coordinator = self.runner.coordinator();
        let pressure_multiplier = resolve_backlog_pressure_multiplier(
            coordinator.last_duration(),
            &self.core.config.backlog_pressure,
        );
        self.runner.submit(AsyncPhaseRequest {
            tick,
            view_distance_squared,
            frames,
            pressure_multiplier,
            shedding,
            destroy_drain_fast_path,
        });

        let burst = DestroyBurst {
            fast_path: destroy_drain_fast_path,
            mass_boost: self.core.take_mass_destroy_boost(),
        };
        self.scheduler.flush(
            &slots,
            &self.core.factory,
            |id, token| self.core.is_current(id, token),
            &self.core.counters,
            tick,
            burst,
        )
    }

    /// Snapshot of the engine's counters.
    pub fn stats(&self) -> TrackerStats {
        let coordinator = self.runner.coordinator();
        TrackerStats {
            async_skipped_ticks: coordinator.skipped_ticks(),
            async_fallback_used: coordinator.fallback_used(),
            last_async_phase: coordinator.last_duration(),
            ..self.core.counters.snapshot()
        }
    }

    /// Forgets every Visual and viewer. Tokens survive so packets built before
    /// the clear can never validate again.
    pub fn clear(&self) {
        let viewers: Vec<ViewerId> = self.core.viewers.iter().map(|entry| *entry.key()).collect();
        for viewer in viewers {
            if let Some((_, slot)) = self.core.viewers.remove(&viewer) {
                slot.close();
            }
        }
        self.core.registry.clear();
        self.core.counters.reset();
        self.core.mass_destroy_boost_ticks.store(0, Ordering::Release);
        info!("visual tracker cleared");
    }
}

impl<F: PacketFactory> Drop for VisualTracker<F> {
    fn drop(&mut self) {
        self.stop();
    }
}
