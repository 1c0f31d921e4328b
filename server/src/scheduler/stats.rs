use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use visync_shared::Tick;

/// Point-in-time view of the engine's counters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackerStats {
    /// Ticks whose async phase request was coalesced into a pending one.
    pub async_skipped_ticks: u64,
    /// Runs of consecutive skipped ticks.
    pub async_fallback_used: u64,
    /// Non-critical METADATA packets replaced by a newer one.
    pub coalesced_task_count: u64,
    /// Coalescible TELEPORT packets replaced by a newer one.
    pub coalesced_updates: u64,
    /// Packets dropped for carrying a stale token, at enqueue or at drain.
    pub dropped_stale_packets: u64,
    /// Packets left queued when the last drain ran out of budget.
    pub deferred_packets: u64,
    pub sent_packets: u64,
    pub sent_bytes: u64,
    pub send_failures: u64,
    pub last_async_phase: Duration,
    pub last_pressure_multiplier: usize,
    pub average_packets_per_viewer: f64,
    pub peak_packets_per_viewer: u64,
    pub average_destroy_latency_ticks: f64,
    pub peak_destroy_latency_ticks: u64,
    /// Ids hidden by unregister or re-registration still waiting for their DESTROY.
    pub pending_destroy_backlog: u64,
    /// Teleports held back because a MID or FAR tier interval had not elapsed.
    pub lod_skipped_updates: u64,
    /// Metadata updates held back for FAR Visuals.
    pub lod_skipped_metadata_updates: u64,
    /// Metadata updates held back by load shedding.
    pub shed_metadata_updates: u64,
    /// Load shedding intensity of the last tick, `0` when off.
    pub shedding_intensity: u8,
    pub destroy_drain_fast_path: bool,
}

#[derive(Default)]
pub(crate) struct TrackerCounters {
    pub coalesced_task_count: AtomicU64,
    pub coalesced_updates: AtomicU64,
    pub dropped_stale_packets: AtomicU64,
    pub deferred_packets: AtomicU64,
    pub sent_packets: AtomicU64,
    pub sent_bytes: AtomicU64,
    pub send_failures: AtomicU64,
    pub last_pressure_multiplier: AtomicU64,
    pub viewer_drains: AtomicU64,
    pub peak_packets_per_viewer: AtomicU64,
    pub destroy_latency_total: AtomicU64,
    pub destroy_latency_samples: AtomicU64,
    pub peak_destroy_latency: AtomicU64,
    pub pending_destroy_backlog: AtomicU64,
    pub lod_skipped_updates: AtomicU64,
    pub lod_skipped_metadata_updates: AtomicU64,
    pub shed_metadata_updates: AtomicU64,
    pub shedding_intensity: AtomicU64,
    pub destroy_drain_fast_path: AtomicU64,
}

impl TrackerCounters {
    pub fn add(counter: &AtomicU64, amount: u64) {
        if amount > 0 {
            counter.fetch_add(amount, Ordering::Relaxed);
        }
    }

    pub fn record_viewer_drain(&self, packets: u64) {
        self.viewer_drains.fetch_add(1, Ordering::Relaxed);
        self.peak_packets_per_viewer
            .fetch_max(packets, Ordering::Relaxed);
    }

    pub fn record_destroy_latency(&self, registered_at: Tick, sent_at: Tick) {
        let latency = sent_at.saturating_sub(registered_at);
        self.destroy_latency_total
            .fetch_add(latency, Ordering::Relaxed);
        self.destroy_latency_samples.fetch_add(1, Ordering::Relaxed);
        self.peak_destroy_latency.fetch_max(latency, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TrackerStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let sent_packets = load(&self.sent_packets);
        let viewer_drains = load(&self.viewer_drains);
        let latency_samples = load(&self.destroy_latency_samples);
        TrackerStats {
            coalesced_task_count: load(&self.coalesced_task_count),
            coalesced_updates: load(&self.coalesced_updates),
            dropped_stale_packets: load(&self.dropped_stale_packets),
            deferred_packets: load(&self.deferred_packets),
            sent_packets,
            sent_bytes: load(&self.sent_bytes),
            send_failures: load(&self.send_failures),
            last_pressure_multiplier: usize::try_from(load(&self.last_pressure_multiplier))
                .unwrap_or(usize::MAX),
            average_packets_per_viewer: ratio(sent_packets, viewer_drains),
            peak_packets_per_viewer: load(&self.peak_packets_per_viewer),
            average_destroy_latency_ticks: ratio(load(&self.destroy_latency_total), latency_samples),
            peak_destroy_latency_ticks: load(&self.peak_destroy_latency),
            pending_destroy_backlog: load(&self.pending_destroy_backlog),
            lod_skipped_updates: load(&self.lod_skipped_updates),
            lod_skipped_metadata_updates: load(&self.lod_skipped_metadata_updates),
            shed_metadata_updates: load(&self.shed_metadata_updates),
            shedding_intensity: u8::try_from(load(&self.shedding_intensity)).unwrap_or(u8::MAX),
            destroy_drain_fast_path: load(&self.destroy_drain_fast_path) != 0,
            ..TrackerStats::default()
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.coalesced_task_count,
            &self.coalesced_updates,
            &self.dropped_stale_packets,
            &self.deferred_packets,
            &self.sent_packets,
            &self.sent_bytes,
            &self.send_failures,
            &self.last_pressure_multiplier,
            &self.viewer_drains,
            &self.peak_packets_per_viewer,
            &self.destroy_latency_total,
            &self.destroy_latency_samples,
            &self.peak_destroy_latency,
            &self.pending_destroy_backlog,
            &self.lod_skipped_updates,
            &self.lod_skipped_metadata_updates,
            &self.shed_metadata_updates,
            &self.shedding_intensity,
            &self.destroy_drain_fast_path,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn ratio(total: u64, samples: u64) -> f64 {
    if samples == 0 {
        0.0
    } else {
        total as f64 / samples as f64
    }
}
