use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{trace, warn};

use visync_shared::{PacketFactory, PacketPriority, Tick, TokenVersion, TrackerConfig, VisualId};

use crate::{
    packet::{HeadAction, PacketHeader, PlayerPacketQueue, Polled},
    viewer::ViewerSlot,
};

use super::stats::TrackerCounters;

/// Extra room DESTROY packets get in a drain while the destroy backlog is
/// being worked off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DestroyBurst {
    /// The destroy drain fast path is active: DESTROYs may go past the packet
    /// cap by `DrainBudget::destroy_extra_packets`.
    pub fast_path: bool,
    /// A mass unregister happened in the last ticks: DESTROYs get half again
    /// the packet cap (at least 16 more) and half again the byte cap.
    pub mass_boost: bool,
}

impl DestroyBurst {
    pub fn is_active(&self) -> bool {
        self.fast_path || self.mass_boost
    }
}

/// Per-tick limits of the dispatch drain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainBudget {
    /// Hard cutoff shared by every viewer drained in one tick.
    pub time_budget: Duration,
    /// Bytes per viewer, `0` for no limit.
    pub max_bytes: usize,
    /// Packets per viewer, `0` for no limit.
    pub max_packets: usize,
    /// DESTROY packets allowed past `max_packets` under the fast path.
    pub destroy_extra_packets: usize,
    pub burst: DestroyBurst,
}

impl DrainBudget {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            time_budget: config.flush_time_budget(),
            max_bytes: config.max_bytes_per_tick,
            max_packets: config.max_packets_per_tick,
            destroy_extra_packets: config.destroy_drain_extra_packets_per_tick,
            burst: DestroyBurst::default(),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            time_budget: Duration::MAX,
            max_bytes: 0,
            max_packets: 0,
            destroy_extra_packets: 0,
            burst: DestroyBurst::default(),
        }
    }

    pub fn with_burst(mut self, burst: DestroyBurst) -> Self {
        self.burst = burst;
        self
    }

    /// Packet cap DESTROYs are held to, `None` for no cap.
    fn destroy_packet_cap(&self) -> Option<usize> {
        if self.max_packets == 0 {
            return None;
        }
        let mut cap = self.max_packets;
        if self.burst.fast_path {
            cap += self.destroy_extra_packets;
        }
        if self.burst.mass_boost {
            cap += (cap / 2).max(16);
        }
        Some(cap)
    }

    fn destroy_byte_cap(&self) -> usize {
        if self.burst.mass_boost {
            self.max_bytes + self.max_bytes / 2
        } else {
            self.max_bytes
        }
    }
}

/// What a single viewer's drain produced.
pub struct ViewerDrain<P> {
    pub payloads: Vec<P>,
    pub bytes: usize,
    pub dropped_stale: usize,
    /// Tick each drained DESTROY was registered at.
    pub destroy_ticks: Vec<Tick>,
    /// True if the shared deadline passed during this drain.
    pub timed_out: bool,
}

/// Pulls packets off `queue` in priority order while they fit the per-viewer
/// byte and packet caps and `deadline` has not passed. Stale packets are
/// discarded on the way. A head packet larger than the whole byte cap is sent
/// on its own when nothing else was taken yet, so it can never block the queue.
/// An active `DestroyBurst` lets DESTROY packets past the regular caps.
pub fn drain_queue<P>(
    queue: &PlayerPacketQueue<P>,
    budget: &DrainBudget,
    deadline: Option<Instant>,
    is_current: impl Fn(VisualId, TokenVersion) -> bool,
) -> ViewerDrain<P> {
    let mut drain = ViewerDrain {
        payloads: Vec::new(),
        bytes: 0,
        dropped_stale: 0,
        destroy_ticks: Vec::new(),
        timed_out: false,
    };
    let destroy_cap = budget.destroy_packet_cap();
    let destroy_byte_cap = budget.destroy_byte_cap();

    loop {
        if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
            drain.timed_out = true;
            break;
        }

        let sent = drain.payloads.len();
        let bytes = drain.bytes;
        let decide = |header: &PacketHeader| {
            if let (Some(id), Some(token)) = (header.visual_id, header.token) {
                if !is_current(id, token) {
                    return HeadAction::Discard;
                }
            }
            let destroy = header.priority == PacketPriority::Destroy;
            if destroy_cap.map_or(false, |cap| sent >= cap) {
                return HeadAction::Keep;
            }
            let bursting = destroy && budget.burst.is_active();
            if budget.max_packets > 0 && sent >= budget.max_packets && !bursting {
                return HeadAction::Keep;
            }
            let byte_cap = if destroy { destroy_byte_cap } else { budget.max_bytes };
            if budget.max_bytes > 0 && sent > 0 && bytes + header.estimated_bytes > byte_cap {
                return HeadAction::Keep;
            }
            if budget.max_bytes > 0 && sent == 0 && header.estimated_bytes > budget.max_bytes {
                trace!("sending oversized {} byte packet alone", header.estimated_bytes);
            }
            HeadAction::Take
        };

        match queue.poll_with(decide) {
            Polled::Empty | Polled::Kept => break,
            Polled::Discarded(packet) => {
                trace!(
                    "dropping stale {} packet for {:?}",
                    packet.priority().name(),
                    packet.visual_id()
                );
                drain.dropped_stale += 1;
            }
            Polled::Taken(packet) => {
                drain.bytes += packet.estimated_bytes();
                if let Some(tick) = packet.destroy_registered_tick() {
                    drain.destroy_ticks.push(tick);
                }
                drain.payloads.push(packet.into_payload());
            }
        }
    }

    drain
}

/// Totals of one dispatch pass over all viewers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub viewers_drained: usize,
    pub sent_packets: usize,
    pub sent_bytes: usize,
    pub send_failures: usize,
    pub dropped_stale: usize,
    pub deferred: usize,
    pub timed_out: bool,
}

/// The dispatch side of a tick: drains every viewer's queue under a shared
/// time budget and hands each viewer's payloads to the factory as one bundle.
/// The viewer drained first rotates every tick.
pub struct RenderNetworkBudgetScheduler {
    budget: DrainBudget,
    rotation: AtomicUsize,
}

impl RenderNetworkBudgetScheduler {
    pub fn new(budget: DrainBudget) -> Self {
        Self {
            budget,
            rotation: AtomicUsize::new(0),
        }
    }

    pub fn budget(&self) -> &DrainBudget {
        &self.budget
    }

    /// Drains `slots`, which must be sorted by viewer id for rotation to be fair.
    pub(crate) fn flush<F: PacketFactory>(
        &self,
        slots: &[Arc<ViewerSlot<F::Payload>>],
        factory: &F,
        is_current: impl Fn(VisualId, TokenVersion) -> bool,
        counters: &TrackerCounters,
        tick: Tick,
        burst: DestroyBurst,
    ) -> DrainReport {
        let mut report = DrainReport::default();
        if slots.is_empty() {
            return report;
        }

        let budget = self.budget.with_burst(burst);
        if burst.is_active() {
            trace!("draining with destroy burst {:?} at tick {}", burst, tick);
        }
        let deadline = Instant::now().checked_add(budget.time_budget);
        let start = self.rotation.fetch_add(1, Ordering::Relaxed) % slots.len();

        for offset in 0..slots.len() {
            let slot = &slots[(start + offset) % slots.len()];
            if slot.is_closed() {
                continue;
            }
            if report.timed_out {
                report.deferred += slot.queue().len();
                continue;
            }

            let drain = drain_queue(slot.queue(), &budget, deadline, &is_current);
            report.viewers_drained += 1;
            report.dropped_stale += drain.dropped_stale;
            report.timed_out = drain.timed_out;
            report.deferred += slot.queue().len();

            let count = drain.payloads.len();
            counters.record_viewer_drain(count as u64);
            for registered_at in &drain.destroy_ticks {
                counters.record_destroy_latency(*registered_at, tick);
            }
            if count == 0 {
                continue;
            }

            match factory.send_bundle(slot.viewer(), drain.payloads) {
                Ok(()) => {
                    report.sent_packets += count;
                    report.sent_bytes += drain.bytes;
                }
                Err(err) => {
                    warn!("dropping {} packet(s) for {}: {}", count, slot.viewer(), err);
                    report.send_failures += 1;
                }
            }
        }

        TrackerCounters::add(&counters.sent_packets, report.sent_packets as u64);
        TrackerCounters::add(&counters.sent_bytes, report.sent_bytes as u64);
        TrackerCounters::add(&counters.send_failures, report.send_failures as u64);
        TrackerCounters::add(&counters.dropped_stale_packets, report.dropped_stale as u64);
        counters
            .deferred_packets
            .store(report.deferred as u64, Ordering::Relaxed);
        report
    }
}
