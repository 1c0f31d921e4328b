use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam_channel::{unbounded, Sender};
use log::{debug, error, info, warn};

use visync_shared::{Tick, ViewerFrame};

use crate::{error::TrackerError, sync::lock};

use super::shedding::SheddingState;

/// Parameters of one async compute phase.
#[derive(Clone, Debug, PartialEq)]
pub struct AsyncPhaseRequest {
    pub tick: Tick,
    pub view_distance_squared: f64,
    pub frames: Vec<ViewerFrame>,
    pub pressure_multiplier: usize,
    pub shedding: SheddingState,
    /// Viewers skip their visibility pass while the destroy backlog drains.
    pub destroy_drain_fast_path: bool,
}

/// Outcome of offering a request to the coordinator.
#[derive(Debug, PartialEq)]
pub enum PhaseSubmission {
    /// No phase was running; the caller must run this request.
    Started(AsyncPhaseRequest),
    /// A phase is in flight; the request replaced any older pending one.
    Coalesced,
}

#[derive(Default)]
struct CoordinatorState {
    in_flight: bool,
    pending: Option<AsyncPhaseRequest>,
    consecutive_skips: u64,
    skipped_ticks: u64,
    fallback_used: u64,
    completed_phases: u64,
    last_duration: Duration,
}

/// Admission control for the async phase: at most one phase in flight and at
/// most one pending request behind it, always the newest.
#[derive(Default)]
pub struct AsyncPhaseCoordinator {
    state: Mutex<CoordinatorState>,
}

impl AsyncPhaseCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&self, request: AsyncPhaseRequest) -> PhaseSubmission {
        let mut state = lock(&self.state);
        if !state.in_flight {
            state.in_flight = true;
            state.consecutive_skips = 0;
            return PhaseSubmission::Started(request);
        }

        state.skipped_ticks += 1;
        state.consecutive_skips += 1;
        if state.consecutive_skips == 1 {
            state.fallback_used += 1;
            debug!("async phase still running at tick {}, coalescing", request.tick);
        }
        state.pending = Some(request);
        PhaseSubmission::Coalesced
    }

    /// Records a finished phase. Returns the pending request, which the caller
    /// must run next; the coordinator stays in flight in that case.
    pub fn finish(&self, duration: Duration) -> Option<AsyncPhaseRequest> {
        let mut state = lock(&self.state);
        state.last_duration = duration;
        state.completed_phases += 1;
        let next = state.pending.take();
        state.in_flight = next.is_some();
        next
    }

    /// Forgets any in-flight or pending phase.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.in_flight = false;
        state.pending = None;
        state.consecutive_skips = 0;
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.state).in_flight
    }

    pub fn pending(&self) -> Option<AsyncPhaseRequest> {
        lock(&self.state).pending.clone()
    }

    pub fn last_duration(&self) -> Duration {
        lock(&self.state).last_duration
    }

    pub fn skipped_ticks(&self) -> u64 {
        lock(&self.state).skipped_ticks
    }

    pub fn fallback_used(&self) -> u64 {
        lock(&self.state).fallback_used
    }

    pub fn completed_phases(&self) -> u64 {
        lock(&self.state).completed_phases
    }
}

cfg_if! {
    if #[cfg(feature = "parallel")] {
        use rayon::prelude::*;

        /// How per-viewer jobs of a phase are spread over threads.
        pub enum PhaseParallelism {
            Inline,
            Pool(rayon::ThreadPool),
        }

        impl PhaseParallelism {
            fn for_threads(threads: usize) -> Result<Self, TrackerError> {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|index| format!("visync-compute-{}", index))
                    .build()
                    .map(PhaseParallelism::Pool)
                    .map_err(|err| TrackerError::ThreadPool {
                        threads,
                        reason: err.to_string(),
                    })
            }

            pub fn for_each<T, F>(&self, items: &[T], job: F)
            where
                T: Sync,
                F: Fn(&T) + Sync + Send,
            {
                match self {
                    PhaseParallelism::Inline => items.iter().for_each(job),
                    PhaseParallelism::Pool(pool) => pool.install(|| items.par_iter().for_each(job)),
                }
            }
        }
    } else {
        /// How per-viewer jobs of a phase are spread over threads.
        pub enum PhaseParallelism {
            Inline,
        }

        impl PhaseParallelism {
            fn for_threads(_threads: usize) -> Result<Self, TrackerError> {
                Ok(PhaseParallelism::Inline)
            }

            pub fn for_each<T, F>(&self, items: &[T], job: F)
            where
                T: Sync,
                F: Fn(&T) + Sync + Send,
            {
                items.iter().for_each(job)
            }
        }
    }
}

/// The work an async phase performs. Implementations only write into viewer
/// queues and never touch the transport.
pub trait PhaseExecutor: Send + Sync + 'static {
    fn run_phase(&self, request: &AsyncPhaseRequest, parallelism: &PhaseParallelism);
}

struct PhaseWorker {
    sender: Sender<AsyncPhaseRequest>,
    handle: JoinHandle<()>,
}

/// Runs admitted phases either inline on the ticking thread (zero compute
/// threads) or on a dedicated background worker fed through a channel.
pub struct AsyncPhaseRunner {
    coordinator: Arc<AsyncPhaseCoordinator>,
    executor: Arc<dyn PhaseExecutor>,
    worker: Mutex<Option<PhaseWorker>>,
}

impl AsyncPhaseRunner {
    pub fn new(coordinator: Arc<AsyncPhaseCoordinator>, executor: Arc<dyn PhaseExecutor>) -> Self {
        Self {
            coordinator,
            executor,
            worker: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &Arc<AsyncPhaseCoordinator> {
        &self.coordinator
    }

    pub fn is_threaded(&self) -> bool {
        lock(&self.worker).is_some()
    }

    /// Spawns the background worker. With zero threads nothing is spawned and
    /// every phase runs inline.
    pub fn start(&self, threads: usize) -> Result<(), TrackerError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() || threads == 0 {
            return Ok(());
        }

        let parallelism = PhaseParallelism::for_threads(threads)?;
        let (sender, receiver) = unbounded::<AsyncPhaseRequest>();
        let coordinator = self.coordinator.clone();
        let executor = self.executor.clone();
        let handle = std::thread::Builder::new()
            .name("visync-async-phase".to_string())
            .spawn(move || {
                for request in receiver.iter() {
                    run_until_idle(&coordinator, executor.as_ref(), &parallelism, request);
                }
            })
            .map_err(|source| TrackerError::WorkerSpawn { source })?;

        info!("async phase worker started with {} compute thread(s)", threads);
        *worker = Some(PhaseWorker { sender, handle });
        Ok(())
    }

    /// Closes the worker's channel and waits for the phase in flight, if any.
    pub fn stop(&self) {
        let Some(PhaseWorker { sender, handle }) = lock(&self.worker).take() else {
            return;
        };
        drop(sender);
        if handle.join().is_err() {
            error!("async phase worker panicked while stopping");
        }
        self.coordinator.reset();
        info!("async phase worker stopped");
    }

    /// Offers a request to the coordinator and runs it if admitted.
    pub fn submit(&self, request: AsyncPhaseRequest) {
        let request = match self.coordinator.submit(request) {
            PhaseSubmission::Started(request) => request,
            PhaseSubmission::Coalesced => return,
        };

        let rejected = {
            let worker = lock(&self.worker);
            match worker.as_ref() {
                Some(worker) => worker.sender.send(request).err().map(|err| err.into_inner()),
                None => Some(request),
            }
        };

        if let Some(request) = rejected {
            if self.is_threaded() {
                warn!("async phase worker is gone, running tick {} inline", request.tick);
            }
            run_until_idle(
                &self.coordinator,
                self.executor.as_ref(),
                &PhaseParallelism::Inline,
                request,
            );
        }
    }
}

impl Drop for AsyncPhaseRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs `request`, then whatever the coordinator coalesced while it ran,
/// until nothing is pending.
fn run_until_idle(
    coordinator: &AsyncPhaseCoordinator,
    executor: &dyn PhaseExecutor,
    parallelism: &PhaseParallelism,
    mut request: AsyncPhaseRequest,
) {
    loop {
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| executor.run_phase(&request, parallelism)));
        if outcome.is_err() {
            error!("async phase for tick {} panicked", request.tick);
        }
        match coordinator.finish(started.elapsed()) {
            Some(next) => request = next,
            None => return,
        }
    }
}
