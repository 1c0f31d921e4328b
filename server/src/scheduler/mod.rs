mod async_phase;
mod backlog_pressure;
mod budget_scheduler;
mod shedding;
mod stats;

pub use async_phase::{
    AsyncPhaseCoordinator, AsyncPhaseRequest, AsyncPhaseRunner, PhaseExecutor, PhaseParallelism,
    PhaseSubmission,
};
pub use backlog_pressure::{
    resolve_backlog_pressure_multiplier, PRESSURE_HEAVY, PRESSURE_MODERATE, PRESSURE_NONE,
};
pub use budget_scheduler::{
    drain_queue, DestroyBurst, DrainBudget, DrainReport, RenderNetworkBudgetScheduler, ViewerDrain,
};
pub use shedding::{resolve_shedding, QueueBacklog, SheddingState};
pub use stats::TrackerStats;
pub(crate) use stats::TrackerCounters;
