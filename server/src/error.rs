use thiserror::Error;

use visync_shared::ConfigError;

/// Errors raised while constructing or starting a `VisualTracker`
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The supplied configuration failed validation
    #[error("Invalid tracker configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The compute thread pool could not be created
    #[error("Failed to build compute thread pool with {threads} thread(s): {reason}")]
    ThreadPool { threads: usize, reason: String },

    /// The async phase worker thread could not be spawned
    #[error("Failed to spawn async phase worker thread")]
    WorkerSpawn {
        #[source]
        source: std::io::Error,
    },
}
