pub mod affinity;
pub mod cancel;
pub mod local;
pub mod manager;
pub mod pbs;
mod process;
pub mod progress;
pub mod runner;

use std::path::PathBuf;

pub use affinity::{CpuAffinityPool, CpuLease};
pub use cancel::CancellationToken;
pub use local::{LocalRunner, LocalRunnerFactory};
pub use manager::{JobFailure, JobManager, JobManagerConfig, JobState, RunState, RunSummary};
pub use pbs::{PbsRunner, PbsRunnerFactory, SUBMIT_SCRIPT};
pub use progress::{
    format_hms, parse_progress, ConsoleOutputHandler, ConsoleProgressReporter, OutputHandler,
    ProgressReporter, ProgressSnapshot, ProgressTracker, DEFAULT_REPORT_INTERVAL,
};
pub use runner::{runner_factory, JobMonitor, Runner, RunnerFactory};

/// Local runs are limited to a single processor group.
pub const MAX_LOCAL_CPUS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("simulation {job} failed: {status}")]
    Model {
        job: String,
        status: String,
        /// Trailing lines the model wrote to stderr.
        stderr: Vec<String>,
    },
    #[error("run cancelled")]
    Cancelled,
    #[error("cpu_count is {requested} but this host only has {available} CPUs")]
    CpuCount { requested: usize, available: usize },
    #[error("local runs support at most 64 CPUs, requested {requested}")]
    TooManyCpus { requested: usize },
    #[error("failed to write submission config {}: {source}", path.display())]
    Conf {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("job task failed: {0}")]
    Join(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}
