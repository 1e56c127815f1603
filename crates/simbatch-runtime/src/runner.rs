use crate::affinity::CpuAffinityPool;
use crate::cancel::CancellationToken;
use crate::local::LocalRunnerFactory;
use crate::pbs::PbsRunnerFactory;
use crate::progress::{OutputHandler, ProgressTracker};
use crate::RuntimeResult;
use async_trait::async_trait;
use simbatch_pipeline::{Job, RunConfig, RunnerSettings};
use std::sync::Arc;

/// Launches the model for a single job.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(
        &self,
        job: &Job,
        monitor: &JobMonitor,
        cancel: &CancellationToken,
    ) -> RuntimeResult<()>;
}

/// Builds one runner per job, so per-job resources such as a CPU lease live
/// exactly as long as the job.
pub trait RunnerFactory: Send + Sync {
    fn create_runner(&self, job: &Job) -> RuntimeResult<Box<dyn Runner>>;
}

/// Routes a job's progress and output to the run-wide handlers.
#[derive(Clone)]
pub struct JobMonitor {
    job: String,
    tracker: Arc<ProgressTracker>,
    output: Arc<dyn OutputHandler>,
}

impl JobMonitor {
    pub fn new(
        job: impl Into<String>,
        tracker: Arc<ProgressTracker>,
        output: Arc<dyn OutputHandler>,
    ) -> Self {
        Self {
            job: job.into(),
            tracker,
            output,
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn progress(&self, percent: u8) {
        self.tracker.update(&self.job, percent);
    }

    pub fn stdout(&self, line: &str) {
        self.output.stdout(&self.job, line);
    }

    pub fn stderr(&self, line: &str) {
        self.output.stderr(&self.job, line);
    }
}

/// The runner factory selected by the run configuration.
pub fn runner_factory(config: &RunConfig) -> Arc<dyn RunnerFactory> {
    match &config.runner {
        RunnerSettings::Local => {
            let mut factory =
                LocalRunnerFactory::new(config.guess_path.clone(), config.input_module.clone());
            if config.cpu_affinity {
                factory = factory.with_affinity(CpuAffinityPool::for_host());
            }
            Arc::new(factory)
        }
        RunnerSettings::Pbs(settings) => Arc::new(PbsRunnerFactory::new(
            settings.clone(),
            config.guess_path.clone(),
            config.input_module.clone(),
            config.cpu_count,
            config.dry_run,
        )),
    }
}
