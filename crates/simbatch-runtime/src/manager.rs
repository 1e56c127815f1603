use crate::cancel::CancellationToken;
use crate::progress::{
    ConsoleOutputHandler, ConsoleProgressReporter, OutputHandler, ProgressReporter,
    ProgressTracker, DEFAULT_REPORT_INTERVAL,
};
use crate::runner::{JobMonitor, RunnerFactory};
use crate::{available_cpus, RuntimeError, RuntimeResult, MAX_LOCAL_CPUS};
use parking_lot::Mutex;
use simbatch_pipeline::{Job, RunConfig};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobManagerConfig {
    /// Upper bound on concurrently running jobs.
    pub cpu_count: usize,
    pub dry_run: bool,
    /// Jobs run on this host rather than being submitted to a cluster.
    pub local: bool,
}

impl JobManagerConfig {
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            cpu_count: usize::from(config.cpu_count),
            dry_run: config.dry_run,
            local: config.run_local(),
        }
    }

    /// Number of worker slots on a host with `host_cpus` CPUs.
    pub fn workers(&self, host_cpus: usize) -> RuntimeResult<usize> {
        if self.local && self.cpu_count > MAX_LOCAL_CPUS {
            return Err(RuntimeError::TooManyCpus {
                requested: self.cpu_count,
            });
        }
        if self.cpu_count > host_cpus {
            return Err(RuntimeError::CpuCount {
                requested: self.cpu_count,
                available: host_cpus,
            });
        }
        Ok(self.cpu_count.clamp(1, host_cpus.max(1)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug)]
pub struct JobFailure {
    pub job: String,
    pub error: RuntimeError,
}

/// Outcome of [`JobManager::run`].
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Failures in the order they were observed.
    pub errors: Vec<JobFailure>,
    /// Wall-clock time of every job that ran to completion or failure.
    pub durations: BTreeMap<String, Duration>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    pub fn first_error(&self) -> Option<&JobFailure> {
        self.errors.first()
    }

    fn record(&mut self, job: String, outcome: RuntimeResult<()>, elapsed: Option<Duration>) {
        match outcome {
            Ok(()) => self.succeeded += 1,
            Err(RuntimeError::Cancelled) => self.cancelled += 1,
            Err(error) => {
                self.failed += 1;
                self.errors.push(JobFailure {
                    job: job.clone(),
                    error,
                });
            }
        }
        if let Some(elapsed) = elapsed {
            self.durations.insert(job, elapsed);
        }
    }
}

/// Runs jobs through a [`RunnerFactory`] with at most `workers` in flight.
pub struct JobManager {
    config: JobManagerConfig,
    workers: usize,
    factory: Arc<dyn RunnerFactory>,
    reporter: Arc<dyn ProgressReporter>,
    output: Arc<dyn OutputHandler>,
    report_interval: Duration,
    states: Arc<Mutex<BTreeMap<String, JobState>>>,
    run_state: Mutex<RunState>,
}

impl JobManager {
    pub fn new(config: JobManagerConfig, factory: Arc<dyn RunnerFactory>) -> RuntimeResult<Self> {
        Self::with_host_cpus(config, factory, available_cpus())
    }

    pub fn with_host_cpus(
        config: JobManagerConfig,
        factory: Arc<dyn RunnerFactory>,
        host_cpus: usize,
    ) -> RuntimeResult<Self> {
        let workers = config.workers(host_cpus)?;
        Ok(Self {
            config,
            workers,
            factory,
            reporter: Arc::new(ConsoleProgressReporter),
            output: Arc::new(ConsoleOutputHandler { quiet: true }),
            report_interval: DEFAULT_REPORT_INTERVAL,
            states: Arc::new(Mutex::new(BTreeMap::new())),
            run_state: Mutex::new(RunState::Idle),
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_output(mut self, output: Arc<dyn OutputHandler>) -> Self {
        self.output = output;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run_state(&self) -> RunState {
        *self.run_state.lock()
    }

    pub fn job_states(&self) -> BTreeMap<String, JobState> {
        self.states.lock().clone()
    }

    /// Runs every job to completion, failure or cancellation. Failed jobs do
    /// not stop their siblings; all failures are collected in the summary.
    pub async fn run(&self, jobs: Vec<Job>, cancel: &CancellationToken) -> RuntimeResult<RunSummary> {
        let mut summary = RunSummary {
            total: jobs.len(),
            ..RunSummary::default()
        };
        *self.states.lock() = jobs
            .iter()
            .map(|job| (job.name.clone(), JobState::Pending))
            .collect();
        *self.run_state.lock() = RunState::Running;

        if self.config.dry_run {
            println!("Dry run - {} jobs would be executed", jobs.len());
            for job in &jobs {
                println!("  {} {}", job.name, job.ins_file.display());
            }
            *self.run_state.lock() = RunState::Completed;
            return Ok(summary);
        }

        info!(jobs = jobs.len(), workers = self.workers, "starting jobs");
        let tracker = Arc::new(ProgressTracker::new(
            jobs.iter().map(|job| job.name.clone()),
            Arc::clone(&self.reporter),
            self.report_interval,
        ));
        let slots = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();

        for job in jobs {
            let name = job.name.clone();
            let slots = Arc::clone(&slots);
            let factory = Arc::clone(&self.factory);
            let states = Arc::clone(&self.states);
            let tracker = Arc::clone(&tracker);
            let monitor = JobMonitor::new(name.clone(), Arc::clone(&tracker), Arc::clone(&self.output));
            let cancel = cancel.clone();
            let handle = tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = slots.acquire_owned() => permit.ok(),
                };
                let Some(permit) = permit else {
                    states.lock().insert(job.name.clone(), JobState::Cancelled);
                    return (job.name, Err(RuntimeError::Cancelled), None);
                };

                states.lock().insert(job.name.clone(), JobState::Running);
                let started = Instant::now();
                let outcome = match factory.create_runner(&job) {
                    Ok(runner) => runner.run(&job, &monitor, &cancel).await,
                    Err(err) => Err(err),
                };
                let elapsed = started.elapsed();
                drop(permit);

                let state = match &outcome {
                    Ok(()) => {
                        tracker.update(&job.name, 100);
                        JobState::Succeeded
                    }
                    Err(RuntimeError::Cancelled) => JobState::Cancelled,
                    Err(err) => {
                        warn!(job = %job.name, error = %err, "job failed");
                        JobState::Failed
                    }
                };
                states.lock().insert(job.name.clone(), state);
                debug!(job = %job.name, ?state, elapsed = ?elapsed, "job finished");
                let elapsed = (state != JobState::Cancelled).then_some(elapsed);
                (job.name, outcome, elapsed)
            });
            names.insert(handle.id(), name);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((job, outcome, elapsed)) => summary.record(job, outcome, elapsed),
                Err(err) => {
                    let job = names.get(&err.id()).cloned().unwrap_or_default();
                    self.states.lock().insert(job.clone(), JobState::Failed);
                    summary.record(job, Err(RuntimeError::Join(err.to_string())), None);
                }
            }
        }
        tracker.flush();

        let run_state = if cancel.is_cancelled() {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        *self.run_state.lock() = run_state;
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "jobs finished"
        );
        Ok(summary)
    }
}
