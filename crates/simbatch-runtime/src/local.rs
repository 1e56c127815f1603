use crate::affinity::{CpuAffinityPool, CpuLease};
use crate::cancel::CancellationToken;
use crate::process::run_process;
use crate::runner::{JobMonitor, Runner, RunnerFactory};
use crate::RuntimeResult;
use async_trait::async_trait;
use simbatch_pipeline::Job;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs the model binary on this host.
#[derive(Debug)]
pub struct LocalRunner {
    guess_path: PathBuf,
    input_module: String,
    lease: Option<CpuLease>,
}

impl LocalRunner {
    pub fn new(guess_path: PathBuf, input_module: String, lease: Option<CpuLease>) -> Self {
        Self {
            guess_path,
            input_module,
            lease,
        }
    }

    pub fn cpu(&self) -> Option<usize> {
        self.lease.as_ref().map(CpuLease::cpu)
    }

    /// `<guess> -input <module> <insfile>` in the instruction file's
    /// directory, wrapped in `taskset` when a CPU is pinned on Linux.
    pub fn command(&self, job: &Job) -> Command {
        let mut command = match self.cpu() {
            Some(cpu) if cfg!(target_os = "linux") => {
                let mut command = Command::new("taskset");
                command
                    .arg("-c")
                    .arg(cpu.to_string())
                    .arg(&self.guess_path);
                command
            }
            _ => Command::new(&self.guess_path),
        };
        command
            .arg("-input")
            .arg(&self.input_module)
            .arg(&job.ins_file);
        if let Some(directory) = job.ins_file.parent() {
            command.current_dir(directory);
        }
        command
    }
}

#[async_trait]
impl Runner for LocalRunner {
    async fn run(
        &self,
        job: &Job,
        monitor: &JobMonitor,
        cancel: &CancellationToken,
    ) -> RuntimeResult<()> {
        debug!(job = %job.name, ins_file = %job.ins_file.display(), cpu = ?self.cpu(), "running locally");
        run_process(self.command(job), monitor, cancel).await
    }
}

#[derive(Debug, Clone)]
pub struct LocalRunnerFactory {
    guess_path: PathBuf,
    input_module: String,
    affinity: Option<CpuAffinityPool>,
}

impl LocalRunnerFactory {
    pub fn new(guess_path: PathBuf, input_module: String) -> Self {
        Self {
            guess_path,
            input_module,
            affinity: None,
        }
    }

    /// Pins each runner to a CPU leased from `pool`.
    pub fn with_affinity(mut self, pool: CpuAffinityPool) -> Self {
        self.affinity = Some(pool);
        self
    }
}

impl RunnerFactory for LocalRunnerFactory {
    fn create_runner(&self, job: &Job) -> RuntimeResult<Box<dyn Runner>> {
        let lease = self.affinity.as_ref().and_then(|pool| {
            let lease = pool.acquire();
            if lease.is_none() {
                warn!(job = %job.name, "no free CPU to pin to, running unpinned");
            }
            lease
        });
        Ok(Box::new(LocalRunner::new(
            self.guess_path.clone(),
            self.input_module.clone(),
            lease,
        )))
    }
}
