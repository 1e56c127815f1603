use crate::cancel::CancellationToken;
use crate::process::run_process;
use crate::progress::format_hms;
use crate::runner::{JobMonitor, Runner, RunnerFactory};
use crate::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use simbatch_pipeline::{Job, PbsSettings};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

pub const SUBMIT_SCRIPT: &str = "submit_to_gadi.sh";

/// Submits a job to a PBS cluster through the site submission script.
#[derive(Debug, Clone)]
pub struct PbsRunner {
    settings: PbsSettings,
    guess_path: PathBuf,
    input_module: String,
    cpu_count: u16,
    dry_run: bool,
    submit_script: PathBuf,
    conf_dir: Option<PathBuf>,
}

impl PbsRunner {
    /// The `KEY=value` submission config for `job`. String values are quoted.
    pub fn conf_contents(&self, job: &Job) -> String {
        let settings = &self.settings;
        let mut conf = String::new();
        push_quoted(&mut conf, "BINARY", &self.guess_path.display().to_string());
        let _ = writeln!(conf, "NPROCESS={}", self.cpu_count);
        let _ = writeln!(conf, "WALLTIME={}", format_hms(settings.walltime));
        push_quoted(&mut conf, "MEMORY", &format!("{}GB", settings.memory_gb));
        push_quoted(&mut conf, "QUEUE", &settings.queue);
        push_quoted(&mut conf, "PROJECT", &settings.project);
        push_quoted(
            &mut conf,
            "EMAIL",
            settings.email_address.as_deref().unwrap_or_default(),
        );
        push_quoted(
            &mut conf,
            "EMAIL_NOTIFICATIONS",
            if settings.email_notifications { "1" } else { "0" },
        );
        push_quoted(&mut conf, "JOB_NAME", &job.name);
        push_quoted(&mut conf, "OUT_DIR", &job.manifest.path.display().to_string());
        push_quoted(&mut conf, "INSFILE", &job.ins_file.display().to_string());
        push_quoted(&mut conf, "INPUT_MODULE", &self.input_module);
        push_quoted(&mut conf, "EXPERIMENT", &settings.job_name);
        conf
    }

    pub fn command(&self, conf: &Path) -> Command {
        let mut command = Command::new(&self.submit_script);
        command.arg("-q").arg("-s").arg(conf);
        if self.dry_run {
            command.arg("-d");
        }
        command
    }

    /// Writes the submission config to a fresh file that outlives the runner.
    pub fn write_conf(&self, job: &Job) -> RuntimeResult<PathBuf> {
        let stem = job
            .ins_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| job.name.clone());
        let prefix = format!("{stem}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(".conf");
        let mut file = match &self.conf_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }?;
        let path = file.path().to_path_buf();
        file.write_all(self.conf_contents(job).as_bytes())
            .map_err(|source| RuntimeError::Conf {
                path: path.clone(),
                source,
            })?;
        file.into_temp_path()
            .keep()
            .map_err(|err| RuntimeError::Conf {
                path,
                source: err.error,
            })
    }
}

#[async_trait]
impl Runner for PbsRunner {
    async fn run(
        &self,
        job: &Job,
        monitor: &JobMonitor,
        cancel: &CancellationToken,
    ) -> RuntimeResult<()> {
        let conf = self.write_conf(job)?;
        debug!(job = %job.name, conf = %conf.display(), dry_run = self.dry_run, "submitting job");
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        run_process(self.command(&conf), monitor, cancel).await
    }
}

fn push_quoted(conf: &mut String, key: &str, value: &str) {
    let _ = writeln!(conf, "{key}=\"{value}\"");
}

#[derive(Debug, Clone)]
pub struct PbsRunnerFactory {
    runner: PbsRunner,
}

impl PbsRunnerFactory {
    pub fn new(
        settings: PbsSettings,
        guess_path: PathBuf,
        input_module: String,
        cpu_count: u16,
        dry_run: bool,
    ) -> Self {
        Self {
            runner: PbsRunner {
                settings,
                guess_path,
                input_module,
                cpu_count,
                dry_run,
                submit_script: PathBuf::from(SUBMIT_SCRIPT),
                conf_dir: None,
            },
        }
    }

    pub fn with_submit_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.runner.submit_script = script.into();
        self
    }

    /// Writes submission configs under `dir` instead of the system temp dir.
    pub fn with_conf_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runner.conf_dir = Some(dir.into());
        self
    }

    pub fn runner(&self) -> &PbsRunner {
        &self.runner
    }
}

impl RunnerFactory for PbsRunnerFactory {
    fn create_runner(&self, _job: &Job) -> RuntimeResult<Box<dyn Runner>> {
        Ok(Box::new(self.runner.clone()))
    }
}
