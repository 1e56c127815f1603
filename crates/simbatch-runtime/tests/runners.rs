use chrono::Utc;
use parking_lot::Mutex;
use simbatch_pipeline::{Job, PbsSettings, SimulationManifest};
use simbatch_runtime::{
    CancellationToken, JobMonitor, LocalRunnerFactory, OutputHandler, PbsRunnerFactory, ProgressReporter,
    ProgressSnapshot, ProgressTracker, Runner, RunnerFactory, RuntimeError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn job(directory: &Path) -> Job {
    let ins_file = directory.join("sla_10.ins");
    Job {
        name: "sla_10".to_string(),
        ins_file: ins_file.clone(),
        manifest: SimulationManifest {
            key: "sla_10".to_string(),
            naming: "manual".to_string(),
            name: "sla_10".to_string(),
            path: directory.to_path_buf(),
            base_ins: PathBuf::from("/templates/global.ins"),
            ins_file,
            pfts: vec!["TeBE".to_string()],
            generated_at: Utc::now(),
            factors: Vec::new(),
        },
    }
}

fn settings() -> PbsSettings {
    PbsSettings {
        job_name: "sla-sensitivity".to_string(),
        memory_gb: 190,
        walltime: Duration::from_secs(26 * 3600 + 30 * 60),
        queue: "normal".to_string(),
        project: "pt17".to_string(),
        email_notifications: true,
        email_address: Some("someone@example.org".to_string()),
    }
}

fn factory(dry_run: bool) -> PbsRunnerFactory {
    PbsRunnerFactory::new(
        settings(),
        PathBuf::from("/opt/guess/bin/guess"),
        "nc".to_string(),
        48,
        dry_run,
    )
}

#[derive(Default)]
struct Lines {
    stdout: Mutex<Vec<String>>,
    stderr: Mutex<Vec<String>>,
}

impl OutputHandler for Lines {
    fn stdout(&self, _job: &str, line: &str) {
        self.stdout.lock().push(line.to_string());
    }

    fn stderr(&self, _job: &str, line: &str) {
        self.stderr.lock().push(line.to_string());
    }
}

struct Silent;

impl ProgressReporter for Silent {
    fn report(&self, _snapshot: &ProgressSnapshot) {}
}

#[test]
fn conf_lists_every_submission_key() {
    let factory = factory(false);
    let conf = factory.runner().conf_contents(&job(Path::new("/scratch/out/sla_10")));
    let expected = [
        "BINARY=\"/opt/guess/bin/guess\"",
        "NPROCESS=48",
        "WALLTIME=26:30:00",
        "MEMORY=\"190GB\"",
        "QUEUE=\"normal\"",
        "PROJECT=\"pt17\"",
        "EMAIL=\"someone@example.org\"",
        "EMAIL_NOTIFICATIONS=\"1\"",
        "JOB_NAME=\"sla_10\"",
        "OUT_DIR=\"/scratch/out/sla_10\"",
        "INSFILE=\"/scratch/out/sla_10/sla_10.ins\"",
        "INPUT_MODULE=\"nc\"",
        "EXPERIMENT=\"sla-sensitivity\"",
    ];
    assert_eq!(conf.lines().collect::<Vec<_>>(), expected);
}

#[test]
fn dry_run_passes_flag_to_submit_script() {
    let conf = Path::new("/tmp/sla_10.conf");
    let live = factory(false).runner().command(conf);
    let args: Vec<_> = live.as_std().get_args().collect();
    assert_eq!(args, ["-q", "-s", "/tmp/sla_10.conf"]);

    let dry = factory(true).runner().command(conf);
    assert_eq!(dry.as_std().get_program(), "submit_to_gadi.sh");
    assert_eq!(dry.as_std().get_args().last(), Some("-d".as_ref()));
}

#[test]
fn conf_file_is_written_and_kept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let factory = factory(false).with_conf_dir(dir.path());
    let job = job(dir.path());
    let path = factory.runner().write_conf(&job).expect("conf");
    assert_eq!(path.parent(), Some(dir.path()));
    assert!(path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("sla_10-") && name.ends_with(".conf")));
    let written = std::fs::read_to_string(&path).expect("read conf");
    assert_eq!(written, factory.runner().conf_contents(&job));
}

#[cfg(unix)]
#[tokio::test]
async fn submission_output_is_streamed_and_failures_carry_stderr() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let write_script = |name: &str, body: &str| {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");
        path
    };
    let ok = write_script(
        "submit_ok.sh",
        "echo \"Simulation 40% complete\"\necho \"submitted $3\"\necho warning >&2",
    );
    let failing = write_script("submit_fail.sh", "echo \"qsub: invalid queue\" >&2\nexit 3");

    let lines = Arc::new(Lines::default());
    let tracker = Arc::new(ProgressTracker::new(
        ["sla_10"],
        Arc::new(Silent),
        Duration::from_secs(60),
    ));
    let monitor = JobMonitor::new("sla_10", tracker.clone(), lines.clone());
    let job = job(dir.path());
    let cancel = CancellationToken::new();

    let runner = factory(false)
        .with_conf_dir(dir.path())
        .with_submit_script(&ok)
        .create_runner(&job)
        .expect("runner");
    runner.run(&job, &monitor, &cancel).await.expect("submitted");
    {
        let stdout = lines.stdout.lock();
        assert_eq!(stdout[0], "Simulation 40% complete");
        assert!(stdout[1].starts_with("submitted "));
        assert!(stdout[1].ends_with(".conf"));
    }
    assert_eq!(*lines.stderr.lock(), vec!["warning".to_string()]);
    assert_eq!(tracker.snapshot().percent, 40.0);

    let runner = factory(false)
        .with_conf_dir(dir.path())
        .with_submit_script(&failing)
        .create_runner(&job)
        .expect("runner");
    let err = runner
        .run(&job, &monitor, &cancel)
        .await
        .expect_err("script exits non-zero");
    let RuntimeError::Model { job: name, stderr, .. } = &err else {
        panic!("expected a model error, got {err:?}");
    };
    assert_eq!(name, "sla_10");
    assert_eq!(stderr, &vec!["qsub: invalid queue".to_string()]);
}

#[cfg(unix)]
#[tokio::test]
async fn non_utf8_model_output_does_not_fail_the_job() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let model = dir.path().join("model.sh");
    std::fs::write(
        &model,
        "#!/bin/sh\nprintf 'caf\\351 output\\r\\n'\nprintf '50%% complete\\n'\nprintf 'Fl\\374sse\\n' >&2\nexit 0\n",
    )
    .expect("write model");
    std::fs::set_permissions(&model, std::fs::Permissions::from_mode(0o755)).expect("chmod");

    let lines = Arc::new(Lines::default());
    let tracker = Arc::new(ProgressTracker::new(
        ["sla_10"],
        Arc::new(Silent),
        Duration::from_secs(60),
    ));
    let monitor = JobMonitor::new("sla_10", tracker.clone(), lines.clone());
    let job = job(dir.path());
    let runner = LocalRunnerFactory::new(model, "cru".to_string())
        .create_runner(&job)
        .expect("runner");
    runner
        .run(&job, &monitor, &CancellationToken::new())
        .await
        .expect("model exits zero");

    assert_eq!(
        *lines.stdout.lock(),
        vec!["caf\u{FFFD} output".to_string(), "50% complete".to_string()]
    );
    assert_eq!(*lines.stderr.lock(), vec!["Fl\u{FFFD}sse".to_string()]);
    assert_eq!(tracker.snapshot().percent, 50.0);
}

#[tokio::test]
async fn missing_submit_script_is_a_spawn_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let tracker = Arc::new(ProgressTracker::new(
        ["sla_10"],
        Arc::new(Silent),
        Duration::from_secs(60),
    ));
    let monitor = JobMonitor::new("sla_10", tracker, Arc::new(Lines::default()));
    let job = job(dir.path());
    let runner = factory(false)
        .with_conf_dir(dir.path())
        .with_submit_script(dir.path().join("no-such-script"))
        .create_runner(&job)
        .expect("runner");
    let err = runner
        .run(&job, &monitor, &CancellationToken::new())
        .await
        .expect_err("spawn fails");
    assert!(matches!(err, RuntimeError::Spawn { .. }), "{err:?}");
}
