use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const TEMPLATE: &str = "title \"global\"\nnyear_spinup 500 ! spinup years\n";

fn write_config(dir: &Path, extra: &str) -> PathBuf {
    fs::write(dir.join("global.ins"), TEMPLATE).expect("write template");
    let config = dir.join("experiment.toml");
    fs::write(
        &config,
        format!(
            "insfiles = [\"global.ins\"]\ncpu_count = 1\noutput_directory = \"out\"\ninput_module = \"cru\"\n{extra}\n[parameters]\nnyear_spinup = [100, 200]\n"
        ),
    )
    .expect("write config");
    config
}

fn simbatch(config: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_simbatch"))
        .arg(config)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run simbatch")
}

#[test]
fn missing_argument_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_simbatch"))
        .output()
        .expect("run simbatch");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn invalid_config_fails_with_message() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("broken.toml");
    fs::write(&config, "insfiles = []\ncpu_count = 1\noutput_directory = \"out\"\ninput_module = \"cru\"\n")
        .expect("write config");
    let output = simbatch(&config);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Config error"), "{stderr}");
}

#[test]
fn dry_run_generates_without_running() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = write_config(temp.path(), "dry_run = true\nguess_path = \"./missing-model\"");
    let output = simbatch(&config);
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Dry run - 2 jobs would be executed"), "{stdout}");
    let out = temp.path().join("out");
    let generated = fs::read_to_string(out.join("nyear_spinup_100/nyear_spinup_100.ins"))
        .expect("generated file");
    assert!(generated.contains("nyear_spinup 100 ! spinup years"));
    assert!(out.join("index.toml").is_file());
}

#[cfg(unix)]
fn write_model(dir: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("model.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write model");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
}

#[cfg(unix)]
#[test]
fn runs_every_simulation_with_the_model() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_model(
        temp.path(),
        "[ \"$1\" = \"-input\" ] || exit 9\necho \"50% complete\"\ntouch \"$3.done\"\necho \"100% complete\"",
    );
    let config = write_config(temp.path(), "guess_path = \"./model.sh\"");
    let output = simbatch(&config);
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 simulations completed successfully"), "{stdout}");
    let out = temp.path().join("out");
    assert!(out.join("nyear_spinup_100/nyear_spinup_100.ins.done").is_file());
    assert!(out.join("nyear_spinup_200/nyear_spinup_200.ins.done").is_file());
}

#[cfg(unix)]
#[test]
fn model_failure_reports_captured_stderr() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_model(temp.path(), "echo \"Error: invalid soil code\" >&2\nexit 2");
    let config = write_config(temp.path(), "guess_path = \"./model.sh\"");
    let output = simbatch(&config);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Model error: simulation"), "{stderr}");
    assert!(stderr.contains("Error: invalid soil code"), "{stderr}");
    assert!(stderr.contains("1 more simulations failed"), "{stderr}");
}
