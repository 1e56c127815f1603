use crate::cancel::CancellationToken;
use crate::progress::parse_progress;
use crate::runner::JobMonitor;
use crate::{RuntimeError, RuntimeResult};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Stderr lines kept for the failure report.
const STDERR_TAIL: usize = 50;

/// Spawns `command`, streams its output into `monitor` and waits for it to
/// exit. The child is killed as soon as `cancel` fires.
pub(crate) async fn run_process(
    mut command: Command,
    monitor: &JobMonitor,
    cancel: &CancellationToken,
) -> RuntimeResult<()> {
    let program = PathBuf::from(command.as_std().get_program());
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = command
        .spawn()
        .map_err(|source| RuntimeError::Spawn { program, source })?;
    debug!(job = monitor.job(), pid = ?child.id(), "started process");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr was not captured"))?;
    let mut stdout = BufReader::new(stdout).split(b'\n');
    let mut stderr = BufReader::new(stderr).split(b'\n');
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    let (mut stdout_open, mut stderr_open) = (true, true);

    while stdout_open || stderr_open {
        tokio::select! {
            _ = cancel.cancelled() => return Err(kill(&mut child, monitor).await),
            segment = stdout.next_segment(), if stdout_open => match segment? {
                Some(bytes) => {
                    let line = decode_line(bytes);
                    if let Some(percent) = parse_progress(&line) {
                        monitor.progress(percent);
                    }
                    monitor.stdout(&line);
                }
                None => stdout_open = false,
            },
            segment = stderr.next_segment(), if stderr_open => match segment? {
                Some(bytes) => {
                    let line = decode_line(bytes);
                    monitor.stderr(&line);
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                None => stderr_open = false,
            },
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => return Err(kill(&mut child, monitor).await),
        status = child.wait() => status?,
    };
    if status.success() {
        Ok(())
    } else {
        Err(RuntimeError::Model {
            job: monitor.job().to_string(),
            status: status.to_string(),
            stderr: tail.into(),
        })
    }
}

/// Model output is not guaranteed to be UTF-8; invalid bytes become U+FFFD.
fn decode_line(mut bytes: Vec<u8>) -> String {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    match String::from_utf8(bytes) {
        Ok(line) => line,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

async fn kill(child: &mut Child, monitor: &JobMonitor) -> RuntimeError {
    if let Err(err) = child.kill().await {
        warn!(job = monitor.job(), error = %err, "failed to kill process");
    } else {
        debug!(job = monitor.job(), "killed process");
    }
    RuntimeError::Cancelled
}
