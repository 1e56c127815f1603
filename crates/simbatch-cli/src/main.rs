use clap::Parser;
use simbatch_pipeline::{generate_jobs, GenerationReport, PipelineError, RunConfig};
use simbatch_runtime::{
    format_hms, runner_factory, CancellationToken, JobManager, JobManagerConfig, RunSummary,
    RuntimeError,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Generate and run factorial model experiments", version)]
struct Args {
    /// Run configuration (TOML).
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping running simulations");
            on_interrupt.cancel();
        }
    });

    match run(&args.config, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &Path, cancel: &CancellationToken) -> Result<(), String> {
    let config_path = absolute(config_path)?;
    let config =
        RunConfig::from_file(&config_path).map_err(|err| format!("Config error: {err}"))?;

    let report = generate(config.clone(), cancel.clone()).await?;
    info!(
        jobs = report.jobs.len(),
        index = %report.index_path.display(),
        "generated instruction files"
    );

    let manager = JobManager::new(
        JobManagerConfig::from_run_config(&config),
        runner_factory(&config),
    )
    .map_err(|err| format!("Config error: {err}"))?;
    let summary = manager
        .run(report.jobs, cancel)
        .await
        .map_err(|err| format!("Run error: {err}"))?;
    if config.dry_run {
        return Ok(());
    }
    // Ends the progress line.
    println!();

    if let Some(message) = run_error(&summary) {
        return Err(message);
    }
    report_success(&summary);
    Ok(())
}

/// Cancellation is reported first; model failures from the same run follow it.
fn run_error(summary: &RunSummary) -> Option<String> {
    let failure = failure_message(summary);
    if summary.cancelled == 0 {
        return failure;
    }
    let mut message = format!(
        "Run cancelled: {} of {} simulations finished",
        summary.succeeded + summary.failed,
        summary.total
    );
    if let Some(failure) = failure {
        message.push('\n');
        message.push_str(&failure);
    }
    Some(message)
}

fn failure_message(summary: &RunSummary) -> Option<String> {
    let failure = summary.first_error()?;
    let mut message = format!("Model error: {}", failure.error);
    if let RuntimeError::Model { stderr, .. } = &failure.error {
        for line in stderr {
            message.push('\n');
            message.push_str(line);
        }
    }
    if summary.failed > 1 {
        message.push_str(&format!("\n{} more simulations failed", summary.failed - 1));
    }
    Some(message)
}

fn report_success(summary: &RunSummary) {
    println!("{} simulations completed successfully", summary.succeeded);
    let longest = summary.durations.iter().max_by_key(|(_, elapsed)| **elapsed);
    if let Some((job, elapsed)) = longest {
        info!(job = %job, elapsed = %format_hms(*elapsed), "longest simulation");
    }
}

/// Runs job generation on the blocking pool.
async fn generate(
    config: RunConfig,
    cancel: CancellationToken,
) -> Result<GenerationReport, String> {
    let generated = tokio::task::spawn_blocking(move || {
        generate_jobs(&config, &|| cancel.is_cancelled())
    })
    .await
    .map_err(|err| format!("Generation error: {err}"))?;
    generated.map_err(|err| match err {
        PipelineError::Cancelled => "Run cancelled during job generation".to_string(),
        other => format!("Generation error: {other}"),
    })
}

fn absolute(path: &Path) -> Result<PathBuf, String> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|err| format!("failed to resolve {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use simbatch_runtime::JobFailure;

    fn model_failure(job: &str) -> JobFailure {
        JobFailure {
            job: job.to_string(),
            error: RuntimeError::Model {
                job: job.to_string(),
                status: "exit status: 2".to_string(),
                stderr: vec!["Error: invalid soil code".to_string()],
            },
        }
    }

    #[test]
    fn successful_run_has_no_error() {
        let summary = RunSummary {
            total: 2,
            succeeded: 2,
            ..RunSummary::default()
        };
        assert_eq!(run_error(&summary), None);
    }

    #[test]
    fn cancelled_run_keeps_model_failures() {
        let summary = RunSummary {
            total: 3,
            succeeded: 1,
            failed: 1,
            cancelled: 1,
            errors: vec![model_failure("sla_10")],
            ..RunSummary::default()
        };
        let message = run_error(&summary).expect("error message");
        let mut lines = message.lines();
        assert_eq!(lines.next(), Some("Run cancelled: 2 of 3 simulations finished"));
        assert_eq!(
            lines.next(),
            Some("Model error: simulation sla_10 failed: exit status: 2")
        );
        assert_eq!(lines.next(), Some("Error: invalid soil code"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn extra_failures_are_counted() {
        let summary = RunSummary {
            total: 2,
            failed: 2,
            errors: vec![model_failure("sla_10"), model_failure("sla_20")],
            ..RunSummary::default()
        };
        let message = run_error(&summary).expect("error message");
        assert!(message.starts_with("Model error: simulation sla_10 failed"));
        assert!(message.ends_with("\n1 more simulations failed"));
    }
}
