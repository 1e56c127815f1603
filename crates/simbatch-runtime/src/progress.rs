use parking_lot::Mutex;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Aggregate progress across every job in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Mean of the per-job percentages.
    pub percent: f64,
    pub elapsed: Duration,
    pub completed: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    /// Linear estimate of the time left; `None` before any progress.
    pub fn remaining(&self) -> Option<Duration> {
        let fraction = self.percent / 100.0;
        if fraction < 1e-3 {
            return None;
        }
        let total = self.elapsed.as_secs_f64() / fraction;
        Some(Duration::from_secs_f64(
            (total - self.elapsed.as_secs_f64()).max(0.0),
        ))
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, snapshot: &ProgressSnapshot);
}

pub trait OutputHandler: Send + Sync {
    fn stdout(&self, job: &str, line: &str);
    fn stderr(&self, job: &str, line: &str);
}

/// Rewrites a single status line on stdout.
#[derive(Debug, Default)]
pub struct ConsoleProgressReporter;

impl ConsoleProgressReporter {
    pub fn render(snapshot: &ProgressSnapshot) -> String {
        match snapshot.remaining() {
            None => format!("\r{:.2}% complete", snapshot.percent),
            Some(remaining) => format!(
                "\r{:.2}% complete, {} elapsed, {} remaining ({}/{} simulations complete)",
                snapshot.percent,
                format_hms(snapshot.elapsed),
                format_hms(remaining),
                snapshot.completed,
                snapshot.total
            ),
        }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}", Self::render(snapshot));
        let _ = stdout.flush();
    }
}

/// Prefixes each line with the job name; stdout lines go to stdout, stderr
/// lines to stderr.
#[derive(Debug, Default)]
pub struct ConsoleOutputHandler {
    pub quiet: bool,
}

impl OutputHandler for ConsoleOutputHandler {
    fn stdout(&self, job: &str, line: &str) {
        if !self.quiet {
            println!("[{job}] {line}");
        }
    }

    fn stderr(&self, job: &str, line: &str) {
        eprintln!("[{job}] {line}");
    }
}

#[derive(Debug)]
struct TrackerState {
    progress: BTreeMap<String, u8>,
    last_report: Option<Instant>,
}

/// Per-job percentages behind one lock, reported at most once per interval.
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
    reporter: Arc<dyn ProgressReporter>,
    interval: Duration,
    started: Instant,
}

impl ProgressTracker {
    pub fn new<I, S>(jobs: I, reporter: Arc<dyn ProgressReporter>, interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Mutex::new(TrackerState {
                progress: jobs.into_iter().map(|job| (job.into(), 0)).collect(),
                last_report: None,
            }),
            reporter,
            interval,
            started: Instant::now(),
        }
    }

    pub fn update(&self, job: &str, percent: u8) {
        let mut state = self.state.lock();
        state.progress.insert(job.to_string(), percent.min(100));
        let due = state
            .last_report
            .map_or(true, |last| last.elapsed() >= self.interval);
        if due {
            state.last_report = Some(Instant::now());
            self.reporter.report(&self.snapshot_locked(&state));
        }
    }

    /// Reports the current state regardless of the interval.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        state.last_report = Some(Instant::now());
        self.reporter.report(&self.snapshot_locked(&state));
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_locked(&self.state.lock())
    }

    fn snapshot_locked(&self, state: &TrackerState) -> ProgressSnapshot {
        let total = state.progress.len();
        let sum: u64 = state.progress.values().map(|&value| u64::from(value)).sum();
        ProgressSnapshot {
            percent: if total == 0 {
                0.0
            } else {
                sum as f64 / total as f64
            },
            elapsed: self.started.elapsed(),
            completed: state.progress.values().filter(|&&value| value == 100).count(),
            total,
        }
    }
}

/// Extracts `NN` from model output such as `Simulation 42% complete`.
pub fn parse_progress(line: &str) -> Option<u8> {
    static PROGRESS: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = PROGRESS
        .get_or_init(|| Regex::new(r"(\d{1,3})%\s+complete").ok())
        .as_ref()?;
    let percent: u32 = regex.captures(line)?.get(1)?.as_str().parse().ok()?;
    u8::try_from(percent.min(100)).ok()
}

/// `hh:mm:ss`, with hours allowed to exceed 24.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressSnapshot>>);

    impl ProgressReporter for Recorder {
        fn report(&self, snapshot: &ProgressSnapshot) {
            self.0.lock().push(*snapshot);
        }
    }

    #[test]
    fn parses_progress_lines() {
        assert_eq!(parse_progress("  42% complete, 00:01:00 elapsed"), Some(42));
        assert_eq!(parse_progress("100% complete"), Some(100));
        assert_eq!(parse_progress("Commencing simulation"), None);
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_hms(Duration::from_secs(3_725)), "01:02:05");
        assert_eq!(format_hms(Duration::from_secs(90_000)), "25:00:00");
    }

    #[test]
    fn renders_console_line() {
        let snapshot = ProgressSnapshot {
            percent: 50.0,
            elapsed: Duration::from_secs(60),
            completed: 1,
            total: 2,
        };
        assert_eq!(
            ConsoleProgressReporter::render(&snapshot),
            "\r50.00% complete, 00:01:00 elapsed, 00:01:00 remaining (1/2 simulations complete)"
        );
        let start = ProgressSnapshot {
            percent: 0.0,
            ..snapshot
        };
        assert_eq!(ConsoleProgressReporter::render(&start), "\r0.00% complete");
    }

    #[test]
    fn throttles_and_averages() {
        let recorder = Arc::new(Recorder::default());
        let tracker = ProgressTracker::new(["a", "b"], recorder.clone(), Duration::from_secs(60));
        tracker.update("a", 50);
        tracker.update("a", 100);
        tracker.update("b", 40);
        assert_eq!(recorder.0.lock().len(), 1);
        assert_eq!(recorder.0.lock()[0].percent, 25.0);

        tracker.flush();
        let reports = recorder.0.lock();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].percent, 70.0);
        assert_eq!(reports[1].completed, 1);
        assert_eq!(reports[1].total, 2);
    }
}
