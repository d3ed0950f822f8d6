//! Live progress display for a scraping run
//!
//! The display consumes the orchestrator's [`ProgressEvent`] stream. On a
//! terminal a spinner shows the current transfer rate and task counts, and
//! per-task lines are printed above it; elsewhere the lines go straight to
//! stdout and throughput updates are dropped.

use std::io::Write;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::coordinator::stats::format_bytes;
use crate::app::coordinator::{ProgressEvent, TaskOutcome};
use crate::constants::progress;
use crate::errors::{DownloadError, DownloadResult};

/// Configuration for progress display
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Show the spinner when stdout is a terminal
    pub enable_spinner: bool,
    /// Print a line for every finished task, not only problems
    pub show_tasks: bool,
    /// Spinner refresh period
    pub tick_interval: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_spinner: true,
            show_tasks: true,
            tick_interval: progress::SPINNER_TICK,
        }
    }
}

impl ProgressConfig {
    /// Problems only, no spinner
    pub fn quiet() -> Self {
        Self {
            enable_spinner: false,
            show_tasks: false,
            ..Self::default()
        }
    }
}

/// Progress display manager
pub struct ProgressDisplay {
    config: ProgressConfig,
    bar: Option<ProgressBar>,
    rate: f64,
    total_bytes: u64,
    finished: usize,
    failed: usize,
    lines: Box<dyn Write + Send>,
}

impl ProgressDisplay {
    /// Creates the display, with a spinner if enabled and on a terminal
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Other` if the spinner template is invalid
    pub fn new(config: ProgressConfig) -> DownloadResult<Self> {
        Self::with_writer(config, Box::new(std::io::stdout()))
    }

    /// Creates the display printing plain lines to `lines` when no spinner runs
    pub fn with_writer(
        config: ProgressConfig,
        lines: Box<dyn Write + Send>,
    ) -> DownloadResult<Self> {
        let bar = if config.enable_spinner && atty::is(atty::Stream::Stdout) {
            let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .map_err(|e| DownloadError::Other(format!("Progress template error: {}", e)))?,
            );
            bar.enable_steady_tick(config.tick_interval);
            Some(bar)
        } else {
            None
        };

        let display = Self {
            config,
            bar,
            rate: 0.0,
            total_bytes: 0,
            finished: 0,
            failed: 0,
            lines,
        };
        display.refresh();
        Ok(display)
    }

    /// Consumes events until the sender side is dropped
    pub fn spawn(mut self, mut rx: mpsc::UnboundedReceiver<ProgressEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.handle(event);
            }
            self.finish();
        })
    }

    /// Applies one event to the display
    pub fn handle(&mut self, event: ProgressEvent) {
        match &event {
            ProgressEvent::Throughput {
                bytes_per_second,
                total_bytes,
            } => {
                self.rate = *bytes_per_second;
                self.total_bytes = *total_bytes;
            }
            ProgressEvent::TaskFinished { outcome, .. } => {
                self.finished += 1;
                if outcome.is_failure() {
                    self.failed += 1;
                }
            }
            ProgressEvent::ModuleNotice { .. } | ProgressEvent::CourseStarted { .. } => {}
        }

        if let Some(line) = describe(&event, self.config.show_tasks) {
            self.println(&line);
        }
        self.refresh();
    }

    /// Clears the spinner
    pub fn finish(self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        debug!(
            "Progress display closed after {} tasks ({} failed)",
            self.finished, self.failed
        );
    }

    fn println(&mut self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => {
                if let Err(e) = writeln!(self.lines, "{}", line) {
                    debug!("Could not print progress line: {}", e);
                }
            }
        }
    }

    fn refresh(&self) {
        if let Some(bar) = &self.bar {
            bar.set_message(status_line(
                self.rate,
                self.total_bytes,
                self.finished,
                self.failed,
            ));
        }
    }
}

/// Spinner message
fn status_line(rate: f64, total_bytes: u64, finished: usize, failed: usize) -> String {
    format!(
        "{:.2} MiB/s | {} total | {} tasks done, {} failed",
        rate / progress::BYTES_PER_MIB,
        format_bytes(total_bytes),
        finished,
        failed
    )
}

/// Line printed for an event, if any
fn describe(event: &ProgressEvent, show_tasks: bool) -> Option<String> {
    match event {
        ProgressEvent::Throughput { .. } => None,
        ProgressEvent::CourseStarted { path } => show_tasks.then(|| format!("==> {}", path)),
        ProgressEvent::ModuleNotice { path, message } => {
            show_tasks.then(|| format!("  skip {}: {}", path, message))
        }
        ProgressEvent::TaskFinished { label, outcome } => match outcome {
            TaskOutcome::Failed(_) => Some(format!("  FAIL {}: {}", label, outcome)),
            _ if !show_tasks => None,
            _ => Some(format!("  {}: {}", label, outcome)),
        },
    }
}
