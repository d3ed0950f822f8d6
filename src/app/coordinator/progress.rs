//! Progress accounting and the event stream
//!
//! Workers add to a shared [`ThroughputCounter`] after every chunk they write.
//! A [`ThroughputReporter`] drains it once per interval and publishes a
//! [`ProgressEvent::Throughput`]. Everything the presentation layer shows comes
//! through [`ProgressEvent`]s; the orchestrator works the same with or without a
//! subscriber.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Default)]
struct Counters {
    since_tick: AtomicU64,
    total: AtomicU64,
}

/// Process-wide byte counter shared by all transfers
#[derive(Debug, Clone, Default)]
pub struct ThroughputCounter {
    inner: Arc<Counters>,
}

impl ThroughputCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `bytes` written to disk
    pub fn add(&self, bytes: u64) {
        self.inner.since_tick.fetch_add(bytes, Ordering::Relaxed);
        self.inner.total.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns the bytes recorded since the previous call and resets that window
    pub fn take_since_last(&self) -> u64 {
        self.inner.since_tick.swap(0, Ordering::Relaxed)
    }

    /// Bytes recorded over the whole run
    pub fn total(&self) -> u64 {
        self.inner.total.load(Ordering::Relaxed)
    }
}

/// How a single task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Transfer finished and the file was moved into place
    Completed { bytes: u64 },
    /// File already present with the expected size
    Skipped,
    /// Video page has no downloadable entry
    VideoUnavailable,
    /// Video URL recorded in the map without downloading
    VideoRecorded,
    /// Task failed; the run continues
    Failed(String),
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Completed { bytes } => write!(f, "downloaded ({} bytes)", bytes),
            TaskOutcome::Skipped => f.write_str("already downloaded"),
            TaskOutcome::VideoUnavailable => f.write_str("video not downloadable"),
            TaskOutcome::VideoRecorded => f.write_str("video URL recorded"),
            TaskOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Observable progress of a run
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Bytes written during the last reporting interval
    Throughput {
        bytes_per_second: f64,
        total_bytes: u64,
    },
    /// A task reached a terminal state
    TaskFinished { label: String, outcome: TaskOutcome },
    /// A module was skipped or not recognised
    ModuleNotice { path: String, message: String },
    /// The walk entered a new course
    CourseStarted { path: String },
}

/// Optional sink for progress events
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: Option<mpsc::UnboundedSender<ProgressEvent>>) -> Self {
        Self { tx }
    }

    /// Publishes an event; a missing or departed subscriber is ignored
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Periodically converts the counter into throughput events
pub struct ThroughputReporter {
    counter: ThroughputCounter,
    sink: ProgressSink,
    report_interval: Duration,
}

impl ThroughputReporter {
    pub fn new(counter: ThroughputCounter, sink: ProgressSink, report_interval: Duration) -> Self {
        Self {
            counter,
            sink,
            report_interval,
        }
    }

    /// Starts reporting until `shutdown_rx` fires
    pub fn start(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.report_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            let mut last_tick = Instant::now();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let elapsed = last_tick.elapsed().as_secs_f64();
                        last_tick = Instant::now();
                        self.report(elapsed);
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Throughput reporter received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    fn report(&self, elapsed_secs: f64) {
        let bytes = self.counter.take_since_last();
        let bytes_per_second = if elapsed_secs > 0.0 {
            bytes as f64 / elapsed_secs
        } else {
            0.0
        };
        self.sink.emit(ProgressEvent::Throughput {
            bytes_per_second,
            total_bytes: self.counter.total(),
        });
    }
}
