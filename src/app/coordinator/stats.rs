//! Download statistics tracking and aggregation
//!
//! Counters are updated as task outcomes arrive and summarised once the run
//! ends.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::progress::TaskOutcome;

/// Aggregated statistics of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadStats {
    /// Courses whose content tree was walked
    pub courses: usize,
    /// Tasks handed to the worker pool
    pub tasks_submitted: usize,
    /// Files written by this run
    pub files_completed: usize,
    /// Files already present with the expected size
    pub files_skipped: usize,
    /// Videos without a downloadable entry
    pub videos_unavailable: usize,
    /// Video URLs recorded without downloading
    pub videos_recorded: usize,
    /// Tasks that failed
    pub files_failed: usize,
    /// Modules skipped or not recognised by the walk
    pub module_notices: usize,
    /// Bytes written to disk
    pub total_bytes_downloaded: u64,
    /// Start of the run
    pub session_start: DateTime<Utc>,
    /// Time since the start of the run
    pub session_duration: Duration,
}

impl Default for DownloadStats {
    fn default() -> Self {
        Self {
            courses: 0,
            tasks_submitted: 0,
            files_completed: 0,
            files_skipped: 0,
            videos_unavailable: 0,
            videos_recorded: 0,
            files_failed: 0,
            module_notices: 0,
            total_bytes_downloaded: 0,
            session_start: Utc::now(),
            session_duration: Duration::ZERO,
        }
    }
}

impl DownloadStats {
    /// Counts a finished task
    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed { .. } => self.files_completed += 1,
            TaskOutcome::Skipped => self.files_skipped += 1,
            TaskOutcome::VideoUnavailable => self.videos_unavailable += 1,
            TaskOutcome::VideoRecorded => self.videos_recorded += 1,
            TaskOutcome::Failed(_) => self.files_failed += 1,
        }
    }

    /// Tasks that reached a terminal state
    pub fn total_processed(&self) -> usize {
        self.files_completed
            + self.files_skipped
            + self.videos_unavailable
            + self.videos_recorded
            + self.files_failed
    }

    /// Update session duration from start time
    pub fn update_duration(&mut self) {
        self.session_duration = Utc::now()
            .signed_duration_since(self.session_start)
            .to_std()
            .unwrap_or(Duration::ZERO);
    }

    /// Average rate over the whole session in bytes per second
    pub fn average_rate_bps(&self) -> f64 {
        let secs = self.session_duration.as_secs_f64();
        if secs > 0.0 {
            self.total_bytes_downloaded as f64 / secs
        } else {
            0.0
        }
    }

    /// Format the average rate as a human-readable string
    pub fn format_download_rate(&self) -> String {
        format_rate(self.average_rate_bps())
    }
}

/// Final result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    /// Final statistics
    pub stats: DownloadStats,
    /// The run was stopped by an operator interrupt
    pub interrupted: bool,
    /// Problems that occurred while winding down
    pub shutdown_errors: Vec<String>,
    /// Time taken for the entire run
    pub total_duration: Duration,
}

impl SessionResult {
    pub fn completed(stats: DownloadStats, total_duration: Duration) -> Self {
        Self {
            stats,
            interrupted: false,
            shutdown_errors: Vec::new(),
            total_duration,
        }
    }

    pub fn interrupted(stats: DownloadStats, total_duration: Duration) -> Self {
        Self {
            interrupted: true,
            ..Self::completed(stats, total_duration)
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.shutdown_errors.is_empty()
    }

    /// One-line summary of the run
    pub fn summary(&self) -> String {
        let head = if self.interrupted {
            "Interrupted"
        } else if self.has_errors() {
            "Finished with warnings"
        } else {
            "Finished"
        };
        format!(
            "{}: {} downloaded, {} already present, {} failed, {} videos recorded, {} videos unavailable; {} in {} ({})",
            head,
            self.stats.files_completed,
            self.stats.files_skipped,
            self.stats.files_failed,
            self.stats.videos_recorded,
            self.stats.videos_unavailable,
            format_bytes(self.stats.total_bytes_downloaded),
            format_duration(self.total_duration),
            self.stats.format_download_rate(),
        )
    }
}

/// Format a byte rate as human-readable string
pub fn format_rate(bytes_per_second: f64) -> String {
    if bytes_per_second < 1024.0 {
        format!("{:.1} B/s", bytes_per_second)
    } else if bytes_per_second < 1024.0 * 1024.0 {
        format!("{:.1} KiB/s", bytes_per_second / 1024.0)
    } else {
        format!("{:.2} MiB/s", bytes_per_second / (1024.0 * 1024.0))
    }
}

/// Format a byte count as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Format a duration as human-readable string
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        format!("{}m{}s", total_secs / 60, total_secs % 60)
    } else {
        format!("{}h{}m", total_secs / 3600, (total_secs % 3600) / 60)
    }
}
