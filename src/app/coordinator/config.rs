//! Configuration for a download run
//!
//! Covers where files go, how many transfer at once, and how names and video
//! URLs are resolved.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::paths::PathProfile;
use crate::constants::{files, moodle, progress, video, workers};

/// Configuration for the download orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Root directory of all downloads
    pub dest_dir: PathBuf,
    /// Maximum number of concurrent transfers
    pub transfers: usize,
    /// Language preferred when resolving multilingual names
    pub preferred_language: String,
    /// Direct video URL with an `{entry_id}` placeholder
    pub video_url_template: String,
    /// Download resolved videos instead of only recording their URLs
    pub download_videos: bool,
    /// Filesystem rules for escaping path segments
    #[serde(skip)]
    pub path_profile: PathProfile,
    /// How often throughput is reported
    #[serde(skip)]
    pub report_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dest_dir: PathBuf::from(files::DEFAULT_DEST_DIR),
            transfers: workers::DEFAULT_TRANSFERS,
            preferred_language: moodle::PREFERRED_LANGUAGE.to_string(),
            video_url_template: video::DIRECT_URL_TEMPLATE.to_string(),
            download_videos: true,
            path_profile: PathProfile::native(),
            report_interval: progress::REPORT_INTERVAL,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_dest_dir(mut self, dest_dir: impl Into<PathBuf>) -> Self {
        self.dest_dir = dest_dir.into();
        self
    }

    pub fn with_transfers(mut self, transfers: usize) -> Self {
        self.transfers = transfers;
        self
    }

    pub fn with_preferred_language(mut self, language: impl Into<String>) -> Self {
        self.preferred_language = language.into();
        self
    }

    pub fn with_video_downloads(mut self, enabled: bool) -> Self {
        self.download_videos = enabled;
        self
    }

    pub fn with_path_profile(mut self, profile: PathProfile) -> Self {
        self.path_profile = profile;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.transfers == 0 {
            return Err("Transfer count must be greater than 0".to_string());
        }
        if self.transfers > workers::MAX_TRANSFERS {
            return Err(format!(
                "Transfer count cannot exceed {}",
                workers::MAX_TRANSFERS
            ));
        }
        if self.report_interval.is_zero() {
            return Err("Report interval cannot be zero".to_string());
        }
        if !self.video_url_template.contains(video::ENTRY_ID_PLACEHOLDER) {
            return Err(format!(
                "Video URL template must contain {}",
                video::ENTRY_ID_PLACEHOLDER
            ));
        }
        Ok(())
    }
}
