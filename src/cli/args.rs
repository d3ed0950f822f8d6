//! Command-line argument parsing for the UniMiB scraper
//!
//! Every flag overrides the matching configuration file setting; flags left
//! out fall back to the file and then to built-in defaults.

use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;

/// UniMiB scraper - mirror your e-learning courses to disk
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "unimib_scraper",
    version,
    about = "Download every file and lecture video of your UniMiB e-learning courses",
    long_about = "Signs in through the university single sign-on, walks every enrolled course and
downloads files and lecture videos into a directory tree mirroring the course categories.
Interrupted transfers resume where they stopped."
)]
pub struct Cli {
    /// Destination directory
    #[arg(short = 'd', long = "destdir", value_name = "DIR")]
    pub dest_dir: Option<PathBuf>,

    /// Number of concurrent transfers
    #[arg(short = 't', long, value_name = "N")]
    pub transfers: Option<usize>,

    /// File persisting session cookies between runs
    #[arg(short = 'j', long = "cookiejar", value_name = "FILE")]
    pub cookie_jar: Option<PathBuf>,

    /// File recording resolved video URLs
    #[arg(short = 'k', long = "videos-json", value_name = "FILE")]
    pub videos_json: Option<PathBuf>,

    /// UniMiB username (or UNIMIB_USERNAME)
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// UniMiB password (or UNIMIB_PASSWORD)
    #[arg(short = 'p', long)]
    pub password: Option<String>,

    /// Preferred language for multilingual names
    #[arg(long = "lang", value_name = "CODE")]
    pub preferred_language: Option<String>,

    /// Only record video URLs, do not download the videos
    #[arg(long)]
    pub no_video_download: bool,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode - only errors and the final summary
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level, falling back to the configured one
    pub fn log_level(&self, configured: &str) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => configured.parse().unwrap_or(tracing::Level::WARN),
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }

    /// Applies the flags on top of a loaded configuration
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(dest_dir) = &self.dest_dir {
            config.download.dest_dir = dest_dir.clone();
        }
        if let Some(transfers) = self.transfers {
            config.download.transfers = transfers;
        }
        if let Some(cookie_jar) = &self.cookie_jar {
            config.download.cookie_jar = cookie_jar.clone();
        }
        if let Some(videos_json) = &self.videos_json {
            config.download.videos_json = videos_json.clone();
        }
        if let Some(language) = &self.preferred_language {
            config.moodle.preferred_language = language.clone();
        }
        if self.no_video_download {
            config.download.download_videos = false;
        }
    }
}
