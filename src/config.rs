//! Configuration management for the UniMiB scraper
//!
//! Settings come from built-in defaults, an optional TOML file and finally the
//! command line. The file is looked up in this order:
//!
//! 1. the path given with `--config`
//! 2. `./unimib-scraper.toml`
//! 3. `<user config dir>/unimib-scraper/config.toml`
//!
//! Every section and key is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::app::client::ClientConfig;
use crate::app::coordinator::OrchestratorConfig;
use crate::constants::{files, moodle, video, workers};
use crate::errors::{ConfigError, Result};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Site settings
    pub moodle: MoodleConfigToml,
    /// Where and how to download
    pub download: DownloadConfigToml,
    /// HTTP client settings
    pub client: ClientConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MoodleConfigToml {
    /// Root of the e-learning site
    pub base_url: String,
    /// Language preferred for multilingual names
    pub preferred_language: String,
}

impl Default for MoodleConfigToml {
    fn default() -> Self {
        Self {
            base_url: moodle::BASE_URL.to_string(),
            preferred_language: moodle::PREFERRED_LANGUAGE.to_string(),
        }
    }
}

/// TOML-friendly download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfigToml {
    /// Destination directory
    pub dest_dir: PathBuf,
    /// Number of concurrent transfers
    pub transfers: usize,
    /// JSON file recording resolved video URLs
    pub videos_json: PathBuf,
    /// JSON file persisting session cookies
    pub cookie_jar: PathBuf,
    /// Download videos, or only record their URLs
    pub download_videos: bool,
    /// Direct video URL with an `{entry_id}` placeholder
    pub video_url_template: String,
}

impl Default for DownloadConfigToml {
    fn default() -> Self {
        Self {
            dest_dir: PathBuf::from(files::DEFAULT_DEST_DIR),
            transfers: workers::DEFAULT_TRANSFERS,
            videos_json: PathBuf::from(files::DEFAULT_VIDEOS_JSON),
            cookie_jar: PathBuf::from(files::DEFAULT_COOKIE_JAR),
            download_videos: true,
            video_url_template: video::DIRECT_URL_TEMPLATE.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when neither `-v` nor `RUST_LOG` say otherwise
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the first file found, or defaults
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` when an explicitly requested file is
    /// missing, and a parse error when a file is not valid TOML.
    pub async fn load(config_file_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path }.into());
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        match config_path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(files::LOCAL_CONFIG_FILE)];
        if let Some(path) = Self::default_config_path() {
            search_paths.push(path);
        }

        let found = search_paths.into_iter().find(|path| path.exists());
        if let Some(path) = &found {
            debug!("Found config file: {}", path.display());
        }
        found
    }

    /// Config file path for the current user, if the platform has one
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(files::CONFIG_DIR_NAME).join("config.toml"))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(ConfigError::Io)?;
        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::InvalidFormat)?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Parsed site root
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.moodle.base_url).map_err(|e| {
            ConfigError::InvalidValue {
                field: "moodle.base_url".to_string(),
                value: self.moodle.base_url.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Convert to the runtime configurations, validating both
    pub fn to_runtime_config(&self) -> Result<(ClientConfig, OrchestratorConfig)> {
        let invalid = |field: &str, value: String, reason: String| ConfigError::InvalidValue {
            field: field.to_string(),
            value,
            reason,
        };

        self.client
            .validate()
            .map_err(|reason| invalid("client", self.client.user_agent.clone(), reason))?;

        let mut orchestrator = OrchestratorConfig::default()
            .with_dest_dir(self.download.dest_dir.clone())
            .with_transfers(self.download.transfers)
            .with_preferred_language(self.moodle.preferred_language.clone())
            .with_video_downloads(self.download.download_videos);
        orchestrator.video_url_template = self.download.video_url_template.clone();
        orchestrator.validate().map_err(|reason| {
            invalid(
                "download",
                format!("{} transfers", self.download.transfers),
                reason,
            )
        })?;

        Ok((self.client.clone(), orchestrator))
    }
}
