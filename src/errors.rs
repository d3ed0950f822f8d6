//! Error types for the UniMiB scraper
//!
//! Every concern gets its own error enum; [`AppError`] aggregates them for the
//! command layer. Run-level failures (credentials, login, course listing, content
//! trees) propagate to `main`, task-level failures are caught at the task
//! boundary and reported as a single line.

use std::path::PathBuf;
use thiserror::Error;

use crate::constants::exit;

/// Authentication-related errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Missing credentials
    #[error(
        "Missing UniMiB credentials. Pass --username/--password or set UNIMIB_USERNAME and UNIMIB_PASSWORD"
    )]
    MissingCredentials,

    /// HTTP request failed during authentication
    #[error("HTTP request failed during authentication")]
    Http(#[from] reqwest::Error),

    /// Rate-limited request failed during authentication
    #[error("Request failed during authentication: {0}")]
    Request(#[from] DownloadError),

    /// Login failed - invalid credentials or identity provider error
    #[error("UniMiB login failed. Please check your credentials and try again")]
    LoginFailed,

    /// The launch endpoint did not answer with a redirect
    #[error("Mobile launch endpoint answered HTTP {status} instead of a redirect")]
    LaunchFailed { status: u16 },

    /// A redirect that should carry the token points somewhere else
    #[error("Unexpected redirect target: {location}")]
    InvalidRedirect { location: String },

    /// The token payload could not be decoded
    #[error("Could not decode web-service token: {reason}")]
    TokenDecode { reason: String },

    /// Expected element not found in an SSO page
    #[error("Expected element not found in login page: {selector}")]
    ElementNotFound { selector: String },

    /// Continuation pages kept coming
    #[error("Gave up after {count} auto-submit pages")]
    TooManyContinueForms { count: usize },

    /// Invalid URL discovered during the login flow
    #[error("Invalid URL in login flow: {url}")]
    InvalidUrl { url: String },

    /// HTTP client could not be configured
    #[error("Could not set up HTTP client: {reason}")]
    ClientSetup { reason: String },

    /// Password prompt failed
    #[error("Failed to read password from terminal")]
    Prompt(#[from] std::io::Error),

    /// Cookie jar could not be read or written
    #[error("Cookie jar {path} could not be used: {reason}")]
    CookieJar { path: PathBuf, reason: String },
}

/// Download and HTTP client errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP request error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations
    #[error("File I/O error")]
    Io(#[from] std::io::Error),

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Server returned error status
    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Server responded with HTTP 429")]
    RateLimitExceeded,

    /// Server overloaded
    #[error("Server overloaded. Server responded with HTTP 503")]
    ServerOverloaded,

    /// Atomic file operation failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },

    /// Incomplete download
    #[error("Incomplete download: received {received} bytes, expected {expected} bytes")]
    IncompleteDownload { received: u64, expected: u64 },

    /// Generic error for other issues
    #[error("{0}")]
    Other(String),
}

/// Moodle web-service errors
#[derive(Error, Debug)]
pub enum MoodleError {
    /// Transport failure
    #[error("Moodle request failed: {0}")]
    Request(#[from] DownloadError),

    /// Response body is not the expected JSON
    #[error("Unexpected Moodle response for {function}: {source}")]
    Decode {
        function: String,
        #[source]
        source: serde_json::Error,
    },

    /// The web service reported an exception
    #[error("Moodle {function} failed ({errorcode}): {message}")]
    Api {
        function: String,
        errorcode: String,
        message: String,
    },

    /// Site URL could not be parsed or joined
    #[error("Invalid Moodle URL: {url}")]
    InvalidUrl { url: String },
}

/// Video resolution errors
#[derive(Error, Debug)]
pub enum VideoError {
    /// The module page could not be fetched
    #[error("Could not fetch video page")]
    Page(#[from] DownloadError),

    /// No embedded player in the page
    #[error("No embedded player found in video page")]
    PlayerNotFound,

    /// Player URL is not parseable
    #[error("Invalid player URL: {src}")]
    InvalidPlayerUrl { src: String },

    /// Player URL has no media reference
    #[error("Player URL has no '{param}' parameter")]
    MissingSource { param: String },
}

/// Errors of the persisted video URL map
#[derive(Error, Debug)]
pub enum VideoMapError {
    /// I/O error reading or writing the map
    #[error("Video map I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The map file is not a JSON object of strings
    #[error("Video map {path} is not valid JSON")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Replacing the map file failed
    #[error("Could not replace video map {path}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The background writer went away
    #[error("Video map writer task failed: {0}")]
    Writer(String),
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    /// Pool constructed with no capacity
    #[error("Worker pool capacity must be positive")]
    InvalidCapacity,

    /// Work submitted after the pool stopped accepting it
    #[error("Worker pool is closed")]
    Closed,

    /// The unit of work never produced a result (aborted or panicked)
    #[error("Unit of work was abandoned before it finished")]
    Abandoned,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("Could not read configuration file")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Authentication error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Moodle web-service error
    #[error(transparent)]
    Moodle(#[from] MoodleError),

    /// Video resolution error
    #[error(transparent)]
    Video(#[from] VideoError),

    /// Video map error
    #[error(transparent)]
    VideoMap(#[from] VideoMapError),

    /// Worker pool error
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Download(DownloadError::RateLimitExceeded)
                | AppError::Download(DownloadError::ServerOverloaded)
                | AppError::Download(DownloadError::Http(_))
                | AppError::Download(DownloadError::IncompleteDownload { .. })
                | AppError::Auth(AuthError::Http(_))
                | AppError::Auth(AuthError::Request(DownloadError::Http(_)))
                | AppError::Moodle(MoodleError::Request(DownloadError::Http(_)))
                | AppError::Video(VideoError::Page(_))
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "authentication",
            AppError::Download(_) => "download",
            AppError::Moodle(_) => "moodle",
            AppError::Video(_) => "video",
            AppError::VideoMap(_) => "video-map",
            AppError::Pool(_) => "pool",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }

    /// Process exit code for a run that ended with this error
    pub fn exit_code(&self) -> i32 {
        exit::FAILURE
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Authentication result type alias
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Moodle result type alias
pub type MoodleResult<T> = std::result::Result<T, MoodleError>;

/// Video resolution result type alias
pub type VideoResult<T> = std::result::Result<T, VideoError>;

/// Worker pool result type alias
pub type PoolResult<T> = std::result::Result<T, PoolError>;
