//! Application constants for the UniMiB scraper
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names for authentication
pub mod env {
    /// Environment variable name for the UniMiB username
    pub const USERNAME: &str = "UNIMIB_USERNAME";

    /// Environment variable name for the UniMiB password
    pub const PASSWORD: &str = "UNIMIB_PASSWORD";
}

/// Moodle site and web-service constants
pub mod moodle {
    /// Default e-learning site
    pub const BASE_URL: &str = "https://elearning.unimib.it";

    /// REST web-service endpoint, relative to the site root
    pub const REST_PATH: &str = "/webservice/rest/server.php";

    /// Mobile-app launch endpoint used to obtain a web-service token
    pub const MOBILE_LAUNCH_PATH: &str = "/admin/tool/mobile/launch.php";

    /// Service name requested from the launch endpoint
    pub const MOBILE_SERVICE: &str = "moodle_mobile_app";

    /// URL scheme the launch endpoint redirects to once the token is issued
    pub const MOBILE_URL_SCHEME: &str = "moodlemobile";

    /// Separator between site id, token and private token in the launch payload
    pub const TOKEN_SEPARATOR: &str = ":::";

    /// File URL prefix that requires the web-service token
    pub const WEBSERVICE_PLUGINFILE: &str = "/webservice/pluginfile.php";

    /// File URL prefix that accepts the private access key instead
    pub const TOKEN_PLUGINFILE: &str = "/tokenpluginfile.php";

    /// Language requested from the web service and preferred for names
    pub const PREFERRED_LANGUAGE: &str = "it";
}

/// Content module types
pub mod modules {
    /// Generic file resource
    pub const RESOURCE: &str = "resource";

    /// Kaltura video resource
    pub const VIDEO: &str = "kalvidres";

    /// Content entry kind that is downloaded
    pub const FILE_KIND: &str = "file";

    /// Extension appended to video module names
    pub const VIDEO_EXTENSION: &str = "mp4";

    /// Interactive activities that never carry downloadable material
    pub const IGNORED: &[&str] = &[
        "assign",
        "choice",
        "choicegroup",
        "customcert",
        "feedback",
        "forum",
        "label",
        "page",
        "quiz",
        "scorm",
    ];
}

/// Video resolution constants
pub mod video {
    /// CSS selector for the embedded player
    pub const PLAYER_SELECTOR: &str = "iframe[src]";

    /// Query parameter of the player URL that carries the media reference
    pub const SOURCE_PARAM: &str = "source";

    /// Pattern extracting the Kaltura entry id from the media reference
    pub const ENTRY_ID_PATTERN: &str = r"entryid/([^/]+)/";

    /// Placeholder replaced by the entry id in the direct URL template
    pub const ENTRY_ID_PLACEHOLDER: &str = "{entry_id}";

    /// Default direct download URL for a Kaltura entry
    pub const DIRECT_URL_TEMPLATE: &str = "https://kmc.l2l.cineca.it/p/113/sp/11300/playManifest/entryId/{entry_id}/format/url/protocol/https/video.mp4";
}

/// SSO login flow constants
pub mod auth {
    /// CSS selector for the identity-provider link on the Moodle login page
    pub const SAML_LINK_SELECTOR: &str = "#unimibsaml_0 a[href]";

    /// Login form field carrying the username
    pub const USERNAME_FIELD: &str = "j_username";

    /// Login form field carrying the password
    pub const PASSWORD_FIELD: &str = "j_password";

    /// Text shown on pages that rely on JavaScript to auto-submit a form
    pub const NOSCRIPT_MARKER: &str = "Since your browser does not support JavaScript";

    /// Maximum number of auto-submit pages followed in one hop
    pub const MAX_CONTINUE_FORMS: usize = 100;

    /// Range of the random passport value sent to the launch endpoint
    pub const PASSPORT_MIN: f64 = 100.0;
    pub const PASSPORT_MAX: f64 = 1000.0;
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";

    /// Accept header sent with SSO page requests
    pub const HTML_ACCEPT: &str =
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 25;

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;
}

/// Rate limiting and retry configuration
pub mod limits {
    use super::Duration;

    /// Default rate limit for requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 15;

    /// Maximum retry attempts for failed requests
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;

    /// Upper bound of a single backoff delay
    pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);
}

/// File operation constants
pub mod files {
    /// Suffix of the file a transfer streams into before it is renamed
    pub const PARTIAL_FILE_SUFFIX: &str = ".part";

    /// Download chunk size for streaming (8KB)
    pub const DOWNLOAD_CHUNK_SIZE: usize = 8 * 1024;

    /// Default destination directory
    pub const DEFAULT_DEST_DIR: &str = ".";

    /// Default location of the resolved video URL map
    pub const DEFAULT_VIDEOS_JSON: &str = "videos.json";

    /// Default location of the persisted session cookies
    pub const DEFAULT_COOKIE_JAR: &str = "cookies.json";

    /// Configuration file looked up in the working directory
    pub const LOCAL_CONFIG_FILE: &str = "unimib-scraper.toml";

    /// Application directory under the platform config dir
    pub const CONFIG_DIR_NAME: &str = "unimib-scraper";
}

/// Path escaping tables
pub mod paths {
    /// Stand-in for the path separator (U+2044 FRACTION SLASH)
    pub const SEPARATOR_REPLACEMENT: char = '\u{2044}';

    /// Stand-in for a dot in dot-only segments (U+FF0E FULLWIDTH FULL STOP)
    pub const DOT_REPLACEMENT: char = '\u{FF0E}';

    /// Replacement for an empty segment
    pub const EMPTY_SEGMENT: &str = "_";

    /// Device names Windows refuses as file stems
    pub const RESERVED_NAMES: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM0", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6",
        "COM7", "COM8", "COM9", "LPT0", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7",
        "LPT8", "LPT9",
    ];

    /// Windows reserved punctuation and its look-alike replacement
    pub const RESERVED_CHARS: &[(char, char)] = &[
        ('\\', '\u{2216}'),
        (':', '\u{2236}'),
        ('*', '\u{2217}'),
        ('?', '\u{FF1F}'),
        ('"', '\u{FF02}'),
        ('<', '\u{FF1C}'),
        ('>', '\u{FF1E}'),
        ('|', '\u{2223}'),
    ];
}

/// Worker and concurrency configuration
pub mod workers {
    /// Default number of concurrent transfers
    pub const DEFAULT_TRANSFERS: usize = 12;

    /// Upper bound accepted for concurrent transfers
    pub const MAX_TRANSFERS: usize = 64;
}

/// Progress reporting
pub mod progress {
    use super::Duration;

    /// Interval between throughput reports
    pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

    /// Spinner refresh interval of the status bar
    pub const SPINNER_TICK: Duration = Duration::from_millis(120);

    /// Bytes per MiB, the unit of the status bar
    pub const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;
}

/// Exit codes
pub mod exit {
    /// Fatal error
    pub const FAILURE: i32 = 1;

    /// Run stopped by SIGINT/SIGTERM
    pub const INTERRUPTED: i32 = 130;
}
