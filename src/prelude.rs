//! Prelude module for the UniMiB scraper library
//!
//! Re-exports the items needed to assemble a run with a single
//! `use unimib_scraper::prelude::*;` statement.

// Core result types
pub use crate::errors::{AppError, Result};

// Session and catalog
pub use crate::app::{ClientConfig, MoodleClient, PersistentCookieJar, SessionClient};

// Orchestration
pub use crate::app::{
    create_shutdown_channel, CourseCatalog, DownloadStats, Orchestrator, OrchestratorConfig,
    ProgressEvent, SessionResult, TaskOutcome,
};

// Content model
pub use crate::app::{ContentNode, CourseInfo, DownloadTask, PathEscaper, VideoUrlMap};

// Configuration and credentials
pub use crate::auth::{resolve_credentials, Credentials};
pub use crate::config::AppConfig;
