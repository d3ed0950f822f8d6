//! Core application logic for the UniMiB scraper
//!
//! This module contains the session client and login flow, the web-service
//! catalog, content tree walking, video resolution and the download
//! orchestration.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use unimib_scraper::app::{
//!     create_shutdown_channel, ClientConfig, MoodleClient, Orchestrator, OrchestratorConfig,
//!     PersistentCookieJar, SessionClient, VideoUrlMap,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let base_url = url::Url::parse("https://elearning.unimib.it")?;
//! let jar = Arc::new(PersistentCookieJar::load("cookies.json".as_ref())?);
//! let session = Arc::new(SessionClient::new(base_url, &ClientConfig::default(), jar)?);
//! let token = session.authenticate("m.rossi", "secret").await?;
//!
//! let moodle = MoodleClient::connect(session.clone(), token.token, "it").await?;
//! let videos = Arc::new(VideoUrlMap::load("videos.json").await?);
//! let orchestrator = Orchestrator::new(
//!     OrchestratorConfig::default().with_dest_dir("courses"),
//!     Arc::new(moodle),
//!     session,
//!     videos,
//!     None,
//! )?;
//!
//! let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
//! let result = orchestrator.run(shutdown_rx).await?;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod coordinator;
pub mod models;
pub mod moodle;
pub mod paths;
pub mod video;
pub mod walker;
pub mod worker;

// Re-export main public API
pub use client::{
    ClientConfig, DownloadOutcome, HttpFetch, MobileToken, PersistentCookieJar, RemoteBody,
    ResumableDownloader, SessionClient,
};
pub use coordinator::{
    create_shutdown_channel, CourseCatalog, DownloadStats, Orchestrator, OrchestratorConfig,
    ProgressEvent, SessionResult, SignalHandler, TaskOutcome, ThroughputCounter,
};
pub use models::{ContentNode, CourseInfo, DownloadTask, ModuleNode, SiteInfo, TaskSource};
pub use moodle::MoodleClient;
pub use paths::{PathEscaper, PathProfile};
pub use video::{VideoLookup, VideoResolver, VideoUrlMap};
pub use walker::{TreeWalker, WalkEvent};
pub use worker::BoundedWorkerPool;
