//! Download orchestration
//!
//! The orchestrator owns a run end to end: it lists the enrolled courses,
//! walks each course's content tree and submits every resulting task to a
//! bounded worker pool. Task errors are converted into outcomes at the task
//! boundary; only failures to list courses or fetch a content tree end the run.
//!
//! The coordinator module is organized into specialized components:
//!
//! - [`catalog`] - source of courses and content trees
//! - [`config`] - run configuration and validation
//! - [`stats`] - run statistics and the final session result
//! - [`progress`] - throughput counting and the progress event stream
//! - [`signals`] - signal handling for graceful shutdown

pub mod catalog;
pub mod config;
pub mod progress;
pub mod signals;
pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::app::client::{DownloadOutcome, HttpFetch, ResumableDownloader};
use crate::app::models::{DownloadTask, TaskSource};
use crate::app::paths::PathEscaper;
use crate::app::video::{VideoLookup, VideoResolver, VideoUrlMap};
use crate::app::walker::{SkipReason, TreeWalker, WalkEvent};
use crate::app::worker::BoundedWorkerPool;
use crate::errors::{AppError, ConfigError, DownloadError, Result};

pub use catalog::CourseCatalog;
pub use config::OrchestratorConfig;
pub use progress::{
    ProgressEvent, ProgressSink, TaskOutcome, ThroughputCounter, ThroughputReporter,
};
pub use signals::{create_shutdown_channel, wait_for_shutdown_signal, SignalHandler};
pub use stats::{DownloadStats, SessionResult};

/// How the submission phase ended
enum Ending {
    Submitted,
    Failed(AppError),
    Interrupted,
}

/// Drives a complete scraping run
pub struct Orchestrator {
    config: OrchestratorConfig,
    catalog: Arc<dyn CourseCatalog>,
    walker: TreeWalker,
    runner: TaskRunner,
    throughput: ThroughputCounter,
    sink: ProgressSink,
}

impl Orchestrator {
    /// Creates an orchestrator over the given collaborators
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `config` does not validate
    pub fn new(
        config: OrchestratorConfig,
        catalog: Arc<dyn CourseCatalog>,
        fetch: Arc<dyn HttpFetch>,
        videos: Arc<VideoUrlMap>,
        events: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<Self> {
        config.validate().map_err(|reason| ConfigError::InvalidValue {
            field: "download".to_string(),
            value: format!("{} transfers", config.transfers),
            reason,
        })?;

        let throughput = ThroughputCounter::new();
        let sink = ProgressSink::new(events);
        let runner = TaskRunner {
            dest_dir: Arc::new(config.dest_dir.clone()),
            download_videos: config.download_videos,
            downloader: ResumableDownloader::new(fetch.clone(), throughput.clone()),
            resolver: VideoResolver::new(fetch, config.video_url_template.clone()),
            videos,
            stats: Arc::new(RwLock::new(DownloadStats::default())),
            sink: sink.clone(),
        };
        let walker = TreeWalker::new(
            PathEscaper::new(config.path_profile),
            config.preferred_language.clone(),
        );

        Ok(Self {
            config,
            catalog,
            walker,
            runner,
            throughput,
            sink,
        })
    }

    /// Bytes written so far
    pub fn throughput(&self) -> &ThroughputCounter {
        &self.throughput
    }

    /// Runs until every task finished, a fatal error occurred or
    /// `shutdown_rx` fired
    ///
    /// An interrupt cancels in-flight transfers (their partial files are
    /// removed) and yields a result with `interrupted` set. A fatal error lets
    /// running transfers finish before it is returned.
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<SessionResult> {
        let started = Instant::now();
        {
            let mut stats = self.runner.stats.write().await;
            *stats = DownloadStats::default();
        }
        info!(
            "Starting run into {} with {} transfers",
            self.config.dest_dir.display(),
            self.config.transfers
        );

        let (stop_tx, _) = broadcast::channel(1);
        let reporter = ThroughputReporter::new(
            self.throughput.clone(),
            self.sink.clone(),
            self.config.report_interval,
        )
        .start(stop_tx.subscribe());

        let mut pool = BoundedWorkerPool::new(self.config.transfers)?;
        let shutdown = wait_for_shutdown_signal(shutdown_rx);
        tokio::pin!(shutdown);

        let mut ending = tokio::select! {
            result = self.submit_all(&mut pool) => match result {
                Ok(()) => Ending::Submitted,
                Err(e) => Ending::Failed(e),
            },
            _ = &mut shutdown => Ending::Interrupted,
        };

        let cancel = match ending {
            Ending::Interrupted => true,
            _ => tokio::select! {
                _ = pool.drain() => false,
                _ = &mut shutdown => true,
            },
        };
        let report = if cancel {
            warn!("Interrupted, cancelling {} transfers", pool.in_flight());
            if matches!(ending, Ending::Submitted) {
                ending = Ending::Interrupted;
            }
            pool.abandon().await
        } else {
            pool.finish().await
        };
        debug!("Pool report: {:?}", report);

        let _ = stop_tx.send(());
        if let Err(e) = reporter.await {
            warn!("Throughput reporter failed: {}", e);
        }

        let mut shutdown_errors = Vec::new();
        if !self.runner.videos.is_empty().await {
            if let Err(e) = self.runner.videos.flush().await {
                warn!("Could not save video URLs: {}", e);
                shutdown_errors.push(e.to_string());
            }
        }
        if report.panicked > 0 {
            shutdown_errors.push(format!("{} transfers panicked", report.panicked));
        }

        let stats = {
            let mut stats = self.runner.stats.write().await;
            stats.total_bytes_downloaded = self.throughput.total();
            stats.update_duration();
            stats.clone()
        };
        self.sink.emit(ProgressEvent::Throughput {
            bytes_per_second: stats.average_rate_bps(),
            total_bytes: stats.total_bytes_downloaded,
        });

        let mut result = match ending {
            Ending::Failed(e) => {
                error!("Run aborted: {}", e);
                return Err(e);
            }
            Ending::Interrupted => SessionResult::interrupted(stats, started.elapsed()),
            Ending::Submitted => SessionResult::completed(stats, started.elapsed()),
        };
        result.shutdown_errors = shutdown_errors;
        info!("{}", result.summary());
        Ok(result)
    }

    async fn submit_all(&self, pool: &mut BoundedWorkerPool) -> Result<()> {
        let courses = self.catalog.list_courses().await?;
        info!("Found {} courses", courses.len());

        for course in courses {
            let base = course.path();
            let course_label = base.join(" / ");
            info!("Checking course {}", course_label);
            self.sink.emit(ProgressEvent::CourseStarted {
                path: course_label,
            });

            let tree = self.catalog.course_contents(course.id).await?;
            self.runner.stats.write().await.courses += 1;

            for event in self.walker.walk(&tree, base) {
                match event {
                    WalkEvent::Task(task) => {
                        trace!("Submitting {}", task);
                        self.runner.stats.write().await.tasks_submitted += 1;
                        let runner = self.runner.clone();
                        pool.submit(async move { runner.execute(task).await })
                            .await?;
                    }
                    WalkEvent::Skipped { path, reason } => self.notice_skip(path, reason).await,
                    WalkEvent::UnknownModule {
                        path,
                        module_type,
                        plural,
                    } => {
                        let message = match plural {
                            Some(plural) => format!("unknown module '{module_type}' ({plural})"),
                            None => format!("unknown module '{module_type}'"),
                        };
                        self.notice(path, message).await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn notice_skip(&self, path: Vec<String>, reason: SkipReason) {
        match reason {
            SkipReason::IgnoredModule { module_type } => {
                trace!("Ignoring {} module at {}", module_type, path.join(" / "));
            }
            SkipReason::NoContents => self.notice(path, "skipping empty module".into()).await,
            other => self.notice(path, format!("skipping: {other}")).await,
        }
    }

    async fn notice(&self, path: Vec<String>, message: String) {
        let path = path.join(" / ");
        info!("{}: {}", path, message);
        self.runner.stats.write().await.module_notices += 1;
        self.sink.emit(ProgressEvent::ModuleNotice { path, message });
    }
}

/// Everything a worker needs to carry out one task
#[derive(Clone)]
struct TaskRunner {
    dest_dir: Arc<PathBuf>,
    download_videos: bool,
    downloader: ResumableDownloader,
    resolver: VideoResolver,
    videos: Arc<VideoUrlMap>,
    stats: Arc<RwLock<DownloadStats>>,
    sink: ProgressSink,
}

impl TaskRunner {
    /// Runs one task to a terminal outcome; never fails
    async fn execute(&self, task: DownloadTask) -> TaskOutcome {
        let destination = task.destination(&self.dest_dir);
        let result = match &task.source {
            TaskSource::File { url } => {
                self.download_file(&destination, url, task.expected_size)
                    .await
            }
            TaskSource::Video { page_url } => self.download_video(&destination, page_url).await,
        };

        let label = task.label();
        let outcome = match result {
            Ok(outcome) => {
                debug!("{}: {}", label, outcome);
                outcome
            }
            Err(e) => {
                warn!("{}: {} ({})", label, e, e.category());
                TaskOutcome::Failed(error_chain(&e))
            }
        };

        self.stats.write().await.record(&outcome);
        self.sink.emit(ProgressEvent::TaskFinished {
            label,
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn download_file(
        &self,
        destination: &Path,
        url: &str,
        expected_size: Option<u64>,
    ) -> Result<TaskOutcome> {
        let url = parse_url(url)?;
        let outcome = self
            .downloader
            .download(destination, &url, expected_size)
            .await?;
        Ok(match outcome {
            DownloadOutcome::Completed { bytes } => TaskOutcome::Completed { bytes },
            DownloadOutcome::SkippedExisting { .. } => TaskOutcome::Skipped,
        })
    }

    async fn download_video(&self, destination: &Path, page_url: &str) -> Result<TaskOutcome> {
        let page = parse_url(page_url)?;
        let key = destination.display().to_string();
        let lookup = self
            .videos
            .resolve_with(&key, || async {
                self.resolver.resolve(&page).await.map_err(AppError::from)
            })
            .await?;

        match (lookup, self.download_videos) {
            (VideoLookup::Unavailable, _) => Ok(TaskOutcome::VideoUnavailable),
            (VideoLookup::Cached(_), false) => Ok(TaskOutcome::Skipped),
            (VideoLookup::Resolved(_), false) => Ok(TaskOutcome::VideoRecorded),
            (VideoLookup::Cached(url) | VideoLookup::Resolved(url), true) => {
                self.download_file(destination, &url, None).await
            }
        }
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| {
        AppError::Download(DownloadError::InvalidUrl {
            url: raw.to_string(),
            error: e.to_string(),
        })
    })
}

/// Error message including its sources
fn error_chain(error: &AppError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use tempfile::TempDir;

    use super::*;
    use crate::app::client::RemoteBody;
    use crate::app::models::{
        ContentNode, CourseInfo, FileEntry, GroupNode, ModuleNode, ModulePayload, VideoDescriptor,
    };
    use crate::app::paths::PathProfile;
    use crate::errors::{DownloadResult, MoodleError};

    struct FakeCatalog {
        courses: Vec<CourseInfo>,
        trees: HashMap<i64, ContentNode>,
    }

    #[async_trait]
    impl CourseCatalog for FakeCatalog {
        async fn list_courses(&self) -> Result<Vec<CourseInfo>> {
            Ok(self.courses.clone())
        }

        async fn course_contents(&self, course_id: i64) -> Result<ContentNode> {
            self.trees.get(&course_id).cloned().ok_or_else(|| {
                AppError::Moodle(MoodleError::Api {
                    function: "core_course_get_contents".into(),
                    errorcode: "invalidrecord".into(),
                    message: format!("course {course_id}"),
                })
            })
        }
    }

    #[derive(Default)]
    struct FakeFetch {
        files: HashMap<String, Vec<u8>>,
        pages: HashMap<String, String>,
        page_fetches: AtomicUsize,
        opened: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpFetch for FakeFetch {
        async fn open(&self, url: &Url) -> DownloadResult<RemoteBody> {
            self.opened.lock().unwrap().push(url.to_string());
            let body = self
                .files
                .get(url.as_str())
                .cloned()
                .ok_or(DownloadError::ServerError { status: 404 })?;
            Ok(RemoteBody {
                content_length: Some(body.len() as u64),
                chunks: stream::iter(vec![Ok(Bytes::from(body))]).boxed(),
            })
        }

        async fn fetch_page(&self, url: &Url) -> DownloadResult<String> {
            self.page_fetches.fetch_add(1, Ordering::SeqCst);
            self.pages
                .get(url.as_str())
                .cloned()
                .ok_or(DownloadError::ServerError { status: 404 })
        }
    }

    fn resource(id: i64, name: &str, files: &[(&str, &str, u64)]) -> ContentNode {
        ContentNode::Module(ModuleNode {
            id,
            name: name.into(),
            module_type: "resource".into(),
            plural: Some("File".into()),
            payload: ModulePayload::Files(
                files
                    .iter()
                    .map(|(filename, url, size)| FileEntry {
                        filename: filename.to_string(),
                        url: url.to_string(),
                        size_bytes: *size,
                        kind: "file".into(),
                    })
                    .collect(),
            ),
            children: vec![],
        })
    }

    fn video(id: i64, name: &str, page_url: &str) -> ContentNode {
        ContentNode::Module(ModuleNode {
            id,
            name: name.into(),
            module_type: "kalvidres".into(),
            plural: None,
            payload: ModulePayload::Video(VideoDescriptor {
                page_url: page_url.into(),
                display_name: name.into(),
            }),
            children: vec![],
        })
    }

    fn course(id: i64, name: &str) -> CourseInfo {
        CourseInfo {
            id,
            category_path: vec!["Scienze".into()],
            name: name.into(),
        }
    }

    fn config(dir: &Path) -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_dest_dir(dir)
            .with_transfers(2)
            .with_path_profile(PathProfile::Posix)
    }

    /// Test a complete run
    ///
    /// Verifies that files land under category and course directories, that
    /// a missing file is a task-level failure and that events are published.
    #[tokio::test]
    async fn test_run_downloads_and_reports() {
        let temp_dir = TempDir::new().unwrap();
        let tree = ContentNode::root(vec![ContentNode::Group(GroupNode {
            id: 1,
            name: "Lezioni".into(),
            children: vec![
                resource(
                    10,
                    "Slide",
                    &[
                        ("a.pdf", "https://cdn.test/a.pdf", 3),
                        ("b.pdf", "https://cdn.test/b.pdf", 2),
                    ],
                ),
                resource(11, "Mancante", &[("gone.pdf", "https://cdn.test/gone.pdf", 1)]),
            ],
        })]);

        let fetch = Arc::new(FakeFetch {
            files: HashMap::from([
                ("https://cdn.test/a.pdf".to_string(), b"abc".to_vec()),
                ("https://cdn.test/b.pdf".to_string(), b"de".to_vec()),
            ]),
            ..Default::default()
        });
        let catalog = Arc::new(FakeCatalog {
            courses: vec![course(7, "Analisi I")],
            trees: HashMap::from([(7, tree)]),
        });
        let videos = Arc::new(
            VideoUrlMap::load(temp_dir.path().join("videos.json"))
                .await
                .unwrap(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let orchestrator =
            Orchestrator::new(config(temp_dir.path()), catalog, fetch, videos, Some(tx)).unwrap();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let result = orchestrator.run(shutdown_rx).await.unwrap();

        assert!(!result.interrupted);
        assert_eq!(result.stats.files_completed, 2);
        assert_eq!(result.stats.files_failed, 1);
        assert_eq!(result.stats.total_bytes_downloaded, 5);

        let course_dir = temp_dir.path().join("Scienze").join("Analisi I").join("Lezioni");
        assert_eq!(std::fs::read(course_dir.join("Slide").join("a.pdf")).unwrap(), b"abc");
        assert_eq!(std::fs::read(course_dir.join("Slide").join("b.pdf")).unwrap(), b"de");
        assert!(!course_dir.join("gone.pdf").exists());
        assert!(!temp_dir.path().join("videos.json").exists());

        drop(orchestrator);
        let mut finished = 0;
        let mut courses = 0;
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::TaskFinished { .. } => finished += 1,
                ProgressEvent::CourseStarted { path } => {
                    assert_eq!(path, "Scienze / Analisi I");
                    courses += 1;
                }
                _ => {}
            }
        }
        assert_eq!(finished, 3);
        assert_eq!(courses, 1);
    }

    /// Test video handling
    ///
    /// Ensures a video is resolved once, recorded in the map and downloaded;
    /// a second run reuses the recorded URL without fetching the page again.
    #[tokio::test]
    async fn test_video_resolved_once_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        let page = "https://elearning.test/mod/kalvidres/view.php?id=5";
        let tree = ContentNode::root(vec![video(5, "Lezione 1", page)]);
        let player = r#"<iframe src="https://kaf.test/launch?source=https%3A%2F%2Fkaf.test%2Fentryid%2F1_xyz%2Fembed"></iframe>"#;

        let fetch = Arc::new(FakeFetch {
            files: HashMap::from([("https://cdn.test/1_xyz.mp4".to_string(), vec![1u8; 64])]),
            pages: HashMap::from([(page.to_string(), player.to_string())]),
            ..Default::default()
        });
        let catalog = Arc::new(FakeCatalog {
            courses: vec![course(7, "Analisi I")],
            trees: HashMap::from([(7, tree)]),
        });
        let map_path = temp_dir.path().join("videos.json");
        let mut cfg = config(temp_dir.path());
        cfg.video_url_template = "https://cdn.test/{entry_id}.mp4".into();

        for _ in 0..2 {
            let videos = Arc::new(VideoUrlMap::load(&map_path).await.unwrap());
            let orchestrator = Orchestrator::new(
                cfg.clone(),
                catalog.clone(),
                fetch.clone(),
                videos,
                None,
            )
            .unwrap();
            let (_tx, rx) = create_shutdown_channel();
            orchestrator.run(rx).await.unwrap();
        }

        assert_eq!(fetch.page_fetches.load(Ordering::SeqCst), 1);
        let target = temp_dir
            .path()
            .join("Scienze")
            .join("Analisi I")
            .join("Lezione 1.mp4");
        assert_eq!(std::fs::read(&target).unwrap().len(), 64);

        let map: HashMap<String, String> =
            serde_json::from_slice(&std::fs::read(&map_path).unwrap()).unwrap();
        assert_eq!(
            map.get(&target.display().to_string()).map(String::as_str),
            Some("https://cdn.test/1_xyz.mp4")
        );
    }

    #[tokio::test]
    async fn test_record_only_mode_skips_video_download() {
        let temp_dir = TempDir::new().unwrap();
        let page = "https://elearning.test/mod/kalvidres/view.php?id=6";
        let tree = ContentNode::root(vec![video(6, "Lezione 2", page)]);
        let fetch = Arc::new(FakeFetch {
            pages: HashMap::from([(
                page.to_string(),
                r#"<iframe src="/launch?source=x%2Fentryid%2F0_a%2F"></iframe>"#.to_string(),
            )]),
            ..Default::default()
        });
        let catalog = Arc::new(FakeCatalog {
            courses: vec![course(1, "Fisica")],
            trees: HashMap::from([(1, tree)]),
        });
        let videos = Arc::new(VideoUrlMap::load(temp_dir.path().join("v.json")).await.unwrap());

        let orchestrator = Orchestrator::new(
            config(temp_dir.path()).with_video_downloads(false),
            catalog,
            fetch.clone(),
            videos.clone(),
            None,
        )
        .unwrap();
        let (_tx, rx) = create_shutdown_channel();
        let result = orchestrator.run(rx).await.unwrap();

        assert_eq!(result.stats.videos_recorded, 1);
        assert_eq!(videos.len().await, 1);
        assert!(fetch.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tree_failure_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = Arc::new(FakeCatalog {
            courses: vec![course(1, "Fisica")],
            trees: HashMap::new(),
        });
        let videos = Arc::new(VideoUrlMap::load(temp_dir.path().join("v.json")).await.unwrap());
        let orchestrator = Orchestrator::new(
            config(temp_dir.path()),
            catalog,
            Arc::new(FakeFetch::default()),
            videos,
            None,
        )
        .unwrap();

        let (_tx, rx) = create_shutdown_channel();
        let result = orchestrator.run(rx).await;
        assert!(matches!(result, Err(AppError::Moodle(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let videos = Arc::new(VideoUrlMap::load(temp_dir.path().join("v.json")).await.unwrap());
        let result = Orchestrator::new(
            OrchestratorConfig::default().with_transfers(0),
            Arc::new(FakeCatalog {
                courses: vec![],
                trees: HashMap::new(),
            }),
            Arc::new(FakeFetch::default()),
            videos,
            None,
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let error = AppError::Video(crate::errors::VideoError::Page(DownloadError::ServerError {
            status: 500,
        }));
        let message = error_chain(&error);
        assert!(message.contains("500"), "{message}");
    }
}
