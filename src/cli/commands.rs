//! Command implementation for the scraper binary
//!
//! [`run_scrape`] wires the whole pipeline together: configuration, login,
//! web-service connection, video map, orchestrator, signal handling and the
//! progress display.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::client::{PersistentCookieJar, SessionClient};
use crate::app::coordinator::{create_shutdown_channel, Orchestrator, SessionResult, SignalHandler};
use crate::app::moodle::MoodleClient;
use crate::app::video::VideoUrlMap;
use crate::auth::{get_auth_status, resolve_credentials};
use crate::cli::args::Cli;
use crate::cli::progress::{ProgressConfig, ProgressDisplay};
use crate::config::AppConfig;
use crate::constants::exit;
use crate::errors::{AppError, AuthError, Result};

/// Runs a complete scrape and returns the process exit code
///
/// # Errors
///
/// Returns `AppError` if configuration, login, the web-service connection or
/// listing the course contents fails. Individual transfer failures are
/// reported in the summary and do not make the run fail.
pub async fn run_scrape(cli: Cli) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = AppConfig::load(cli.config.clone()).await?;
    cli.apply_to(&mut config);
    let base_url = config.base_url()?;
    let (client_config, orchestrator_config) = config.to_runtime_config()?;

    let credentials = resolve_credentials(cli.username.clone(), cli.password.clone())
        .map_err(|e| {
            if matches!(e, AuthError::MissingCredentials) {
                eprintln!("{}", get_auth_status().status_message());
            }
            AppError::Auth(e)
        })?;

    let cookie_path = config.download.cookie_jar.clone();
    let cookie_jar = Arc::new(PersistentCookieJar::load(&cookie_path)?);
    let session = Arc::new(SessionClient::new(
        base_url.clone(),
        &client_config,
        cookie_jar,
    )?);

    if !cli.quiet {
        println!("Signing in to {} as {}...", base_url, credentials.username);
    }
    let token = session
        .authenticate(&credentials.username, &credentials.password)
        .await?;
    if let Err(e) = session.save_cookies(&cookie_path) {
        warn!("Could not save cookies: {}", e);
    }

    let moodle = MoodleClient::connect(
        session.clone(),
        token.token,
        orchestrator_config.preferred_language.clone(),
    )
    .await?;
    if !cli.quiet {
        println!("Connected to {}", moodle.site().sitename);
    }
    let videos = Arc::new(VideoUrlMap::load(config.download.videos_json.clone()).await?);
    info!(
        "Loaded {} recorded video URLs from {}",
        videos.len().await,
        videos.path().display()
    );

    let progress_config = if cli.quiet {
        ProgressConfig::quiet()
    } else {
        ProgressConfig::default()
    };
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let display = ProgressDisplay::new(progress_config)?.spawn(event_rx);

    let orchestrator = Orchestrator::new(
        orchestrator_config,
        Arc::new(moodle),
        session.clone(),
        videos,
        Some(event_tx),
    )?;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let signal_task = SignalHandler::new(shutdown_tx).setup();

    let outcome = orchestrator.run(shutdown_rx).await;
    signal_task.abort();
    drop(orchestrator);
    if let Err(e) = display.await {
        warn!("Progress display failed: {}", e);
    }

    let session_result = outcome?;
    report(&session_result);
    info!("Total elapsed: {:?}", start_time.elapsed());

    Ok(if session_result.interrupted {
        exit::INTERRUPTED
    } else {
        0
    })
}

/// Prints the end-of-run summary
fn report(result: &SessionResult) {
    println!("{}", result.summary());
    if result.stats.module_notices > 0 {
        println!("  {} modules skipped", result.stats.module_notices);
    }
    if result.has_errors() {
        println!("Shutdown errors:");
        for error in &result.shutdown_errors {
            println!("  • {}", error);
        }
    }
}
