//! UniMiB scraper CLI application
//!
//! Mirrors every course of the UniMiB e-learning site to a local directory.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use unimib_scraper::cli::{run_scrape, Cli};
use unimib_scraper::config::AppConfig;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    init_logging(&cli).await;

    info!("UniMiB scraper v{} starting", env!("CARGO_PKG_VERSION"));

    match run_scrape(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.is_recoverable() {
                eprintln!("This looks temporary; running again resumes where it stopped.");
            }
            process::exit(e.exit_code());
        }
    }
}

/// Initialize logging from `-v`/`-q`, the configured level and `RUST_LOG`
async fn init_logging(cli: &Cli) {
    let configured = AppConfig::load(cli.config.clone())
        .await
        .map(|config| config.logging.level)
        .unwrap_or_else(|_| "warn".to_string());
    let log_level = cli.log_level(&configured);

    let mut filter = EnvFilter::from_default_env();
    match format!("unimib_scraper={}", log_level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring log level {}: {}", log_level, e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.verbose > 1)
        .with_writer(std::io::stderr)
        .init();
}
