//! Command-line interface components
//!
//! Argument parsing, the scrape command and the progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::Cli;
pub use commands::run_scrape;
pub use progress::{ProgressConfig, ProgressDisplay};
