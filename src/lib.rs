//! UniMiB Scraper Library
//!
//! Mirrors the courses of the UniMiB Moodle e-learning site to disk: signs in
//! through the university single sign-on, walks each course's content tree
//! and downloads files and lecture videos with resumable, bounded-concurrency
//! transfers.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
