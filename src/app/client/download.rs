//! Resumable GET-to-file transfers
//!
//! A transfer is skipped when the destination already holds exactly the number
//! of bytes the server (or the content tree) declares. Otherwise the body is
//! streamed into `<destination>.part` and renamed into place once complete; the
//! partial file is removed on any error and when the transfer future is dropped,
//! so no truncated file ever sits under the final name.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::fetch::HttpFetch;
use crate::app::coordinator::progress::ThroughputCounter;
use crate::constants::files;
use crate::errors::{DownloadError, DownloadResult};

/// Terminal state of a transfer that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The body was written; `bytes` is its length
    Completed { bytes: u64 },
    /// The destination already had the declared size
    SkippedExisting { bytes: u64 },
}

/// Creates a uniquely named partial file next to `destination`
///
/// Each transfer gets its own file, so two transfers to the same destination
/// never write into each other's bytes. The returned path deletes the file
/// when dropped unless it was persisted.
fn partial_file(destination: &Path, parent: &Path) -> DownloadResult<(File, TempPath)> {
    let mut prefix = OsString::from(".");
    if let Some(name) = destination.file_name() {
        prefix.push(name);
        prefix.push(".");
    }
    let (file, path) = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(files::PARTIAL_FILE_SUFFIX)
        .tempfile_in(parent)?
        .into_parts();
    Ok((File::from_std(file), path))
}

/// Performs single transfers with skip-if-complete and cleanup-on-failure
#[derive(Clone)]
pub struct ResumableDownloader {
    fetch: Arc<dyn HttpFetch>,
    throughput: ThroughputCounter,
}

impl ResumableDownloader {
    pub fn new(fetch: Arc<dyn HttpFetch>, throughput: ThroughputCounter) -> Self {
        Self { fetch, throughput }
    }

    /// Downloads `url` to `destination`
    ///
    /// `expected_size`, when known from the content tree, allows skipping
    /// before any request is made. Without it the decision waits for the
    /// declared `Content-Length`; a response without one is always downloaded.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on request, stream or file errors and when the
    /// body length differs from the declared length. The destination is left
    /// untouched in every error case.
    pub async fn download(
        &self,
        destination: &Path,
        url: &Url,
        expected_size: Option<u64>,
    ) -> DownloadResult<DownloadOutcome> {
        let existing = existing_size(destination).await;
        if let (Some(expected), Some(existing)) = (expected_size, existing) {
            if expected == existing {
                tracing::debug!("{} already complete", destination.display());
                return Ok(DownloadOutcome::SkippedExisting { bytes: existing });
            }
        }

        let body = self.fetch.open(url).await?;
        if let (Some(declared), Some(existing)) = (body.content_length, existing) {
            if declared == existing {
                tracing::debug!(
                    "{} matches declared length, skipping",
                    destination.display()
                );
                return Ok(DownloadOutcome::SkippedExisting { bytes: existing });
            }
        }

        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&parent).await?;

        let (mut file, partial) = partial_file(destination, &parent)?;
        let mut chunks = body.chunks;
        let mut written: u64 = 0;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            for slice in chunk.chunks(files::DOWNLOAD_CHUNK_SIZE) {
                file.write_all(slice).await?;
                written += slice.len() as u64;
                self.throughput.add(slice.len() as u64);
            }
        }
        file.flush().await?;
        drop(file);

        if let Some(declared) = body.content_length {
            if declared != written {
                return Err(DownloadError::IncompleteDownload {
                    received: written,
                    expected: declared,
                });
            }
        }

        // Replaces whatever an earlier transfer to the same path left there
        partial
            .persist(destination)
            .map_err(|e| DownloadError::AtomicOperationFailed {
                temp_path: e.path.to_path_buf(),
                final_path: destination.to_path_buf(),
            })?;

        tracing::debug!("Downloaded {} ({} bytes)", destination.display(), written);
        Ok(DownloadOutcome::Completed { bytes: written })
    }
}

async fn existing_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
}
