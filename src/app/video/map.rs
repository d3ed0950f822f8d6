//! Persistent destination-to-video-URL map
//!
//! The map is loaded once and rewritten in full whenever an entry is added.
//! One async mutex covers "check, resolve if absent, write", so a destination
//! is resolved at most once even when several tasks race for it, and writers
//! never interleave. Each rewrite goes to a temporary file in the same
//! directory and is renamed over the old map, so an interrupt leaves either the
//! previous or the new version on disk.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::VideoMapError;

/// Result of a map lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoLookup {
    /// URL was already recorded
    Cached(String),
    /// URL was resolved now and recorded
    Resolved(String),
    /// Resolution found nothing to record
    Unavailable,
}

impl VideoLookup {
    pub fn url(&self) -> Option<&str> {
        match self {
            VideoLookup::Cached(url) | VideoLookup::Resolved(url) => Some(url),
            VideoLookup::Unavailable => None,
        }
    }
}

#[derive(Debug)]
pub struct VideoUrlMap {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl VideoUrlMap {
    /// Loads the map at `path`; a missing file is an empty map
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, VideoMapError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| VideoMapError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(VideoMapError::Io { path, source }),
        };

        debug!("Loaded {} video URLs from {}", entries.len(), path.display());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Returns the URL for `key`, running `resolve` only if none is recorded
    ///
    /// A resolved URL is persisted before this returns. The lock is held while
    /// `resolve` runs.
    pub async fn resolve_with<F, Fut, E>(&self, key: &str, resolve: F) -> Result<VideoLookup, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<String>, E>>,
        E: From<VideoMapError>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(url) = entries.get(key) {
            return Ok(VideoLookup::Cached(url.clone()));
        }

        let Some(url) = resolve().await? else {
            return Ok(VideoLookup::Unavailable);
        };

        entries.insert(key.to_string(), url.clone());
        if let Err(e) = self.persist(&entries).await {
            entries.remove(key);
            return Err(e.into());
        }
        Ok(VideoLookup::Resolved(url))
    }

    /// Rewrites the map file with the current entries
    pub async fn flush(&self) -> Result<(), VideoMapError> {
        let entries = self.entries.lock().await;
        self.persist(&entries).await
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), VideoMapError> {
        let json = serde_json::to_vec_pretty(entries).map_err(|source| VideoMapError::Json {
            path: self.path.clone(),
            source,
        })?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &json))
            .await
            .map_err(|e| VideoMapError::Writer(e.to_string()))?
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), VideoMapError> {
    let io_error = |source| VideoMapError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_error)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(io_error)?;
    temp.write_all(contents).map_err(io_error)?;
    temp.write_all(b"\n").map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path).map_err(|e| VideoMapError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
