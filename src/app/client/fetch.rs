//! Fetch capability consumed by the download engine
//!
//! The downloader, the video resolver and the orchestrator only need two things
//! from the network: a streaming GET with its declared length, and a page body.
//! [`HttpFetch`] is that seam; [`super::SessionClient`] implements it over
//! reqwest and tests substitute in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use url::Url;

use crate::errors::DownloadResult;

/// Streaming response body with its declared length
pub struct RemoteBody {
    /// `Content-Length` as declared by the server, if any
    pub content_length: Option<u64>,
    /// Body chunks; dropping the stream abandons the transfer
    pub chunks: BoxStream<'static, DownloadResult<Bytes>>,
}

impl std::fmt::Debug for RemoteBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Authenticated HTTP access used by the download engine
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Issues a GET and returns the body unread, failing on non-success statuses
    async fn open(&self, url: &Url) -> DownloadResult<RemoteBody>;

    /// Fetches a page body as text
    async fn fetch_page(&self, url: &Url) -> DownloadResult<String>;
}
