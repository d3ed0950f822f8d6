//! HTTP client for the UniMiB e-learning site
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `cookies`: cookie store persisted between runs
//! - `http`: core HTTP operations with rate limiting and retries
//! - `auth`: SSO login flow yielding a web-service token
//! - `fetch`: the fetch capability consumed by the download engine
//! - `download`: resumable GET-to-file transfers

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use url::Url;

use crate::errors::{AuthResult, DownloadError, DownloadResult};

pub mod auth;
pub mod config;
pub mod cookies;
pub mod download;
pub mod fetch;
pub mod http;

pub use auth::{AuthHandler, MobileToken};
pub use config::ClientConfig;
pub use cookies::PersistentCookieJar;
pub use download::{DownloadOutcome, ResumableDownloader};
pub use fetch::{HttpFetch, RemoteBody};

use http::{ensure_success, HttpHandler};

/// Session against the e-learning site, its identity provider and CDN
///
/// Two clients share one cookie jar: the launch client never follows
/// redirects, the browsing client follows them up to the mobile-app hand-off.
#[derive(Debug)]
pub struct SessionClient {
    http_handler: HttpHandler,
    launch_handler: HttpHandler,
    cookie_jar: Arc<PersistentCookieJar>,
    base_url: Url,
}

impl SessionClient {
    /// Creates a client for `base_url` using `cookie_jar`
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the HTTP clients cannot be built
    pub fn new(
        base_url: Url,
        config: &ClientConfig,
        cookie_jar: Arc<PersistentCookieJar>,
    ) -> AuthResult<Self> {
        let http_handler =
            HttpHandler::new(config.build_http_client(cookie_jar.clone(), true)?, config)?;
        let launch_handler =
            HttpHandler::new(config.build_http_client(cookie_jar.clone(), false)?, config)?;

        Ok(Self {
            http_handler,
            launch_handler,
            cookie_jar,
            base_url,
        })
    }

    /// Runs the SSO flow and returns the issued web-service token
    pub async fn authenticate(&self, username: &str, password: &str) -> AuthResult<MobileToken> {
        let token = AuthHandler::authenticate(
            &self.launch_handler,
            &self.http_handler,
            &self.base_url,
            username,
            password,
        )
        .await?;
        tracing::info!("Obtained web-service token for site {}", token.site_id);
        Ok(token)
    }

    /// Persists the session cookies
    pub fn save_cookies(&self, path: &Path) -> AuthResult<()> {
        self.cookie_jar.save(path)
    }

    /// Rate-limited handler for plain requests
    pub fn http(&self) -> &HttpHandler {
        &self.http_handler
    }

    /// Site root
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl HttpFetch for SessionClient {
    async fn open(&self, url: &Url) -> DownloadResult<RemoteBody> {
        let response = ensure_success(self.http_handler.get_response(url).await?)?;
        let content_length = response.content_length();
        let chunks = response.bytes_stream().map_err(DownloadError::Http).boxed();
        Ok(RemoteBody {
            content_length,
            chunks,
        })
    }

    async fn fetch_page(&self, url: &Url) -> DownloadResult<String> {
        self.http_handler.get_page(url).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::TryStreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::app::coordinator::progress::ThroughputCounter;

    fn session(server: &MockServer) -> SessionClient {
        let config = ClientConfig {
            retry_base_delay: Duration::from_millis(1),
            rate_limit_rps: 1000,
            ..Default::default()
        };
        SessionClient::new(
            Url::parse(&server.uri()).unwrap(),
            &config,
            Arc::new(PersistentCookieJar::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_reports_declared_length() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
            .mount(&server)
            .await;

        let client = session(&server);
        let url = Url::parse(&format!("{}/file.pdf", server.uri())).unwrap();
        let body = client.open(&url).await.unwrap();
        assert_eq!(body.content_length, Some(8));

        let chunks: Vec<bytes::Bytes> = body.chunks.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_open_rejects_missing_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = session(&server);
        let url = Url::parse(&format!("{}/gone.pdf", server.uri())).unwrap();
        let result = client.open(&url).await;
        assert!(matches!(result, Err(DownloadError::ServerError { status: 404 })));
    }

    /// Test the reqwest-backed transfer end to end
    ///
    /// Verifies that the downloader writes the served bytes and skips the
    /// second run because the file already has the declared length.
    #[tokio::test]
    async fn test_download_through_session_client() {
        let server = MockServer::start().await;
        let body = vec![7u8; 20_000];
        Mock::given(method("GET"))
            .and(path("/slides.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let destination = temp_dir.path().join("slides.pdf");
        let client: Arc<dyn HttpFetch> = Arc::new(session(&server));
        let downloader = ResumableDownloader::new(client, ThroughputCounter::new());
        let url = Url::parse(&format!("{}/slides.pdf", server.uri())).unwrap();

        let first = downloader.download(&destination, &url, None).await.unwrap();
        assert_eq!(first, DownloadOutcome::Completed { bytes: 20_000 });
        assert_eq!(std::fs::read(&destination).unwrap(), body);

        let second = downloader.download(&destination, &url, None).await.unwrap();
        assert_eq!(second, DownloadOutcome::SkippedExisting { bytes: 20_000 });
    }
}
