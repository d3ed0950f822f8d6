//! HTTP client configuration and building logic
//!
//! This module handles the configuration and construction of the HTTP clients
//! used against the Moodle site, its identity provider and the file/video CDN.

use std::sync::Arc;
use std::time::Duration;

use reqwest::redirect::{Attempt, Policy};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::cookies::PersistentCookieJar;
use crate::constants::{http, limits};
use crate::errors::{AuthError, AuthResult};

/// Configuration for HTTP client optimizations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// User agent sent with every request
    pub user_agent: String,
    /// TCP keep-alive settings
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of connections per host
    pub pool_max_per_host: usize,
    /// Request timeout, covering the whole body of a transfer
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Retry attempts on throttling and transport errors
    pub max_retries: u32,
    /// Base delay of the exponential backoff
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: http::USER_AGENT.to_string(),
            tcp_keepalive: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            // Lectures can take far longer than a minute to stream, so the
            // default only bounds connection setup.
            request_timeout: None,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
        }
    }
}

impl ClientConfig {
    /// Validate the configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.rate_limit_rps == 0 {
            return Err("Rate limit must be greater than 0".to_string());
        }
        if self.pool_max_per_host == 0 {
            return Err("Connection pool size must be greater than 0".to_string());
        }
        if self.user_agent.trim().is_empty() {
            return Err("User agent must not be empty".to_string());
        }
        Ok(())
    }

    /// Builds an HTTP client sharing the given cookie jar
    ///
    /// With `follow_redirects` the client follows HTTP(S) redirects but stops
    /// in front of any other scheme, so the `moodlemobile://` hand-off of the
    /// login flow comes back as a plain 3xx response.
    pub fn build_http_client(
        &self,
        jar: Arc<PersistentCookieJar>,
        follow_redirects: bool,
    ) -> AuthResult<Client> {
        let redirect_policy = if follow_redirects {
            Policy::custom(stop_at_foreign_scheme)
        } else {
            Policy::none()
        };

        let mut client_builder = Client::builder()
            .cookie_provider(jar)
            .redirect(redirect_policy)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.as_str())
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if let Some(timeout) = self.request_timeout {
            client_builder = client_builder.timeout(timeout);
        }

        // Configure TCP keep-alive if specified
        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        // Configure connection pool idle timeout
        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(AuthError::Http)
    }
}

fn stop_at_foreign_scheme(attempt: Attempt) -> reqwest::redirect::Action {
    if !matches!(attempt.url().scheme(), "http" | "https") {
        attempt.stop()
    } else if attempt.previous().len() > http::MAX_REDIRECTS {
        attempt.error("too many redirects")
    } else {
        attempt.follow()
    }
}
