//! Core HTTP operations with rate limiting and retry logic
//!
//! This module provides the fundamental HTTP request operations with
//! built-in resilience patterns: a client-wide rate limiter and exponential
//! backoff on throttling, overload and transport errors.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response};
use url::Url;

use super::config::ClientConfig;
use crate::constants::limits;
use crate::errors::{AuthError, AuthResult, DownloadError, DownloadResult};

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: DirectRateLimiter,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and the rate limiting
    /// and retry settings of `config`
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the rate limit is zero
    pub fn new(client: Client, config: &ClientConfig) -> AuthResult<Self> {
        let rate_limiter = Self::build_rate_limiter(config.rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        })
    }

    /// Builds the rate limiter with the specified rate limit
    fn build_rate_limiter(rate_limit_rps: u32) -> AuthResult<DirectRateLimiter> {
        let rps = NonZeroU32::new(rate_limit_rps).ok_or_else(|| AuthError::ClientSetup {
            reason: "rate limit must be non-zero".to_string(),
        })?;
        Ok(RateLimiter::direct(Quota::per_second(rps)))
    }

    fn backoff(&self, retries: u32) -> Duration {
        let factor = 2_u32.checked_pow(retries).unwrap_or(u32::MAX);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(limits::MAX_RETRY_DELAY)
    }

    /// Sends the request produced by `build` with rate limiting and retries
    ///
    /// `build` is invoked once per attempt, so it must be cheap and repeatable.
    pub async fn send<F>(&self, build: F) -> DownloadResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        // Apply rate limiting with jitter to avoid thundering herd
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let mut retries = 0;
        loop {
            match build(&self.client).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if status == 429 || status == 503 {
                        if retries < self.max_retries {
                            retries += 1;
                            let delay = self.backoff(retries);
                            tracing::warn!(
                                "Server answered HTTP {}. Backing off for {}ms",
                                status,
                                delay.as_millis()
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(if status == 429 {
                            DownloadError::RateLimitExceeded
                        } else {
                            DownloadError::ServerOverloaded
                        });
                    }

                    tracing::debug!("Received HTTP {} from {}", status, response.url());
                    return Ok(response);
                }
                Err(e) if retries < self.max_retries && !e.is_redirect() => {
                    retries += 1;
                    let delay = self.backoff(retries);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {}ms",
                        retries,
                        self.max_retries,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!("Request failed after {} retries: {}", retries, e);
                    return Err(DownloadError::Http(e));
                }
            }
        }
    }

    /// Fetches the HTTP response of a GET request
    ///
    /// This method returns the raw reqwest::Response for streaming downloads.
    /// Use `get_page()` if you need the response body as text.
    pub async fn get_response(&self, url: &Url) -> DownloadResult<Response> {
        self.send(|client| client.get(url.clone())).await
    }

    /// Posts an urlencoded form
    pub async fn post_form(
        &self,
        url: &Url,
        form: &[(String, String)],
    ) -> DownloadResult<Response> {
        self.send(|client| client.post(url.clone()).form(form)).await
    }

    /// Fetches the body of a web page, failing on non-success statuses
    pub async fn get_page(&self, url: &Url) -> DownloadResult<String> {
        let response = ensure_success(self.get_response(url).await?)?;
        let text = response.text().await?;
        tracing::debug!("Successfully fetched page: {}", url);
        Ok(text)
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Maps non-success statuses to `DownloadError::ServerError`
pub fn ensure_success(response: Response) -> DownloadResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(DownloadError::ServerError {
            status: status.as_u16(),
        })
    }
}
