//! Resilient HTTP fetching.
//!
//! Every upstream call in the pipeline (index queries, archived documents)
//! goes through [`Fetcher::fetch`], which wraps a single GET attempt in
//! [`retry_with_backoff`]. Transport failures, timeouts, HTTP 429 and 5xx
//! responses are retried with exponential backoff; any other 4xx fails on the
//! first attempt.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use url::Url;

use crate::error::{FetchCause, FetchError};
use crate::Result;

/// Retry bound and backoff base for upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self { max_retries: 0, base_delay: Duration::ZERO }
    }

    /// Backoff before retry number `attempt + 1`: `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// HTTP client configuration shared by every fetch.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User-Agent sent with every request.
    pub user_agent: String,
    /// Retry policy applied to every fetch.
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!(
                "Mozilla/5.0 (compatible; Waymark/{}; +https://web.archive.org)",
                env!("CARGO_PKG_VERSION")
            ),
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-call options: timeout and extra headers.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Timeout for a single attempt.
    pub timeout: Duration,
    /// Extra request headers, appended after the defaults.
    pub headers: Vec<(String, String)>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10), headers: Vec::new() }
    }
}

impl FetchOptions {
    /// Options with the given timeout and no extra headers.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout, headers: Vec::new() }
    }

    /// Adds a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A successful response, fully read.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    /// HTTP status (always 2xx).
    pub status: u16,
    /// Response body decoded as text.
    pub body: String,
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's retry budget is spent.
///
/// `operation` receives the zero-based attempt number. Between attempts the
/// combinator sleeps for [`RetryPolicy::delay_for`] of the failed attempt.
/// The last error is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy, is_retryable: R, mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && is_retryable(&err) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// HTTP GET with retry and backoff.
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    /// Builds a fetcher with its own connection pool.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder().user_agent(config.user_agent.clone()).build()?;
        Ok(Self { client, config })
    }

    /// The configuration this fetcher was built with.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches `url`, retrying according to the configured [`RetryPolicy`].
    pub async fn fetch(&self, url: &Url, options: &FetchOptions) -> std::result::Result<FetchedPage, FetchError> {
        retry_with_backoff(&self.config.retry, FetchCause::is_retryable, |attempt| {
            self.attempt(url, options, attempt)
        })
        .await
        .map_err(|cause| FetchError { url: url.to_string(), cause })
    }

    /// One GET. The response is read to completion or dropped before returning.
    async fn attempt(
        &self, url: &Url, options: &FetchOptions, attempt: u32,
    ) -> std::result::Result<FetchedPage, FetchCause> {
        tracing::debug!(%url, attempt, "GET");

        let mut request = self
            .client
            .get(url.clone())
            .timeout(options.timeout)
            .header(ACCEPT, "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9");
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        let body = response.text().await?;

        if status.is_success() {
            Ok(FetchedPage { url: final_url, status: status.as_u16(), body })
        } else {
            Err(FetchCause::status(status.as_u16(), &body))
        }
    }
}
