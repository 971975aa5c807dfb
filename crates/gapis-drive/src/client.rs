//! Drive API HTTP client
//!
//! Wraps `reqwest::Client` with bearer authentication, base URL
//! construction, client-side throttling and retries. Every call the adapter
//! makes goes through [`DriveClient::send`], which is the only place that
//! retries anything.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gapis_drive::client::DriveClient;
//! use gapis_drive::rate_limit::Category;
//! use reqwest::Method;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = DriveClient::new("access-token-here");
//! let response = client
//!     .send(Category::Metadata, || {
//!         client.request(Method::GET, "/drive/v3/about").query(&[("fields", "user")])
//!     })
//!     .await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::rate_limit::{backoff_delay, parse_retry_after, AdaptiveRateLimiter, Category};
use crate::DriveError;

/// Base URL of the Google APIs front end
const DRIVE_BASE_URL: &str = "https://www.googleapis.com";

/// Retries when no rate limiter is configured
const DEFAULT_MAX_RETRIES: u32 = 5;

/// 403 reasons that signal throttling rather than a permission problem
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

// ============================================================================
// Error body
// ============================================================================

/// `{"error": {"code": 403, "message": "...", "errors": [{"reason": "..."}]}}`
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

impl ErrorBody {
    fn parse(text: &str) -> Self {
        serde_json::from_str::<ErrorEnvelope>(text)
            .map(|e| e.error)
            .unwrap_or_else(|_| ErrorBody {
                message: text.trim().to_string(),
                errors: Vec::new(),
            })
    }

    fn is_rate_limit(&self) -> bool {
        self.errors
            .iter()
            .any(|e| RATE_LIMIT_REASONS.contains(&e.reason.as_str()))
    }
}

/// What to do with a non-success response
#[derive(Debug)]
enum Outcome {
    /// Throttled; retry after the given delay (or backoff when `None`)
    Throttled(Option<Duration>),
    /// Transient server failure; retry with backoff (or the given delay)
    Transient(Option<Duration>, String),
    /// Not retryable
    Fatal(DriveError),
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for Drive API calls
///
/// Optionally integrates with an [`AdaptiveRateLimiter`] for proactive
/// throttling; retries happen with or without one.
#[derive(Debug, Clone)]
pub struct DriveClient {
    client: Client,
    base_url: String,
    access_token: String,
    rate_limiter: Option<Arc<AdaptiveRateLimiter>>,
}

impl DriveClient {
    /// Creates a client for the public Drive endpoint
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DRIVE_BASE_URL)
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            rate_limiter: None,
        }
    }

    /// Attaches a shared rate limiter
    pub fn with_rate_limiter(mut self, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn rate_limiter(&self) -> Option<&Arc<AdaptiveRateLimiter>> {
        self.rate_limiter.as_ref()
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn max_retries(&self) -> u32 {
        self.rate_limiter
            .as_ref()
            .map_or(DEFAULT_MAX_RETRIES, |rl| rl.max_retries())
    }

    /// Authenticated request for a path relative to the base URL
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - API path, e.g. `/drive/v3/files`
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_url(method, &format!("{}{}", self.base_url, path))
    }

    /// Authenticated request for an absolute URL (upload sessions)
    pub fn request_url(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.access_token)
    }

    /// Sends a request with throttling and retries
    ///
    /// `build` is called once per attempt. Before each attempt a token for
    /// `category` is taken from the rate limiter. Responses are handled as
    /// follows:
    /// - 2xx and 308 (upload session "resume incomplete") are returned
    /// - 429 and 403 with a rate-limit reason signal the limiter and are
    ///   retried after `Retry-After`, or exponential backoff
    /// - 5xx are retried with backoff
    /// - anything else maps to a [`DriveError`] immediately
    ///
    /// # Errors
    /// [`DriveError::RateLimited`] or [`DriveError::ServerError`] once
    /// `max_retries` retries are used up; [`DriveError::Network`] when the
    /// request could not be sent.
    pub async fn send<F>(&self, category: Category, build: F) -> Result<Response, DriveError>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_retries = self.max_retries();
        let mut attempt: u32 = 0;

        loop {
            if let Some(limiter) = &self.rate_limiter {
                limiter.acquire(category).await;
            }

            let response = build().send().await?;
            let status = response.status();

            if status.is_success() || status == StatusCode::PERMANENT_REDIRECT {
                if let Some(limiter) = &self.rate_limiter {
                    limiter.on_success(category);
                }
                if attempt > 0 {
                    info!(%category, attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }

            let url = response.url().path().to_string();
            let (delay, final_error) = match classify(response).await {
                Outcome::Fatal(err) => {
                    debug!(%category, path = %url, %status, error = %err, "Request failed");
                    return Err(err);
                }
                Outcome::Throttled(retry_after) => {
                    if let Some(limiter) = &self.rate_limiter {
                        limiter.on_throttle(category);
                    }
                    let delay = retry_after.unwrap_or_else(|| backoff_delay(attempt));
                    (delay, DriveError::RateLimited { retry_after: delay })
                }
                Outcome::Transient(retry_after, message) => (
                    retry_after.unwrap_or_else(|| backoff_delay(attempt)),
                    DriveError::ServerError(format!("{status}: {message}")),
                ),
            };

            if attempt >= max_retries {
                warn!(%category, path = %url, attempts = attempt + 1, "Retry limit exhausted");
                return Err(final_error);
            }

            info!(
                %category,
                path = %url,
                %status,
                attempt,
                delay_ms = delay.as_millis(),
                "Backing off before retry"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn retry_after_header(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_retry_after(v, backoff_delay(0)))
}

/// Maps a non-success response to a retry decision or an error
async fn classify(response: Response) -> Outcome {
    let status = response.status();
    let retry_after = retry_after_header(&response);
    let text = response.text().await.unwrap_or_default();
    let body = ErrorBody::parse(&text);

    match status {
        StatusCode::TOO_MANY_REQUESTS => Outcome::Throttled(retry_after),
        StatusCode::FORBIDDEN if body.is_rate_limit() => Outcome::Throttled(retry_after),
        s if s.is_server_error() => Outcome::Transient(retry_after, body.message),
        StatusCode::UNAUTHORIZED => Outcome::Fatal(DriveError::Unauthorized(body.message)),
        StatusCode::FORBIDDEN => Outcome::Fatal(DriveError::Forbidden(body.message)),
        StatusCode::NOT_FOUND => Outcome::Fatal(DriveError::NotFound(body.message)),
        s => Outcome::Fatal(DriveError::BadRequest {
            status: s.as_u16(),
            message: body.message,
        }),
    }
}
