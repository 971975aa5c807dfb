//! gapis Drive - Google Drive v3 REST adapter
//!
//! Provides async client for:
//! - Folder listing (all pages), lookup and name search
//! - Metadata-only creates, multipart and resumable uploads
//! - Streaming downloads and document exports
//! - Link sharing through the permissions API
//!
//! ## Modules
//!
//! - [`auth`] - Access token storage and lookup
//! - [`client`] - Authenticated HTTP client with retry and throttling
//! - [`files`] - `files` and `permissions` resource calls
//! - [`upload`] - Multipart and resumable uploads
//! - [`provider`] - `IRemoteStore` implementation over the above
//! - [`rate_limit`] - Adaptive per-category token buckets

pub mod auth;
pub mod client;
pub mod files;
pub mod provider;
pub mod rate_limit;
pub mod upload;

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when communicating with the Drive API
#[derive(Debug, Error)]
pub enum DriveError {
    /// Authentication credentials are invalid or expired (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested file does not exist or is not visible
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other rejected request (4xx)
    #[error("Bad request ({status}): {message}")]
    BadRequest {
        /// HTTP status code
        status: u16,
        /// Message from the error body
        message: String,
    },

    /// Still throttled after every retry was used
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Delay the service asked for on the last attempt
        retry_after: Duration,
    },

    /// A server-side error persisted after every retry (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The stored access token has expired
    #[error("Access token expired; sign in again")]
    TokenExpired,

    /// No access token in the environment or the token file
    #[error("No access token found (set GAPIS_ACCESS_TOKEN or run `gapis auth login`)")]
    MissingToken,
}
