//! Error types for Waymark operations.
//!
//! [`WaymarkError`] covers everything that can stop a domain from being
//! processed. [`FetchError`] is the failure of a single resilient HTTP fetch
//! after its retries are exhausted; it is carried inside
//! [`WaymarkError::Fetch`] when it escalates, or rendered into a snapshot's
//! `error` field when it does not.
//!
//! # Example
//!
//! ```rust
//! use waymark_core::{WaymarkError, Result};
//!
//! fn require_domains(domains: &[String]) -> Result<()> {
//!     if domains.is_empty() {
//!         return Err(WaymarkError::InvalidRequest("no domains supplied".to_string()));
//!     }
//!     Ok(())
//! }
//! # assert!(require_domains(&[]).is_err());
//! ```

use thiserror::Error;

/// Maximum number of response body characters kept in an HTTP status error.
pub const STATUS_BODY_LIMIT: usize = 200;

/// Main error type for the snapshot pipeline.
#[derive(Error, Debug)]
pub enum WaymarkError {
    /// HTTP client construction errors from reqwest.
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// An upstream fetch failed after all retries.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Invalid URL provided or produced.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The index API answered with something that is not the expected table.
    ///
    /// Returned when the header row does not match the requested field list
    /// or when a row has the wrong number of columns.
    #[error("Malformed index response: {0}")]
    IndexFormat(String),

    /// A batch request failed validation before any network call was made.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// HTML parsing errors, usually an invalid CSS selector.
    #[error("Failed to parse HTML: {0}")]
    HtmlParseError(String),

    /// JSON encoding of an event or response failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The external classifier could not be reached or answered garbage.
    ///
    /// This never reaches a batch caller; the processor logs and drops it.
    #[error("Classifier error: {0}")]
    Classifier(String),
}

/// Why a fetch ultimately failed.
#[derive(Error, Debug)]
pub enum FetchCause {
    /// Connection failure, DNS failure, timeout or a body read error.
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl FetchCause {
    /// Builds a status cause, truncating the body to [`STATUS_BODY_LIMIT`] characters.
    pub fn status(status: u16, body: &str) -> Self {
        let body = body.chars().take(STATUS_BODY_LIMIT).collect();
        Self::Status { status, body }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Transport errors, 429 and every 5xx are retryable; any other status is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
        }
    }

    /// HTTP status code, if the failure was a status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }
}

/// A fetch that failed after exhausting its retry budget.
#[derive(Error, Debug)]
#[error("Fetch of {url} failed: {cause}")]
pub struct FetchError {
    /// The URL that was requested.
    pub url: String,
    /// The last failure observed.
    #[source]
    pub cause: FetchCause,
}

/// Result type alias for WaymarkError.
pub type Result<T> = std::result::Result<T, WaymarkError>;
