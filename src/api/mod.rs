//! Rate-limited, authenticated access to the beatmap API
//!
//! Requests flow through three layers:
//!
//! 1. [`client::ApiClient`] attaches a bearer credential from the
//!    [`credentials::CredentialManager`] together with the API version header.
//! 2. [`client::ThrottledSender`] waits for a [`rate_limit::RateLimiter`] lease,
//!    sleeping on denials, then performs the exchange exactly once.
//! 3. [`transport::HttpTransport`] does the actual network I/O.
//!
//! Only admission is retried. An HTTP error status ends the request at once so
//! the caller can decide whether to skip the work item.

pub mod client;
pub mod credentials;
pub mod rate_limit;
pub mod transport;

pub use client::{ApiClient, ThrottledSender};
pub use credentials::{ClientCredentials, Credential, CredentialManager, DEFAULT_SCOPE};
pub use rate_limit::{Lease, RateLimitError, RateLimiter, RateLimiterOptions};
pub use transport::{ApiRequest, ApiResponse, HttpMethod, HttpTransport, ReqwestTransport};

use crate::shutdown::Cancelled;

/// API access errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Credential refresh failed; no authenticated call can succeed afterwards
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Server answered with a non-success status
    #[error("HTTP error {status}: {message}")]
    HttpFailure {
        /// HTTP status code
        status: u16,
        /// Short description (reason phrase or body excerpt)
        message: String,
    },

    /// Connection-level failure (DNS, TLS, timeout, reset)
    #[error("network error: {0}")]
    Transport(String),

    /// Shutdown requested while waiting
    #[error("request cancelled")]
    Cancelled(#[from] Cancelled),
}

impl ApiError {
    /// Whether this error makes every further authenticated request pointless
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::AuthFailure(_) | ApiError::Cancelled(_))
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpFailure { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
