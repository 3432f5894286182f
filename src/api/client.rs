//! Rate-limited API client
//!
//! [`ThrottledSender`] owns the admission loop: it takes a lease from the
//! shared [`RateLimiter`], sleeps for the suggested delay (or one second) on a
//! denial, and performs the exchange once a lease is granted. The response
//! status is never retried. [`ApiClient`] layers bearer authentication and the
//! API version header on top.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::credentials::{ClientCredentials, CredentialManager};
use super::rate_limit::{Lease, RateLimiter, DEFAULT_RETRY_AFTER};
use super::transport::{ApiRequest, HttpMethod, HttpTransport};
use super::{ApiError, ApiResult};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;

/// Header carrying the requested API revision
pub const API_VERSION_HEADER: &str = "x-api-version";

/// Longest body excerpt kept in an [`ApiError::HttpFailure`] message
const ERROR_BODY_EXCERPT: usize = 200;

/// Sends requests one at a time through the shared rate limiter
pub struct ThrottledSender {
    transport: Arc<dyn HttpTransport>,
    rate_limiter: Arc<RateLimiter>,
}

impl std::fmt::Debug for ThrottledSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledSender")
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl ThrottledSender {
    /// Create a sender over `transport` that admits requests through `rate_limiter`.
    pub fn new(transport: Arc<dyn HttpTransport>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            transport,
            rate_limiter,
        }
    }

    /// Shared limiter used for admission
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Wait for admission, then perform the request exactly once.
    ///
    /// # Errors
    /// - [`ApiError::HttpFailure`] on any non-2xx status
    /// - [`ApiError::Transport`] on connection failures
    /// - [`ApiError::Cancelled`] if shutdown fires at any wait point
    pub async fn execute(
        &self,
        request: ApiRequest,
        shutdown: &ShutdownCoordinator,
    ) -> ApiResult<Bytes> {
        let mut denials = 0u32;

        loop {
            match self.rate_limiter.acquire(shutdown).await? {
                Lease::Granted => break,
                Lease::Denied { retry_after } => {
                    denials += 1;
                    let wait = retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
                    debug!(
                        url = %request.url,
                        denials,
                        wait_ms = wait.as_millis() as u64,
                        "Admission denied, waiting before retry"
                    );
                    shutdown.guard(tokio::time::sleep(wait)).await?;
                }
            }
        }

        let started = Instant::now();
        let response = shutdown.guard(self.transport.execute(&request)).await?;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                metrics::record_http_request(request.method, None, started.elapsed());
                warn!(method = %request.method, url = %request.url, error = %e, "Request failed");
                return Err(e);
            }
        };
        metrics::record_http_request(request.method, Some(response.status), started.elapsed());

        if !response.is_success() {
            let excerpt: String = String::from_utf8_lossy(&response.body)
                .chars()
                .take(ERROR_BODY_EXCERPT)
                .collect();
            warn!(
                method = %request.method,
                url = %request.url,
                status = response.status,
                "Request returned error status"
            );
            return Err(ApiError::HttpFailure {
                status: response.status,
                message: describe_status(response.status, excerpt.trim()),
            });
        }

        Ok(response.body)
    }
}

fn describe_status(status: u16, excerpt: &str) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("unknown status");
    if excerpt.is_empty() {
        reason.to_string()
    } else {
        format!("{reason}: {excerpt}")
    }
}

/// Authenticated, rate-limited API client
#[derive(Debug)]
pub struct ApiClient {
    sender: Arc<ThrottledSender>,
    credentials: CredentialManager,
    api_version: String,
}

impl ApiClient {
    /// Create a client; the token endpoint shares the same rate limiter.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        rate_limiter: Arc<RateLimiter>,
        client: ClientCredentials,
        api_version: impl Into<String>,
    ) -> Self {
        let sender = Arc::new(ThrottledSender::new(transport, rate_limiter));
        let credentials = CredentialManager::new(sender.clone(), client);
        Self {
            sender,
            credentials,
            api_version: api_version.into(),
        }
    }

    /// Credential cache backing this client
    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    /// Rate limiter shared by every request of this client
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.sender.rate_limiter()
    }

    /// Send one request.
    ///
    /// Unless `is_auth_request` is set, a valid bearer credential and the API
    /// version header are attached first. A 401 answer drops the cached
    /// credential so the next request starts with a fresh one; the failure
    /// itself is still returned.
    pub async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<serde_json::Value>,
        is_auth_request: bool,
        shutdown: &ShutdownCoordinator,
    ) -> ApiResult<Bytes> {
        let mut request = ApiRequest::new(method, url, body);

        if !is_auth_request {
            let credential = self.credentials.get_valid_credential(shutdown).await?;
            request = request
                .with_header("Authorization", credential.bearer())
                .with_header(API_VERSION_HEADER, self.api_version.as_str());
        }

        let result = self.sender.execute(request, shutdown).await;
        if !is_auth_request && matches!(result, Err(ApiError::HttpFailure { status: 401, .. })) {
            self.credentials.invalidate().await;
        }
        result
    }

    /// Authenticated GET
    pub async fn get(&self, url: &str, shutdown: &ShutdownCoordinator) -> ApiResult<Bytes> {
        self.send(HttpMethod::Get, url, None, false, shutdown).await
    }
}
