//! Client-credentials bearer token cache
//!
//! The manager keeps at most one [`Credential`] and refreshes it through the
//! token endpoint whenever it is missing or inside the expiry safety margin.
//! The whole check-refresh-return sequence runs under a single async lock, so
//! any number of concurrent callers trigger at most one refresh and all of
//! them observe the same token.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::ThrottledSender;
use super::transport::{ApiRequest, HttpMethod};
use super::{ApiError, ApiResult};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;

/// A credential is treated as expired this long before its real expiry.
pub const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// OAuth grant used against the token endpoint
pub const GRANT_TYPE: &str = "client_credentials";

/// Scope requested when none is configured
pub const DEFAULT_SCOPE: &str = "public";

/// Bearer token with an absolute expiry
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    expires_at: Instant,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credential {
    /// Create a credential that expires at `expires_at`.
    pub fn new(access_token: impl Into<String>, expires_at: Instant) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// The opaque token string
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Absolute expiry instant reported by the token endpoint
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// `now <= expires_at - margin`
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now + EXPIRY_SAFETY_MARGIN <= self.expires_at
    }
}

/// Client identity used to obtain tokens
#[derive(Clone)]
pub struct ClientCredentials {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Token endpoint URL
    pub token_url: String,
    /// Requested scope
    pub scope: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    scope: &'a str,
}

/// Token endpoint response body
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token
    pub access_token: String,
    /// Lifetime in seconds, relative to the request
    pub expires_in: u64,
}

/// Shared owner of the current bearer credential
pub struct CredentialManager {
    sender: Arc<ThrottledSender>,
    client: ClientCredentials,
    slot: Mutex<Option<Credential>>,
    refreshes: AtomicU64,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("client", &self.client)
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}

impl CredentialManager {
    /// Create a manager with no cached credential.
    pub fn new(sender: Arc<ThrottledSender>, client: ClientCredentials) -> Self {
        Self {
            sender,
            client,
            slot: Mutex::new(None),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Number of successful refreshes performed so far
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Return a credential that is valid for at least the safety margin,
    /// refreshing it first if needed.
    ///
    /// # Errors
    /// - [`ApiError::AuthFailure`] if the token request fails or its response is malformed
    /// - [`ApiError::Cancelled`] if shutdown fires while waiting
    pub async fn get_valid_credential(
        &self,
        shutdown: &ShutdownCoordinator,
    ) -> ApiResult<Credential> {
        let mut slot = shutdown.guard(self.slot.lock()).await?;

        if let Some(credential) = slot.as_ref() {
            if credential.is_valid_at(Instant::now()) {
                return Ok(credential.clone());
            }
            debug!("Cached credential is inside the expiry margin, refreshing");
        }

        let fresh = self.refresh(shutdown).await?;
        *slot = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the cached credential so the next caller refreshes it.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            warn!("Cached credential invalidated");
        }
    }

    async fn refresh(&self, shutdown: &ShutdownCoordinator) -> ApiResult<Credential> {
        let requested_at = Instant::now();

        let body = serde_json::to_value(TokenRequest {
            client_id: &self.client.client_id,
            client_secret: &self.client.client_secret,
            grant_type: GRANT_TYPE,
            scope: &self.client.scope,
        })
        .map_err(|e| ApiError::AuthFailure(format!("failed to encode token request: {e}")))?;

        let request = ApiRequest::new(HttpMethod::Post, &self.client.token_url, Some(body));
        let raw = self
            .sender
            .execute(request, shutdown)
            .await
            .map_err(|e| match e {
                ApiError::Cancelled(cancelled) => ApiError::Cancelled(cancelled),
                other => ApiError::AuthFailure(other.to_string()),
            })?;

        let token: TokenResponse = serde_json::from_slice(&raw)
            .map_err(|e| ApiError::AuthFailure(format!("malformed token response: {e}")))?;

        let expires_at = requested_at
            .checked_add(Duration::from_secs(token.expires_in))
            .ok_or_else(|| {
                ApiError::AuthFailure(format!(
                    "token lifetime of {} seconds is out of range",
                    token.expires_in
                ))
            })?;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        metrics::record_credential_refresh();
        info!(expires_in_secs = token.expires_in, "Obtained API credential");

        Ok(Credential::new(token.access_token, expires_at))
    }
}
