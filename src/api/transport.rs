//! HTTP transport seam
//!
//! [`HttpTransport`] executes exactly one HTTP exchange and reports the raw
//! status and body. Everything above it (admission control, credentials,
//! status interpretation) lives in [`super::client`], which keeps the network
//! replaceable by an in-memory fake in tests.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{ApiError, ApiResult};

/// HTTP connect timeout - time to establish the TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout - overall time for the entire exchange
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 60;

/// HTTP verbs used against the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// One outbound request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP verb
    pub method: HttpMethod,
    /// Absolute URL
    pub url: String,
    /// Extra headers, applied in order
    pub headers: Vec<(String, String)>,
    /// Optional JSON body
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Create a request with no headers.
    pub fn new(method: HttpMethod, url: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Raw response as seen on the wire
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Full response body
    pub body: Bytes,
}

impl ApiResponse {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes a single HTTP exchange.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request` once and return whatever came back.
    ///
    /// Only connection-level problems are errors here; HTTP error statuses
    /// are returned as a normal [`ApiResponse`].
    async fn execute(&self, request: &ApiRequest) -> ApiResult<ApiResponse>;
}

/// [`HttpTransport`] backed by a pooled `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport with explicit connect and request timeouts.
    pub fn new() -> ApiResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("random-mod-collector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status().as_u16();

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ApiError::Transport(format!("body read failed: {e}")))?;
            body.extend_from_slice(&chunk);
        }

        debug!(
            method = %request.method,
            url = %request.url,
            status,
            bytes = body.len(),
            "HTTP exchange completed"
        );

        Ok(ApiResponse {
            status,
            body: body.freeze(),
        })
    }
}
