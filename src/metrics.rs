//! Run metrics
//!
//! Counters and histograms for API traffic, rate limiter admission, credential
//! refreshes and sampling outcomes, recorded through the `metrics` facade.
//! Without an installed recorder every call is a no-op; [`init_metrics`]
//! installs a Prometheus exporter with a scrape endpoint.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

use crate::api::HttpMethod;

static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

/// Metrics initialization errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}

/// Install the Prometheus exporter listening on `addr`.
///
/// Idempotent: later calls after a successful install are ignored. Must be
/// called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_INITIALIZED.get() {
        debug!(%existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_counter!(
        "api_requests_total",
        Unit::Count,
        "HTTP exchanges performed against the API, labelled by method and status"
    );
    describe_histogram!(
        "api_request_duration_seconds",
        Unit::Seconds,
        "Duration of a single HTTP exchange"
    );
    describe_counter!(
        "rate_limit_denied_total",
        Unit::Count,
        "Admission attempts denied because the wait queue was full"
    );
    describe_histogram!(
        "rate_limit_queue_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a rate limit token"
    );
    describe_counter!(
        "credential_refreshes_total",
        Unit::Count,
        "Bearer credentials obtained from the token endpoint"
    );
    describe_counter!(
        "beatmaps_processed_total",
        Unit::Count,
        "Beatmap attempts, labelled by outcome"
    );
    describe_counter!(
        "records_emitted_total",
        Unit::Count,
        "Result records produced by the sampling loop"
    );

    let _ = METRICS_INITIALIZED.set(addr);
    info!(%addr, "Prometheus metrics endpoint listening");
    Ok(())
}

/// Whether a Prometheus exporter has been installed
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.get().is_some()
}

/// Record one completed (or failed, with `status == None`) HTTP exchange.
pub fn record_http_request(method: HttpMethod, status: Option<u16>, duration: Duration) {
    let status = status.map_or_else(|| "network_error".to_string(), |code| code.to_string());
    counter!(
        "api_requests_total",
        "method" => method.to_string(),
        "status" => status,
    )
    .increment(1);
    histogram!("api_request_duration_seconds").record(duration.as_secs_f64());
}

/// Record a granted admission and how long the caller waited for it.
pub fn record_admission_granted(waited: Duration) {
    histogram!("rate_limit_queue_wait_seconds").record(waited.as_secs_f64());
}

/// Record an admission denied by a full queue.
pub fn record_admission_denied() {
    counter!("rate_limit_denied_total").increment(1);
}

/// Record a successful credential refresh.
pub fn record_credential_refresh() {
    counter!("credential_refreshes_total").increment(1);
}

/// Record the outcome of one beatmap attempt.
pub fn record_beatmap_outcome(succeeded: bool) {
    let outcome = if succeeded { "succeeded" } else { "failed" };
    counter!("beatmaps_processed_total", "outcome" => outcome).increment(1);
}

/// Record result records appended to the run.
pub fn record_records_emitted(count: usize) {
    counter!("records_emitted_total").increment(count as u64);
}
