//! CLI error types and conversions

use crate::api::{ApiError, RateLimitError};
use crate::metrics::MetricsError;
use crate::oracle::OracleError;
use crate::output::OutputError;
use crate::sampling::SamplingError;
use crate::settings::ConfigError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration file error
    #[error("config error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Rate limiter setup error
    #[error("rate limit error: {0}")]
    RateLimitError(#[from] RateLimitError),

    /// API client setup error
    #[error("api error: {0}")]
    ApiError(#[from] ApiError),

    /// Calculator setup error
    #[error("calculator error: {0}")]
    OracleError(#[from] OracleError),

    /// Sampling error
    #[error("sampling error: {0}")]
    SamplingError(#[from] SamplingError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Run stopped before completing its attempts; partial output was exported
    #[error("run aborted: {0}")]
    RunAborted(String),

    /// Configuration is valid but cannot drive this command
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
