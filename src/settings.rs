//! Run configuration
//!
//! A run is described by a JSON document with PascalCase keys:
//!
//! ```json
//! {
//!   "BeatmapIdsPath": "beatmap_ids.json",
//!   "OutputPath": "output/random_mod.csv",
//!   "ApiId": 12345,
//!   "ApiSecret": "...",
//!   "ApiTokenUrl": "https://osu.ppy.sh/oauth/token",
//!   "ApiVersion": "20240101",
//!   "BeatmapsPerRun": 100,
//!   "SeedsPerBeatmap": 100,
//!   "OracleCommand": { "Program": "osu-difficulty" }
//! }
//! ```
//!
//! `ApiId` and `ApiVersion` may be written as strings or numbers.

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{ClientCredentials, RateLimiterOptions, DEFAULT_SCOPE};
use crate::fetcher::{DEFAULT_BEATMAP_URL_TEMPLATE, ID_PLACEHOLDER};
use crate::oracle::OracleCommandSettings;
use crate::sampling::{
    FailedBeatmapPolicy, SamplingMode, SamplingOptions, DEFAULT_BEATMAPS_PER_RUN,
    DEFAULT_SAMPLES_PER_BEATMAP,
};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {}: {message}", .path.display())]
    Read {
        /// Config file
        path: PathBuf,
        /// Cause
        message: String,
    },

    /// File is not a valid configuration document
    #[error("failed to parse config {}: {message}", .path.display())]
    Parse {
        /// Config file
        path: PathBuf,
        /// Cause
        message: String,
    },

    /// A value is missing or out of range
    #[error("invalid config value for {key}: {message}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// What is wrong with it
        message: String,
    },
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Integer(value) => value.to_string(),
    })
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_beatmaps_per_run() -> usize {
    DEFAULT_BEATMAPS_PER_RUN
}

fn default_seeds_per_beatmap() -> usize {
    DEFAULT_SAMPLES_PER_BEATMAP
}

fn default_url_template() -> String {
    DEFAULT_BEATMAP_URL_TEMPLATE.to_string()
}

/// Token bucket settings as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RateLimitSettings {
    /// Bucket capacity
    pub token_limit: u32,
    /// Tokens added per period
    pub tokens_per_period: u32,
    /// Period length in milliseconds
    pub replenishment_period_ms: u64,
    /// Maximum queued waiters
    pub queue_limit: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let options = RateLimiterOptions::default();
        Self {
            token_limit: options.token_limit,
            tokens_per_period: options.tokens_per_period,
            replenishment_period_ms: options.replenishment_period.as_millis() as u64,
            queue_limit: options.queue_limit,
        }
    }
}

impl From<&RateLimitSettings> for RateLimiterOptions {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            token_limit: settings.token_limit,
            tokens_per_period: settings.tokens_per_period,
            replenishment_period: Duration::from_millis(settings.replenishment_period_ms),
            queue_limit: settings.queue_limit,
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunConfig {
    /// JSON array of candidate beatmap ids
    pub beatmap_ids_path: PathBuf,
    /// CSV destination
    pub output_path: PathBuf,
    /// OAuth client id
    #[serde(deserialize_with = "string_or_number")]
    pub api_id: String,
    /// OAuth client secret
    pub api_secret: String,
    /// OAuth token endpoint
    pub api_token_url: String,
    /// Value of the `x-api-version` header
    #[serde(deserialize_with = "string_or_number")]
    pub api_version: String,
    /// OAuth scope
    #[serde(default = "default_scope")]
    pub api_scope: String,
    /// Beatmap attempts per run
    #[serde(default = "default_beatmaps_per_run")]
    pub beatmaps_per_run: usize,
    /// Samples per successful beatmap
    #[serde(default = "default_seeds_per_beatmap")]
    pub seeds_per_beatmap: usize,
    /// Angle sharpness generation
    #[serde(default)]
    pub sampling_mode: SamplingMode,
    /// Treatment of failed beatmaps
    #[serde(default)]
    pub failed_beatmap_policy: FailedBeatmapPolicy,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub rng_seed: Option<u64>,
    /// Beatmap download URL containing `{id}`
    #[serde(default = "default_url_template")]
    pub beatmap_url_template: String,
    /// API rate limit
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// External difficulty calculator
    #[serde(default)]
    pub oracle_command: Option<OracleCommandSettings>,
}

impl RunConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parse a configuration document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })
    }

    /// Check every value a run depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_id.trim().is_empty() {
            return Err(invalid("ApiId", "must not be empty"));
        }
        if self.api_secret.trim().is_empty() {
            return Err(invalid("ApiSecret", "must not be empty"));
        }
        if !self.api_token_url.starts_with("http://") && !self.api_token_url.starts_with("https://") {
            return Err(invalid(
                "ApiTokenUrl",
                format!("expected an http(s) URL, got '{}'", self.api_token_url),
            ));
        }
        if self.api_version.trim().is_empty() {
            return Err(invalid("ApiVersion", "must not be empty"));
        }
        if self.beatmaps_per_run == 0 {
            return Err(invalid("BeatmapsPerRun", "must be at least 1"));
        }
        if self.seeds_per_beatmap == 0 {
            return Err(invalid("SeedsPerBeatmap", "must be at least 1"));
        }
        if !self.beatmap_url_template.contains(ID_PLACEHOLDER) {
            return Err(invalid(
                "BeatmapUrlTemplate",
                format!("must contain {ID_PLACEHOLDER}"),
            ));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(invalid("OutputPath", "must not be empty"));
        }
        RateLimiterOptions::from(&self.rate_limit)
            .validate()
            .map_err(|e| invalid("RateLimit", e.to_string()))?;
        if let Some(oracle) = &self.oracle_command {
            if oracle.program.trim().is_empty() {
                return Err(invalid("OracleCommand.Program", "must not be empty"));
            }
            if oracle.timeout_secs == 0 {
                return Err(invalid("OracleCommand.TimeoutSecs", "must be at least 1"));
            }
        }
        Ok(())
    }

    /// Limiter options for the API client
    pub fn rate_limiter_options(&self) -> RateLimiterOptions {
        RateLimiterOptions::from(&self.rate_limit)
    }

    /// Client identity for the token endpoint
    pub fn client_credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.api_id.clone(),
            client_secret: self.api_secret.clone(),
            token_url: self.api_token_url.clone(),
            scope: self.api_scope.clone(),
        }
    }

    /// Shape of the sampling run
    pub fn sampling_options(&self) -> SamplingOptions {
        SamplingOptions {
            beatmaps_per_run: self.beatmaps_per_run,
            samples_per_beatmap: self.seeds_per_beatmap,
            mode: self.sampling_mode,
            failed_policy: self.failed_beatmap_policy,
        }
    }
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.into(),
    }
}
