//! # Random Mod Collector Library
//!
//! Collects star-rating samples for osu! beatmaps under the Random modifier.
//! Beatmaps are downloaded through a rate-limited, authenticated osu! API
//! client, scored once without modifiers and then scored repeatedly with
//! randomized Random-mod settings. Every sample becomes a [`ResultRecord`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use random_mod_collector::settings::RunConfig;
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::load(Path::new("appconfig.json"))?;
//! config.validate()?;
//! println!("{} beatmaps x {} samples", config.beatmaps_per_run, config.seeds_per_beatmap);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`api`] - token bucket rate limiter, OAuth client-credentials and the authenticated client
//! - [`fetcher`] - beatmap download and `.osu` decoding
//! - [`oracle`] - black-box difficulty calculation
//! - [`sampling`] - distinct beatmap selection and the sampling loop
//! - [`output`] - CSV export of collected records
//! - [`settings`] - JSON run configuration
//! - [`cli`] - command line front end
//! - [`metrics`] - Prometheus metrics
//! - [`shutdown`] - cooperative cancellation

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// osu! API access
pub mod api;

/// CLI command implementations
pub mod cli;

/// Beatmap fetching and decoding
pub mod fetcher;

/// Metrics collection
pub mod metrics;

/// Difficulty scoring
pub mod oracle;

/// Record output writers
pub mod output;

/// Sampling loop
pub mod sampling;

/// Run configuration
pub mod settings;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use sampling::{SamplingEngine, SamplingError};
pub use settings::RunConfig;

/// Integer beatmap identifier as used by the osu! API
pub type BeatmapId = u32;

/// Random-mod settings for one variant evaluation, before clamping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleSpec {
    /// Random seed, any `i32`
    pub seed: i32,
    /// Angle sharpness, expected in `[1, 10]`
    pub angle_sharpness: f32,
}

impl SampleSpec {
    /// Create a sample specification
    pub fn new(seed: i32, angle_sharpness: f32) -> Self {
        Self {
            seed,
            angle_sharpness,
        }
    }
}

/// One collected sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Beatmap identifier
    pub id: BeatmapId,
    /// Random seed used
    pub seed: i32,
    /// Angle sharpness used
    pub angle_sharpness: f32,
    /// Star rating without modifiers
    pub base_difficulty: f64,
    /// Star rating with the Random modifier
    pub new_difficulty: f64,
}

impl ResultRecord {
    /// Validate record integrity
    pub fn validate(&self) -> Result<(), String> {
        if !(oracle::MIN_ANGLE_SHARPNESS..=oracle::MAX_ANGLE_SHARPNESS).contains(&self.angle_sharpness) {
            return Err(format!(
                "Angle sharpness must be within [{}, {}], got {}",
                oracle::MIN_ANGLE_SHARPNESS,
                oracle::MAX_ANGLE_SHARPNESS,
                self.angle_sharpness
            ));
        }

        if !self.base_difficulty.is_finite() || !self.new_difficulty.is_finite() {
            return Err(format!(
                "Difficulties must be finite, got base {} and new {}",
                self.base_difficulty, self.new_difficulty
            ));
        }

        Ok(())
    }
}
