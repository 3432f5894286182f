//! Difficulty scoring
//!
//! The difficulty calculation is treated as a black box behind
//! [`ScoringOracle`]. The crate ships [`command::CommandOracle`], which runs an
//! external calculator process per evaluation; tests and benchmarks plug in
//! deterministic fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fetcher::DecodedBeatmap;

pub mod command;

pub use command::{CommandOracle, OracleCommandSettings};

/// Lower bound of the angle sharpness setting
pub const MIN_ANGLE_SHARPNESS: f32 = 1.0;
/// Upper bound of the angle sharpness setting
pub const MAX_ANGLE_SHARPNESS: f32 = 10.0;

/// Acronym of the modifier being sampled
pub const RANDOM_MOD_ACRONYM: &str = "RD";

/// Clamp an angle sharpness into `[MIN_ANGLE_SHARPNESS, MAX_ANGLE_SHARPNESS]`.
///
/// NaN collapses to the lower bound.
pub fn clamp_angle_sharpness(value: f32) -> f32 {
    if value.is_nan() {
        return MIN_ANGLE_SHARPNESS;
    }
    value.clamp(MIN_ANGLE_SHARPNESS, MAX_ANGLE_SHARPNESS)
}

/// Settings of the Random modifier for one variant evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModSettings {
    seed: i32,
    angle_sharpness: f32,
}

impl ModSettings {
    /// Build settings; the angle sharpness is clamped into range.
    pub fn new(seed: i32, angle_sharpness: f32) -> Self {
        Self {
            seed,
            angle_sharpness: clamp_angle_sharpness(angle_sharpness),
        }
    }

    /// Random seed
    pub fn seed(&self) -> i32 {
        self.seed
    }

    /// Angle sharpness in `[1, 10]`
    pub fn angle_sharpness(&self) -> f32 {
        self.angle_sharpness
    }
}

/// Scoring failures
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// Calculator could not be started or its I/O failed
    #[error("calculator I/O error: {0}")]
    Io(String),

    /// Calculator exited unsuccessfully
    #[error("calculator exited with {status}: {stderr}")]
    Failed {
        /// Exit status description
        status: String,
        /// Trimmed standard error
        stderr: String,
    },

    /// Calculator did not finish in time
    #[error("calculator timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Output did not contain a rating
    #[error("could not read a star rating from calculator output: {0}")]
    InvalidOutput(String),
}

/// Result type for scoring operations
pub type OracleResult<T> = Result<T, OracleError>;

/// Black-box difficulty calculator
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    /// Star rating without modifiers
    async fn baseline(&self, beatmap: &DecodedBeatmap) -> OracleResult<f64>;

    /// Star rating with the Random modifier applied using `mods`
    async fn evaluate(&self, beatmap: &DecodedBeatmap, mods: ModSettings) -> OracleResult<f64>;

    /// Drop anything held for `beatmap`. Called once the beatmap is finished,
    /// whether or not its evaluations succeeded.
    async fn release(&self, _beatmap: &DecodedBeatmap) {}
}
