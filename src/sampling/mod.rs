//! Sampling loop
//!
//! The [`engine::SamplingEngine`] picks distinct beatmaps from a
//! [`selector::BeatmapPool`], scores each one without modifiers, then scores
//! `samples_per_beatmap` Random-mod variants of it. Every beatmap attempt
//! yields a `Result`; failures are logged and skipped, except authentication
//! failures and cancellation, which end the run.
//!
//! Two behaviours are configurable:
//!
//! - [`SamplingMode`]: angle sharpness drawn uniformly or swept evenly across `[1, 10]`
//! - [`FailedBeatmapPolicy`]: whether a beatmap that failed may be drawn again later in the run

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::oracle::{MAX_ANGLE_SHARPNESS, MIN_ANGLE_SHARPNESS};
use crate::{BeatmapId, ResultRecord, SampleSpec};

pub mod engine;
pub mod selector;

pub use engine::SamplingEngine;
pub use selector::{BeatmapPool, DistinctSelector};

/// Default number of beatmaps attempted per run
pub const DEFAULT_BEATMAPS_PER_RUN: usize = 100;
/// Default number of variant samples per beatmap
pub const DEFAULT_SAMPLES_PER_BEATMAP: usize = 100;

/// How angle sharpness values are chosen for a beatmap's samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SamplingMode {
    /// Each sample draws independently and uniformly from `[1, 10]`
    #[default]
    Uniform,
    /// Samples are spaced evenly from 1 to 10 inclusive
    Sweep,
}

impl FromStr for SamplingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uniform" => Ok(SamplingMode::Uniform),
            "sweep" => Ok(SamplingMode::Sweep),
            _ => Err(format!(
                "Invalid sampling mode: {s}. Valid options: uniform, sweep"
            )),
        }
    }
}

impl std::fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingMode::Uniform => write!(f, "uniform"),
            SamplingMode::Sweep => write!(f, "sweep"),
        }
    }
}

/// What happens to a beatmap whose processing failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailedBeatmapPolicy {
    /// A failed beatmap stays selected and is never drawn again this run
    #[default]
    Exclude,
    /// A failed beatmap returns to the pool and may be drawn again
    Retain,
}

impl FromStr for FailedBeatmapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exclude" => Ok(FailedBeatmapPolicy::Exclude),
            "retain" => Ok(FailedBeatmapPolicy::Retain),
            _ => Err(format!(
                "Invalid failed beatmap policy: {s}. Valid options: exclude, retain"
            )),
        }
    }
}

impl std::fmt::Display for FailedBeatmapPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailedBeatmapPolicy::Exclude => write!(f, "exclude"),
            FailedBeatmapPolicy::Retain => write!(f, "retain"),
        }
    }
}

/// Shape of one sampling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingOptions {
    /// Beatmap attempts (top-level iterations)
    pub beatmaps_per_run: usize,
    /// Variant samples per successful beatmap
    pub samples_per_beatmap: usize,
    /// Angle sharpness generation
    pub mode: SamplingMode,
    /// Treatment of failed beatmaps
    pub failed_policy: FailedBeatmapPolicy,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            beatmaps_per_run: DEFAULT_BEATMAPS_PER_RUN,
            samples_per_beatmap: DEFAULT_SAMPLES_PER_BEATMAP,
            mode: SamplingMode::default(),
            failed_policy: FailedBeatmapPolicy::default(),
        }
    }
}

/// Generate the samples for one beatmap.
///
/// Seeds cover the full `i32` range. Angle sharpness depends on `mode`.
/// A sweep of one sample uses the lower bound.
pub fn generate_samples<R: Rng + ?Sized>(mode: SamplingMode, count: usize, rng: &mut R) -> Vec<SampleSpec> {
    (0..count)
        .map(|index| {
            let seed = rng.gen::<i32>();
            let angle_sharpness = match mode {
                SamplingMode::Uniform => rng.gen_range(MIN_ANGLE_SHARPNESS..=MAX_ANGLE_SHARPNESS),
                SamplingMode::Sweep => sweep_value(index, count),
            };
            SampleSpec::new(seed, angle_sharpness)
        })
        .collect()
}

fn sweep_value(index: usize, count: usize) -> f32 {
    if count <= 1 {
        return MIN_ANGLE_SHARPNESS;
    }
    let fraction = index as f32 / (count - 1) as f32;
    MIN_ANGLE_SHARPNESS + (MAX_ANGLE_SHARPNESS - MIN_ANGLE_SHARPNESS) * fraction
}

/// A beatmap that produced no records, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeatmapFailure {
    /// Beatmap identifier
    pub id: BeatmapId,
    /// Error message
    pub reason: String,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Records in generation order
    pub records: Vec<ResultRecord>,
    /// Identifiers selected, in draw order
    pub selected: Vec<BeatmapId>,
    /// Beatmaps that contributed records
    pub succeeded: usize,
    /// Beatmaps skipped because of an error
    pub failures: Vec<BeatmapFailure>,
    /// Run start (UTC)
    pub started_at: DateTime<Utc>,
    /// Run end (UTC)
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            records: Vec::new(),
            selected: Vec::new(),
            succeeded: 0,
            failures: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    /// Beatmap attempts made
    pub fn attempted(&self) -> usize {
        self.selected.len()
    }

    /// Wall-clock duration of the run
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Sampling errors that end a run
#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    /// Candidate pool could not be loaded
    #[error("failed to load beatmap pool from {}: {message}", .path.display())]
    Pool {
        /// Pool file
        path: PathBuf,
        /// Cause
        message: String,
    },

    /// Credential refresh failed; nothing else can succeed
    #[error("authentication failed after {} records: {message}", .partial.records.len())]
    Auth {
        /// Cause
        message: String,
        /// Work completed before the failure
        partial: Box<RunReport>,
    },

    /// Shutdown requested
    #[error("run cancelled after {} records", .partial.records.len())]
    Cancelled {
        /// Work completed before cancellation
        partial: Box<RunReport>,
    },
}

impl SamplingError {
    /// Records collected before the run stopped, if any
    pub fn into_partial(self) -> Option<RunReport> {
        match self {
            SamplingError::Pool { .. } => None,
            SamplingError::Auth { partial, .. } | SamplingError::Cancelled { partial } => {
                Some(*partial)
            }
        }
    }
}
