//! Sampling engine

use chrono::Utc;
use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::selector::{BeatmapPool, DistinctSelector};
use super::{generate_samples, BeatmapFailure, FailedBeatmapPolicy, RunReport, SamplingError, SamplingOptions};
use crate::api::ApiError;
use crate::fetcher::{BeatmapSource, DecodedBeatmap, FetchError};
use crate::metrics;
use crate::oracle::{ModSettings, OracleResult, ScoringOracle};
use crate::shutdown::SharedShutdown;
use crate::{BeatmapId, ResultRecord};

/// Why a single beatmap attempt produced nothing
#[derive(Debug)]
enum BeatmapError {
    /// Item-level failure; the run continues
    Skipped(String),
    /// Credential refresh failed; the run stops
    Auth(String),
    /// Shutdown requested; the run stops
    Cancelled,
}

impl From<FetchError> for BeatmapError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Api(ApiError::Cancelled(_)) => BeatmapError::Cancelled,
            FetchError::Api(ApiError::AuthFailure(message)) => BeatmapError::Auth(message),
            other => BeatmapError::Skipped(other.to_string()),
        }
    }
}

/// Drives fetch, baseline and variant scoring for a run
pub struct SamplingEngine {
    source: Arc<dyn BeatmapSource>,
    oracle: Arc<dyn ScoringOracle>,
    options: SamplingOptions,
    rng: StdRng,
    shutdown: SharedShutdown,
    progress: Option<ProgressBar>,
}

impl SamplingEngine {
    /// Create an engine seeded from OS entropy.
    pub fn new(
        source: Arc<dyn BeatmapSource>,
        oracle: Arc<dyn ScoringOracle>,
        options: SamplingOptions,
        shutdown: SharedShutdown,
    ) -> Self {
        Self {
            source,
            oracle,
            options,
            rng: StdRng::from_entropy(),
            shutdown,
            progress: None,
        }
    }

    /// Use a fixed RNG seed so selection and samples are reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Report per-beatmap progress on `bar`.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Options this engine runs with
    pub fn options(&self) -> &SamplingOptions {
        &self.options
    }

    /// Run `beatmaps_per_run` beatmap attempts against `pool`.
    ///
    /// Per-beatmap failures are logged and recorded in the report. The run
    /// stops early only when the pool has no unselected identifiers left.
    ///
    /// # Errors
    /// [`SamplingError::Auth`] and [`SamplingError::Cancelled`] carry every
    /// record produced before the run stopped.
    pub async fn run(&mut self, pool: &BeatmapPool) -> Result<RunReport, SamplingError> {
        let mut report = RunReport::new(Utc::now());
        let mut selector = DistinctSelector::new();

        info!(
            beatmaps = self.options.beatmaps_per_run,
            samples = self.options.samples_per_beatmap,
            mode = %self.options.mode,
            failed_policy = %self.options.failed_policy,
            pool_size = pool.distinct_len(),
            "Starting sampling run"
        );

        for iteration in 0..self.options.beatmaps_per_run {
            if self.shutdown.is_shutdown_requested() {
                return Err(self.stop_cancelled(report));
            }

            let Some(id) = selector.draw(pool, &mut self.rng) else {
                warn!(
                    iteration,
                    selected = selector.selected().len(),
                    "Beatmap pool exhausted, ending run early"
                );
                break;
            };
            report.selected.push(id);

            match self.process_beatmap(id).await {
                Ok(records) => {
                    info!(beatmap_id = id, records = records.len(), "Beatmap sampled");
                    metrics::record_beatmap_outcome(true);
                    metrics::record_records_emitted(records.len());
                    report.succeeded += 1;
                    report.records.extend(records);
                }
                Err(BeatmapError::Skipped(reason)) => {
                    warn!(beatmap_id = id, error = %reason, "Failed to process beatmap, skipping");
                    metrics::record_beatmap_outcome(false);
                    report.failures.push(BeatmapFailure { id, reason });
                    if self.options.failed_policy == FailedBeatmapPolicy::Retain {
                        selector.release(id);
                    }
                }
                Err(BeatmapError::Auth(message)) => {
                    error!(beatmap_id = id, error = %message, "Credential refresh failed, aborting run");
                    metrics::record_beatmap_outcome(false);
                    report.finished_at = Utc::now();
                    self.finish_progress();
                    return Err(SamplingError::Auth {
                        message,
                        partial: Box::new(report),
                    });
                }
                Err(BeatmapError::Cancelled) => {
                    return Err(self.stop_cancelled(report));
                }
            }

            if let Some(bar) = &self.progress {
                bar.inc(1);
                bar.set_message(format!("{} records", report.records.len()));
            }
        }

        report.finished_at = Utc::now();
        self.finish_progress();
        info!(
            attempted = report.attempted(),
            succeeded = report.succeeded,
            failed = report.failures.len(),
            records = report.records.len(),
            "Sampling run complete"
        );
        Ok(report)
    }

    /// Fetch, score and sample one beatmap. All-or-nothing: a failure after
    /// some samples were scored discards them.
    async fn process_beatmap(&mut self, id: BeatmapId) -> Result<Vec<ResultRecord>, BeatmapError> {
        let beatmap = self.source.fetch(id, &self.shutdown).await?;
        let result = self.score_beatmap(&beatmap).await;
        self.oracle.release(&beatmap).await;
        result
    }

    async fn score_beatmap(&mut self, beatmap: &DecodedBeatmap) -> Result<Vec<ResultRecord>, BeatmapError> {
        let id = beatmap.id;
        let base_difficulty = self.score(self.oracle.baseline(beatmap)).await?;
        debug!(beatmap_id = id, base_difficulty, "Baseline rating computed");

        let samples = generate_samples(self.options.mode, self.options.samples_per_beatmap, &mut self.rng);
        let mut records = Vec::with_capacity(samples.len());

        for sample in samples {
            let mods = ModSettings::new(sample.seed, sample.angle_sharpness);
            let new_difficulty = self.score(self.oracle.evaluate(beatmap, mods)).await?;
            debug!(
                beatmap_id = id,
                seed = mods.seed(),
                angle_sharpness = mods.angle_sharpness(),
                new_difficulty,
                "Variant rating computed"
            );

            records.push(ResultRecord {
                id,
                seed: mods.seed(),
                angle_sharpness: mods.angle_sharpness(),
                base_difficulty,
                new_difficulty,
            });
        }

        Ok(records)
    }

    async fn score<F>(&self, evaluation: F) -> Result<f64, BeatmapError>
    where
        F: Future<Output = OracleResult<f64>>,
    {
        let rating = self
            .shutdown
            .guard(evaluation)
            .await
            .map_err(|_| BeatmapError::Cancelled)?
            .map_err(|e| BeatmapError::Skipped(e.to_string()))?;

        if !rating.is_finite() {
            return Err(BeatmapError::Skipped(format!(
                "calculator returned non-finite rating {rating}"
            )));
        }
        Ok(rating)
    }

    fn stop_cancelled(&self, mut report: RunReport) -> SamplingError {
        warn!(records = report.records.len(), "Sampling run cancelled");
        report.finished_at = Utc::now();
        self.finish_progress();
        SamplingError::Cancelled {
            partial: Box::new(report),
        }
    }

    fn finish_progress(&self) {
        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
    }
}
