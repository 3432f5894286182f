//! Run command implementation

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{Cli, CliError};
use crate::api::{ApiClient, RateLimiter, ReqwestTransport};
use crate::fetcher::{BeatmapFetcher, OsuFileDecoder};
use crate::metrics;
use crate::oracle::CommandOracle;
use crate::output::export_records;
use crate::sampling::{BeatmapPool, FailedBeatmapPolicy, RunReport, SamplingEngine, SamplingMode};
use crate::settings::RunConfig;
use crate::shutdown::SharedShutdown;

/// Run a sampling session
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Configuration file
    #[arg(long, short, default_value = "appconfig.json", env = "RANDOM_MOD_CONFIG")]
    pub config: PathBuf,

    /// Override BeatmapsPerRun
    #[arg(long)]
    pub beatmaps: Option<usize>,

    /// Override SeedsPerBeatmap
    #[arg(long)]
    pub samples: Option<usize>,

    /// Override SamplingMode (uniform, sweep)
    #[arg(long)]
    pub sampling_mode: Option<SamplingMode>,

    /// Override FailedBeatmapPolicy (exclude, retain)
    #[arg(long)]
    pub failed_policy: Option<FailedBeatmapPolicy>,

    /// Fixed RNG seed for a reproducible run
    #[arg(long)]
    pub rng_seed: Option<u64>,

    /// Override OutputPath
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl RunCommand {
    /// Load the config file and apply command line overrides.
    pub fn resolve_config(&self) -> Result<RunConfig, CliError> {
        let mut config = RunConfig::load(&self.config)?;

        if let Some(beatmaps) = self.beatmaps {
            config.beatmaps_per_run = beatmaps;
        }
        if let Some(samples) = self.samples {
            config.seeds_per_beatmap = samples;
        }
        if let Some(mode) = self.sampling_mode {
            config.sampling_mode = mode;
        }
        if let Some(policy) = self.failed_policy {
            config.failed_beatmap_policy = policy;
        }
        if self.rng_seed.is_some() {
            config.rng_seed = self.rng_seed;
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Execute the run command.
    ///
    /// Records collected before an authentication failure or cancellation are
    /// still exported; the command then fails with [`CliError::RunAborted`].
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = self.resolve_config()?;

        if let Some(addr) = cli.metrics_addr {
            metrics::init_metrics(addr)?;
            info!(%addr, "Metrics endpoint listening");
        }

        let oracle_settings = config.oracle_command.clone().ok_or_else(|| {
            CliError::ConfigurationError(
                "OracleCommand is required to compute star ratings".to_string(),
            )
        })?;

        let pool = BeatmapPool::load(&config.beatmap_ids_path)?;
        if pool.is_empty() {
            warn!(path = %config.beatmap_ids_path.display(), "Beatmap pool is empty");
        }
        info!(
            candidates = pool.len(),
            distinct = pool.distinct_len(),
            "Loaded beatmap pool"
        );

        let transport = Arc::new(ReqwestTransport::new()?);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limiter_options())?);
        let client = Arc::new(ApiClient::new(
            transport,
            rate_limiter,
            config.client_credentials(),
            config.api_version.clone(),
        ));
        let fetcher = BeatmapFetcher::new(client, Arc::new(OsuFileDecoder::default()))
            .with_url_template(config.beatmap_url_template.clone());
        let oracle = CommandOracle::new(oracle_settings)?;

        let mut engine = SamplingEngine::new(
            Arc::new(fetcher),
            Arc::new(oracle),
            config.sampling_options(),
            shutdown,
        );
        if let Some(seed) = config.rng_seed {
            engine = engine.with_rng_seed(seed);
        }
        if !cli.quiet {
            engine = engine.with_progress(create_progress_bar(config.beatmaps_per_run as u64));
        }

        match engine.run(&pool).await {
            Ok(report) => {
                export_report(&config.output_path, &report)?;
                print_summary(&report, &config.output_path);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "Sampling run stopped early");
                if let Some(partial) = e.into_partial() {
                    export_report(&config.output_path, &partial)?;
                    print_summary(&partial, &config.output_path);
                }
                Err(CliError::RunAborted(message))
            }
        }
    }
}

fn export_report(path: &Path, report: &RunReport) -> Result<(), CliError> {
    let written = export_records(path, &report.records)?;
    info!(records = written, path = %path.display(), "Imported all data");
    Ok(())
}

fn print_summary(report: &RunReport, output: &Path) {
    println!("Run summary:");
    println!("  Beatmaps attempted: {}", report.attempted());
    println!("  Beatmaps succeeded: {}", report.succeeded);
    println!("  Beatmaps failed: {}", report.failures.len());
    println!("  Records written: {}", report.records.len());
    println!("  Elapsed: {}s", report.elapsed().num_seconds());
    println!("  Output: {}", output.display());
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message("Sampling beatmaps");
    pb
}
