//! Validation subcommand

use clap::Args;
use std::path::PathBuf;

use super::CliError;
use crate::sampling::BeatmapPool;
use crate::settings::RunConfig;

/// Check a configuration file and the beatmap pool it points to
#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Configuration file
    #[arg(long, short, default_value = "appconfig.json", env = "RANDOM_MOD_CONFIG")]
    pub config: PathBuf,
}

impl ValidateCommand {
    /// Execute the validation command
    pub async fn execute(&self) -> Result<(), CliError> {
        let config = RunConfig::load(&self.config)?;
        config.validate()?;

        let pool = BeatmapPool::load(&config.beatmap_ids_path)?;

        println!("Valid configuration: {}", self.config.display());
        println!(
            "  Beatmap pool: {} ({} ids, {} distinct)",
            config.beatmap_ids_path.display(),
            pool.len(),
            pool.distinct_len()
        );
        println!(
            "  Run shape: {} beatmaps x {} samples ({}, failed beatmaps: {})",
            config.beatmaps_per_run,
            config.seeds_per_beatmap,
            config.sampling_mode,
            config.failed_beatmap_policy
        );
        println!(
            "  Rate limit: {} token(s), +{} every {}ms, queue {}",
            config.rate_limit.token_limit,
            config.rate_limit.tokens_per_period,
            config.rate_limit.replenishment_period_ms,
            config.rate_limit.queue_limit
        );
        println!("  Output: {}", config.output_path.display());

        if pool.distinct_len() < config.beatmaps_per_run {
            println!(
                "  Warning: pool has {} distinct ids, run will stop after at most that many beatmaps",
                pool.distinct_len()
            );
        }

        match &config.oracle_command {
            Some(oracle) => println!("  Calculator: {}", oracle.program),
            None => {
                println!("  Calculator: not configured");
                return Err(CliError::ConfigurationError(
                    "OracleCommand is required to compute star ratings".to_string(),
                ));
            }
        }

        Ok(())
    }
}
