//! CLI command implementations

use clap::{Parser, Subcommand};
use std::net::SocketAddr;

pub mod error;
pub mod run;
pub mod validate;

pub use error::CliError;
pub use run::RunCommand;
pub use validate::ValidateCommand;

/// Collect Random-mod star rating samples for osu! beatmaps
#[derive(Parser, Debug)]
#[command(name = "random-mod-collector")]
#[command(about = "Collect Random-mod star rating samples for osu! beatmaps", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,

    /// Hide the progress bar
    #[arg(long, global = true, default_value_t = false)]
    pub quiet: bool,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true, env = "RANDOM_MOD_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a sampling session and export the records as CSV
    Run(RunCommand),
    /// Check a configuration file and its beatmap pool without touching the network
    Validate(ValidateCommand),
}
