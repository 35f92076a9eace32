//! CLI interface for scoreline
//!
//! Provides subcommands for:
//! - `run`: Paper trade live events
//! - `replay`: Run the engine over recorded samples
//! - `config`: Validate and print the effective configuration
//! - `fees`: Fee and break-even figures for a price

mod fees;
mod replay;
mod run;

pub use fees::FeesArgs;
pub use replay::ReplayArgs;
pub use run::RunArgs;

use crate::config::{Config, DataConfig};
use crate::data::{DataRecorder, NullSink, PersistenceSink};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "scoreline")]
#[command(about = "Paper-trading engine for live sports outcome markets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Paper trade the configured events
    Run(RunArgs),
    /// Replay recorded samples through the engine
    Replay(ReplayArgs),
    /// Show the effective configuration
    Config,
    /// Fee, round trip and break-even move for a price
    Fees(FeesArgs),
}

/// Print the validated configuration as TOML
pub fn print_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Recorder when capture is enabled, otherwise a sink that drops everything
fn build_sink(config: &DataConfig) -> Arc<dyn PersistenceSink> {
    if config.capture_enabled {
        tracing::info!(output_dir = ?config.output_dir, "Recording session to Parquet");
        Arc::new(DataRecorder::new(config.clone()))
    } else {
        Arc::new(NullSink)
    }
}

/// Cancel on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, finishing current tick");
            token.cancel();
        }
    });
    cancel
}
