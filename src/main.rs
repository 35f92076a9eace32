use anyhow::Context;
use clap::Parser;
use scoreline::cli::{print_config, Cli, Commands};
use scoreline::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Invalid configuration is fatal before anything starts
    let config = Config::load(&cli.config)
        .with_context(|| format!("Could not load config from {}", cli.config))?;

    scoreline::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting paper trading mode");
            args.execute(config).await?;
        }
        Commands::Replay(args) => {
            tracing::info!("Starting replay");
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("Configuration at {} is valid", cli.config);
            print_config(&config)?;
        }
        Commands::Fees(args) => {
            args.execute(&config)?;
        }
    }

    Ok(())
}
