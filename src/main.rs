//! Ledger Flow Tracer

use clap::Parser;
use flow_tracer::{Config, Result, VERSION, cli, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::load()?
    };

    init_logging(&config.logging.level);

    tracing::info!("Ledger Flow Tracer v{}", VERSION);
    tracing::debug!("Parsed arguments: {:?}", args);
    tracing::debug!("Loaded configuration: {:?}", config);

    cli::execute(args, config).await?;

    Ok(())
}
