//! Drive Sense - Main Entry Point

use clap::Parser;
use pipeline::{init_logging, install_metrics, run, AppConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "drive-sense")]
#[command(about = "Replay recorded sensor streams through the trip pipeline", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// NDJSON recording (standard input when omitted)
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    init_logging(&config.logging)?;
    info!("=== Drive Sense v{} ===", env!("CARGO_PKG_VERSION"));
    install_metrics(&config.metrics)?;

    run(config, args.input).await?;
    Ok(())
}
