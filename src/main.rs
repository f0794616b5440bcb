mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use scoped_rag::{load_config, LoadOptions};
use tracing::{debug, error};

use crate::cli::context::CliContext;
use crate::cli::dispatch::dispatch;
use crate::cli::env::CliArgs;
use crate::cli::runtime::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.log_format)?;
    debug!("Starting scoped-rag v{}", env!("CARGO_PKG_VERSION"));

    let loaded = load_config(&LoadOptions::new(cli.config.clone()))
        .context("Failed to load configuration")?;
    let ctx = CliContext::new(loaded, cli.output);

    match dispatch(&cli, &ctx).await {
        Ok(()) => {
            debug!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {err:#}");
            std::process::exit(1);
        }
    }
}
