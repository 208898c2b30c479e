mod bootstrap_helpers;
mod bridge_runtime;
mod cli_args;
mod cli_types;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::bridge_runtime::run_bridge;
use crate::cli_args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    cli.validate()?;
    run_bridge(cli).await
}
