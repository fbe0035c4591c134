//! Wisp CLI - terminal front end for the Wisp host bridge

mod cli;
mod commands;
mod context;
mod output;
mod render;

use clap::Parser;
use cli::{Cli, Commands};
use context::CliContext;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command_async(cli))
}

async fn run_command_async(cli: Cli) -> anyhow::Result<()> {
    let ctx = CliContext::from_cli(&cli)?;

    match &cli.command {
        Commands::Repl => commands::repl::run(&ctx).await?,
        Commands::Eval { source } => commands::eval::run(&ctx, source).await?,
        Commands::Inspect { raw } => commands::inspect::run(&ctx, raw).await?,
    }

    Ok(())
}
