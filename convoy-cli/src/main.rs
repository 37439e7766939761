//! Convoy CLI
//!
//! Runs groups of containerized jobs described by Lua definition scripts.

mod commands;
mod sinks;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "convoy")]
#[command(about = "Run groups of containerized jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "convoy=info".into()))
        .with(fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    handle_command(cli.command).await
}
