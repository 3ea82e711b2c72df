//! Reroller CLI - detect container image tags that were re-published.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod tracker;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = &cli.log_level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("reroller={level},reroller_registry={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = cli.settings();

    match cli.command {
        Commands::Resolve(args) => commands::resolve::run(&args, &settings)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Check(args) => commands::check::run(&args, &settings).await,
        Commands::Watch(args) => commands::watch::run(&args, &settings)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Version => {
            println!("reroller {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}
