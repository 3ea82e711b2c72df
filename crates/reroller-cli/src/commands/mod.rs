//! CLI commands and argument parsing.

pub mod check;
pub mod resolve;
pub mod watch;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use reroller_registry::{DigestSet, ImageReference, Registries, RegistryError};

/// Reroller - detect container image tags that were re-published
#[derive(Parser)]
#[command(name = "reroller")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level used when `RUST_LOG` is not set
    #[arg(long, global = true, env = "REROLLER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Deadline for a single image resolution in seconds (0 disables it)
    #[arg(long, global = true, env = "REROLLER_TIMEOUT", default_value = "0")]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Settings shared by every command.
    #[must_use]
    pub const fn settings(&self) -> Settings {
        Settings {
            timeout: match self.timeout {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Print the digests published under an image tag
    Resolve(resolve::ResolveArgs),

    /// Check whether a running digest is still published under its tag
    Check(check::CheckArgs),

    /// Poll images and report tags that were re-published
    Watch(watch::WatchArgs),

    /// Print version information
    Version,
}

/// Global settings resolved from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Settings {
    /// External deadline for one resolution.
    pub timeout: Option<Duration>,
}

/// Parses an image reference argument.
pub(crate) fn parse_image(image: &str) -> Result<ImageReference> {
    ImageReference::parse(image).with_context(|| format!("Invalid image reference: {image}"))
}

/// Builds the registry clients, with the deadline as per-request timeout.
pub(crate) fn registries(settings: &Settings) -> Result<Registries> {
    match settings.timeout {
        Some(timeout) => Registries::with_timeout(timeout),
        None => Registries::new(),
    }
    .context("Failed to create registry clients")
}

/// Resolves `image`, bounded by `timeout` when one is set.
pub(crate) async fn resolve_with_timeout(
    registries: &Registries,
    image: &ImageReference,
    timeout: Option<Duration>,
) -> Result<DigestSet> {
    let resolution = registries.resolve(image);
    let result: Result<DigestSet, RegistryError> = match timeout {
        Some(deadline) => tokio::time::timeout(deadline, resolution)
            .await
            .with_context(|| format!("Timed out after {deadline:?} resolving {image}"))?,
        None => resolution.await,
    };

    result.with_context(|| format!("Failed to resolve {image}"))
}
