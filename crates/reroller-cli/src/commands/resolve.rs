//! Resolve command implementation.
//!
//! Prints every digest published under an image tag.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use reroller_registry::{DigestSet, ImageReference};

use super::Settings;

/// Arguments for the resolve command.
#[derive(Args)]
pub struct ResolveArgs {
    /// Image reference (e.g., `nginx:1.27` or `ghcr.io/org/app:latest`)
    pub image: String,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output of the resolve command.
#[derive(Debug, Serialize)]
struct Resolution<'a> {
    image: String,
    registry: &'a str,
    repository: &'a str,
    tag: &'a str,
    digests: &'a DigestSet,
}

/// Runs the resolve command.
///
/// # Errors
///
/// Returns an error if:
/// - The image reference is invalid
/// - The registry cannot be queried
/// - No digest is published under the tag
pub async fn run(args: &ResolveArgs, settings: &Settings) -> Result<()> {
    let image = super::parse_image(&args.image)?;
    let registries = super::registries(settings)?;

    info!(image = %image, "Resolving digests");
    let digests = super::resolve_with_timeout(&registries, &image, settings.timeout).await?;

    println!("{}", render(&image, &digests, args.json)?);
    Ok(())
}

fn render(image: &ImageReference, digests: &DigestSet, json: bool) -> Result<String> {
    if !json {
        let lines: Vec<&str> = digests.iter().map(|digest| digest.as_str()).collect();
        return Ok(lines.join("\n"));
    }

    let resolution = Resolution {
        image: image.to_string(),
        registry: &image.registry,
        repository: &image.repository,
        tag: &image.tag,
        digests,
    };
    serde_json::to_string_pretty(&resolution).context("Failed to serialize digests")
}
