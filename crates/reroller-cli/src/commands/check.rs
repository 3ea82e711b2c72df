//! Check command implementation.
//!
//! Tells whether a running digest is still published under its tag.

use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::Args;
use tracing::{info, warn};

use reroller_registry::{DigestSet, ImageReference};

use super::Settings;

/// Arguments for the check command.
#[derive(Args)]
pub struct CheckArgs {
    /// Image reference, optionally pinned with `@sha256:...`
    pub image: String,

    /// Digest of the running image (defaults to the reference's digest)
    #[arg(short, long)]
    pub digest: Option<String>,
}

/// Runs the check command.
///
/// Exits with 0 when the running digest is still published, 1 when the tag
/// was re-published.
///
/// # Errors
///
/// Returns an error if no running digest is given or the tag cannot be
/// resolved.
pub async fn run(args: &CheckArgs, settings: &Settings) -> Result<ExitCode> {
    let image = super::parse_image(&args.image)?;
    let running = running_digest(&image, args.digest.as_deref())?;

    let registries = super::registries(settings)?;
    let digests = super::resolve_with_timeout(&registries, &image, settings.timeout).await?;

    if is_current(&digests, running) {
        info!(image = %image, digest = running, "Running digest is current");
        println!("current: {running}");
        Ok(ExitCode::SUCCESS)
    } else {
        let published = digests.first().map_or("", |digest| digest.as_str());
        warn!(image = %image, running, published, "Tag was re-published");
        println!("republished: {running} -> {published}");
        Ok(ExitCode::FAILURE)
    }
}

fn running_digest<'a>(image: &'a ImageReference, flag: Option<&'a str>) -> Result<&'a str> {
    match flag.or(image.digest.as_deref()) {
        Some(digest) if !digest.trim().is_empty() => Ok(digest.trim()),
        _ => bail!("No running digest: pass --digest or use {image}@<digest>"),
    }
}

fn is_current(digests: &DigestSet, running: &str) -> bool {
    digests.contains(running)
}
