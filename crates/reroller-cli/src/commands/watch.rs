//! Watch command implementation.
//!
//! Polls a set of images and hands every re-published tag to a
//! [`RolloutHandler`], respecting a per-image cooldown.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Args;
use tracing::{debug, error, info, warn};

use reroller_registry::{Digest, DigestSet, ImageReference, Registries, RegistryError};

use super::Settings;
use crate::tracker::{Observation, RolloutTracker};

/// Arguments for the watch command.
#[derive(Args)]
pub struct WatchArgs {
    /// Images to watch (repeat the flag or separate with commas)
    #[arg(
        short,
        long = "image",
        env = "REROLLER_IMAGES",
        value_delimiter = ',',
        required = true
    )]
    pub images: Vec<String>,

    /// Seconds between two cycles (0 runs a single cycle)
    #[arg(long, env = "REROLLER_INTERVAL", default_value = "0")]
    pub interval: u64,

    /// Minimum seconds between two rollouts of the same image
    #[arg(long, env = "REROLLER_COOLDOWN", default_value = "172800")]
    pub cooldown: u64,

    /// Report re-published tags without rolling anything out
    #[arg(long, env = "REROLLER_DRY_RUN")]
    pub dry_run: bool,
}

/// Source of published digests for an image.
#[async_trait]
pub trait DigestSource: Send + Sync {
    /// Resolves the digests currently published under the image's tag.
    async fn digests(&self, image: &ImageReference) -> Result<DigestSet, RegistryError>;
}

#[async_trait]
impl DigestSource for Registries {
    async fn digests(&self, image: &ImageReference) -> Result<DigestSet, RegistryError> {
        self.resolve(image).await
    }
}

/// Reacts to a tag that was re-published.
#[async_trait]
pub trait RolloutHandler: Send + Sync {
    /// Rolls out `image`, now published as `current` instead of `previous`.
    async fn rollout(
        &self,
        image: &ImageReference,
        previous: &Digest,
        current: &Digest,
    ) -> Result<()>;
}

/// Handler that only logs the rollout.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRollout;

#[async_trait]
impl RolloutHandler for LogRollout {
    async fn rollout(
        &self,
        image: &ImageReference,
        previous: &Digest,
        current: &Digest,
    ) -> Result<()> {
        info!(image = %image, previous = %previous, current = %current, "Rolling out re-published image");
        Ok(())
    }
}

/// Counts for one watch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Images whose digests were resolved.
    pub checked: usize,
    /// Images whose tag moved and was due for a rollout.
    pub republished: usize,
    /// Images skipped because resolution failed.
    pub skipped: usize,
}

/// Drives the resolve/compare/rollout cycle.
pub struct Watcher<S, H> {
    source: S,
    handler: H,
    tracker: RolloutTracker,
    dry_run: bool,
    timeout: Option<Duration>,
}

impl<S: DigestSource, H: RolloutHandler> Watcher<S, H> {
    /// Creates a watcher with the given rollout cooldown.
    pub fn new(source: S, handler: H, cooldown: Duration) -> Self {
        Self {
            source,
            handler,
            tracker: RolloutTracker::new(cooldown),
            dry_run: false,
            timeout: None,
        }
    }

    /// Detects re-published tags without calling the handler.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Bounds every resolution.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs one cycle over `images`.
    pub async fn run_cycle(&mut self, images: &[ImageReference]) -> CycleSummary {
        self.run_cycle_at(images, Utc::now()).await
    }

    /// Runs one cycle over `images` as of `now`.
    pub async fn run_cycle_at(
        &mut self,
        images: &[ImageReference],
        now: DateTime<Utc>,
    ) -> CycleSummary {
        let mut summary = CycleSummary::default();

        for image in images {
            let Some(digests) = self.resolve(image).await else {
                summary.skipped += 1;
                continue;
            };
            summary.checked += 1;

            match self.tracker.observe(image, &digests, now) {
                Observation::Tracked { digest } => {
                    info!(image = %image, digest = %digest, "Tracking image");
                }
                Observation::Current => {
                    debug!(image = %image, "Image is current");
                }
                Observation::CoolingDown { remaining } => {
                    info!(
                        image = %image,
                        remaining_secs = remaining.as_secs(),
                        "Image re-published but still cooling down"
                    );
                }
                Observation::Republished { previous, current } => {
                    summary.republished += 1;
                    self.roll_out(image, &previous, &current, now).await;
                }
            }
        }

        summary
    }

    async fn resolve(&self, image: &ImageReference) -> Option<DigestSet> {
        let resolution = self.source.digests(image);
        let result = match self.timeout {
            Some(deadline) => {
                if let Ok(result) = tokio::time::timeout(deadline, resolution).await {
                    result
                } else {
                    warn!(image = %image, timeout = ?deadline, "Resolution timed out, skipping");
                    return None;
                }
            }
            None => resolution.await,
        };

        match result {
            Ok(digests) => Some(digests),
            Err(err) if err.is_no_digests() => {
                warn!(image = %image, "No digests published under tag, skipping");
                None
            }
            Err(err) => {
                error!(image = %image, error = %err, "Resolution failed, skipping");
                None
            }
        }
    }

    async fn roll_out(
        &mut self,
        image: &ImageReference,
        previous: &Digest,
        current: &Digest,
        now: DateTime<Utc>,
    ) {
        if self.dry_run {
            info!(
                image = %image,
                previous = %previous,
                current = %current,
                "Dry run: rollout not executed"
            );
            self.tracker.repin(image, current);
            return;
        }

        match self.handler.rollout(image, previous, current).await {
            Ok(()) => self.tracker.record_rollout(image, current, now),
            // Pin stays on `previous`, the next cycle retries.
            Err(err) => error!(image = %image, error = %err, "Rollout failed"),
        }
    }
}

/// Runs the watch command.
///
/// # Errors
///
/// Returns an error if an image reference is invalid or the registry
/// clients cannot be created.
pub async fn run(args: &WatchArgs, settings: &Settings) -> Result<()> {
    let images = args
        .images
        .iter()
        .map(|image| super::parse_image(image.trim()))
        .collect::<Result<Vec<_>>>()?;
    let registries = super::registries(settings).context("Failed to set up watcher")?;

    let mut watcher = Watcher::new(registries, LogRollout, Duration::from_secs(args.cooldown))
        .dry_run(args.dry_run)
        .timeout(settings.timeout);

    info!(
        images = images.len(),
        interval_secs = args.interval,
        cooldown_secs = args.cooldown,
        dry_run = args.dry_run,
        "Starting watcher"
    );

    loop {
        let summary = watcher.run_cycle(&images).await;
        info!(
            checked = summary.checked,
            republished = summary.republished,
            skipped = summary.skipped,
            "Cycle complete"
        );

        if args.interval == 0 {
            return Ok(());
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(args.interval)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down watcher");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use chrono::TimeDelta;
    use reroller_registry::aggregate;

    /// Answers from a per-repository script; an empty entry means no digests.
    #[derive(Default)]
    struct ScriptedSource {
        script: Mutex<HashMap<String, VecDeque<Vec<&'static str>>>>,
    }

    impl ScriptedSource {
        fn with(self, repository: &str, answers: Vec<Vec<&'static str>>) -> Self {
            self.script
                .lock()
                .unwrap()
                .insert(repository.to_string(), answers.into());
            self
        }
    }

    #[async_trait]
    impl DigestSource for ScriptedSource {
        async fn digests(&self, image: &ImageReference) -> Result<DigestSet, RegistryError> {
            let answer = self
                .script
                .lock()
                .unwrap()
                .get_mut(&image.repository)
                .and_then(VecDeque::pop_front)
                .unwrap_or_default();
            aggregate(
                &image.repository,
                &image.tag,
                vec![answer.into_iter().map(Digest::from).collect()],
            )
        }
    }

    struct SlowSource;

    #[async_trait]
    impl DigestSource for SlowSource {
        async fn digests(&self, _image: &ImageReference) -> Result<DigestSet, RegistryError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(DigestSet::default())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingHandler {
        rollouts: Arc<Mutex<Vec<(String, String, String)>>>,
        fail: bool,
    }

    #[async_trait]
    impl RolloutHandler for RecordingHandler {
        async fn rollout(
            &self,
            image: &ImageReference,
            previous: &Digest,
            current: &Digest,
        ) -> Result<()> {
            self.rollouts.lock().unwrap().push((
                image.repository.clone(),
                previous.to_string(),
                current.to_string(),
            ));
            if self.fail {
                anyhow::bail!("restart refused");
            }
            Ok(())
        }
    }

    fn image(reference: &str) -> ImageReference {
        ImageReference::parse(reference).unwrap()
    }

    #[tokio::test]
    async fn test_republished_tag_is_rolled_out() {
        let source = ScriptedSource::default().with(
            "org/app",
            vec![vec!["sha256:a"], vec!["sha256:a"], vec!["sha256:b"]],
        );
        let handler = RecordingHandler::default();
        let mut watcher = Watcher::new(source, handler.clone(), Duration::from_secs(60));
        let images = [image("org/app:latest")];

        let first = watcher.run_cycle(&images).await;
        let second = watcher.run_cycle(&images).await;
        let third = watcher.run_cycle(&images).await;

        assert_eq!(first.republished, 0);
        assert_eq!(second.republished, 0);
        assert_eq!(third.republished, 1);
        assert_eq!(
            *handler.rollouts.lock().unwrap(),
            vec![(
                "org/app".to_string(),
                "sha256:a".to_string(),
                "sha256:b".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_second_rollout() {
        let source = ScriptedSource::default().with(
            "org/app",
            vec![
                vec!["sha256:a"],
                vec!["sha256:b"],
                vec!["sha256:c"],
                vec!["sha256:c"],
            ],
        );
        let handler = RecordingHandler::default();
        let mut watcher = Watcher::new(source, handler.clone(), Duration::from_secs(3600));
        let images = [image("org/app:latest")];
        let start = Utc::now();

        watcher.run_cycle_at(&images, start).await;
        watcher.run_cycle_at(&images, start).await;
        let cooling = watcher
            .run_cycle_at(&images, start + TimeDelta::minutes(10))
            .await;
        let due = watcher
            .run_cycle_at(&images, start + TimeDelta::hours(2))
            .await;

        assert_eq!(cooling.republished, 0);
        assert_eq!(due.republished, 1);
        assert_eq!(handler.rollouts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_never_calls_handler() {
        let source = ScriptedSource::default().with(
            "org/app",
            vec![vec!["sha256:a"], vec!["sha256:b"], vec!["sha256:b"]],
        );
        let handler = RecordingHandler::default();
        let mut watcher =
            Watcher::new(source, handler.clone(), Duration::from_secs(60)).dry_run(true);
        let images = [image("org/app:latest")];

        watcher.run_cycle(&images).await;
        let reported = watcher.run_cycle(&images).await;
        let settled = watcher.run_cycle(&images).await;

        assert_eq!(reported.republished, 1);
        assert_eq!(settled.republished, 0);
        assert!(handler.rollouts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_rollout_is_retried_next_cycle() {
        let source = ScriptedSource::default().with(
            "org/app",
            vec![vec!["sha256:a"], vec!["sha256:b"], vec!["sha256:b"], vec!["sha256:b"]],
        );
        let handler = RecordingHandler {
            fail: true,
            ..RecordingHandler::default()
        };
        let mut watcher = Watcher::new(source, handler.clone(), Duration::from_secs(3600));
        let images = [image("org/app:latest")];

        watcher.run_cycle(&images).await;
        for _ in 0..3 {
            let summary = watcher.run_cycle(&images).await;
            assert_eq!(summary.republished, 1);
        }

        let expected = (
            "org/app".to_string(),
            "sha256:a".to_string(),
            "sha256:b".to_string(),
        );
        assert_eq!(*handler.rollouts.lock().unwrap(), vec![expected; 3]);
    }

    #[tokio::test]
    async fn test_successful_rollout_after_failure_settles() {
        let source = ScriptedSource::default().with(
            "org/app",
            vec![vec!["sha256:a"], vec!["sha256:b"], vec!["sha256:b"], vec!["sha256:b"]],
        );
        let failing = RecordingHandler {
            fail: true,
            ..RecordingHandler::default()
        };
        let mut watcher = Watcher::new(source, failing.clone(), Duration::from_secs(3600));
        let images = [image("org/app:latest")];

        watcher.run_cycle(&images).await;
        watcher.run_cycle(&images).await;

        // Handler recovers; the retried rollout settles the image.
        let mut watcher = Watcher {
            handler: RecordingHandler {
                rollouts: Arc::clone(&failing.rollouts),
                fail: false,
            },
            ..watcher
        };
        assert_eq!(watcher.run_cycle(&images).await.republished, 1);
        assert_eq!(watcher.run_cycle(&images).await.republished, 0);
        assert_eq!(failing.rollouts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_digests_skips_image_and_continues() {
        let source = ScriptedSource::default()
            .with("org/gone", vec![vec![]])
            .with("org/app", vec![vec!["sha256:a"]]);
        let mut watcher =
            Watcher::new(source, RecordingHandler::default(), Duration::from_secs(60));

        let summary = watcher
            .run_cycle(&[image("org/gone:latest"), image("org/app:latest")])
            .await;

        assert_eq!(
            summary,
            CycleSummary {
                checked: 1,
                republished: 0,
                skipped: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_skips_image() {
        let mut watcher = Watcher::new(SlowSource, LogRollout, Duration::from_secs(60))
            .timeout(Some(Duration::from_secs(5)));

        let summary = watcher.run_cycle(&[image("org/app:latest")]).await;

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.checked, 0);
    }

    #[test]
    fn test_watch_args_accept_comma_separated_images() {
        use crate::commands::{Cli, Commands};
        use clap::Parser;

        let cli = Cli::parse_from([
            "reroller",
            "watch",
            "--image",
            "nginx:1.27,ghcr.io/org/app:2",
            "--interval",
            "300",
        ]);
        let Commands::Watch(args) = cli.command else {
            panic!("expected watch command");
        };

        assert_eq!(args.images, vec!["nginx:1.27", "ghcr.io/org/app:2"]);
        assert_eq!(args.interval, 300);
        assert_eq!(args.cooldown, 172_800);
        assert!(!args.dry_run);
    }
}
