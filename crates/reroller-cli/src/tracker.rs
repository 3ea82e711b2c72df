//! Per-image digest bookkeeping with a rollout cooldown.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use reroller_registry::{Digest, DigestSet, ImageReference};

/// Default cooldown between two rollouts of the same image (48h).
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(48 * 60 * 60);

/// Outcome of comparing a fresh resolution with the pinned digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// First sighting; the digest is now pinned.
    Tracked {
        /// Digest pinned for the image.
        digest: Digest,
    },
    /// The pinned digest is still published under the tag.
    Current,
    /// The tag moved, but the image was rolled out too recently.
    CoolingDown {
        /// Time left before another rollout is allowed.
        remaining: Duration,
    },
    /// The tag moved away from the pinned digest.
    Republished {
        /// Digest that was pinned.
        previous: Digest,
        /// Digest the tag points at now.
        current: Digest,
    },
}

#[derive(Debug, Clone)]
struct Record {
    pinned: Digest,
    last_rollout: Option<DateTime<Utc>>,
}

/// Tracks the pinned digest and last rollout time of every watched image.
#[derive(Debug, Clone)]
pub struct RolloutTracker {
    cooldown: Duration,
    records: HashMap<ImageReference, Record>,
}

impl RolloutTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            records: HashMap::new(),
        }
    }

    /// Compares `digests` with what is pinned for `image`.
    ///
    /// An unknown image is pinned to its `@digest` when the reference carries
    /// one, otherwise to the first resolved digest. A detected republish
    /// leaves the pin untouched, so it is reported again until
    /// [`RolloutTracker::record_rollout`] or [`RolloutTracker::repin`] moves it.
    pub fn observe(
        &mut self,
        image: &ImageReference,
        digests: &DigestSet,
        now: DateTime<Utc>,
    ) -> Observation {
        let Some(latest) = digests.first() else {
            return Observation::Current;
        };

        let Some(record) = self.records.get_mut(image) else {
            let pinned = image
                .digest
                .as_deref()
                .map_or_else(|| latest.clone(), Digest::from);
            self.records.insert(
                image.clone(),
                Record {
                    pinned: pinned.clone(),
                    last_rollout: None,
                },
            );
            return Observation::Tracked { digest: pinned };
        };

        if digests.contains(record.pinned.as_str()) {
            return Observation::Current;
        }

        if let Some(last) = record.last_rollout {
            let elapsed = (now - last).to_std().unwrap_or_default();
            if elapsed < self.cooldown {
                return Observation::CoolingDown {
                    remaining: self.cooldown - elapsed,
                };
            }
        }

        Observation::Republished {
            previous: record.pinned.clone(),
            current: latest.clone(),
        }
    }

    /// Pins `image` to `current` without starting a cooldown.
    pub fn repin(&mut self, image: &ImageReference, current: &Digest) {
        if let Some(record) = self.records.get_mut(image) {
            record.pinned = current.clone();
        }
    }

    /// Records that `image` was rolled out to `current` at `now`.
    pub fn record_rollout(
        &mut self,
        image: &ImageReference,
        current: &Digest,
        now: DateTime<Utc>,
    ) {
        if let Some(record) = self.records.get_mut(image) {
            record.pinned = current.clone();
            record.last_rollout = Some(now);
        }
    }

    /// Digest currently pinned for `image`.
    #[must_use]
    pub fn pinned(&self, image: &ImageReference) -> Option<&Digest> {
        self.records.get(image).map(|record| &record.pinned)
    }
}

impl Default for RolloutTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
