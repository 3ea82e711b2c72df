//! Image references as users write them on the command line.
//!
//! Supported forms:
//! - `nginx` → `docker.io/library/nginx:latest`
//! - `org/app:1.2` → `docker.io/org/app:1.2`
//! - `ghcr.io/org/app:main` → registry `ghcr.io`
//! - `localhost:5000/app:dev` → registry `localhost:5000`
//! - `org/app:1.2@sha256:...` → tag plus the digest currently running

use std::fmt;
use std::str::FromStr;

use crate::config::RegistryConfig;
use crate::error::RegistryError;

const DEFAULT_TAG: &str = "latest";

/// Hostnames that all denote Docker Hub.
pub(crate) const DOCKER_HUB_ALIASES: [&str; 3] =
    ["docker.io", "index.docker.io", "registry-1.docker.io"];

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry host, `docker.io` when the reference names none.
    pub registry: String,

    /// Registry-scoped repository path (e.g. `org/name`).
    pub repository: String,

    /// Tag.
    pub tag: String,

    /// Digest pinned in the reference, if any.
    pub digest: Option<String>,
}

impl ImageReference {
    /// Creates a reference from its parts.
    #[must_use]
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
            digest: None,
        }
    }

    /// Parses an image reference.
    ///
    /// # Examples
    ///
    /// ```
    /// use reroller_registry::ImageReference;
    ///
    /// let image = ImageReference::parse("nginx")?;
    /// assert_eq!(image.registry, "docker.io");
    /// assert_eq!(image.repository, "library/nginx");
    /// assert_eq!(image.tag, "latest");
    ///
    /// let image = ImageReference::parse("ghcr.io/org/app:main")?;
    /// assert_eq!(image.registry, "ghcr.io");
    /// assert_eq!(image.repository, "org/app");
    /// assert_eq!(image.tag, "main");
    /// # Ok::<(), reroller_registry::RegistryError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] for empty input, empty
    /// path components, an empty tag or a malformed digest.
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        let input = input.trim();
        let invalid = |reason: &str| RegistryError::InvalidReference {
            reference: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (rest, digest) = match input.split_once('@') {
            Some((rest, digest)) => {
                let valid = digest
                    .split_once(':')
                    .is_some_and(|(algorithm, hex)| !algorithm.is_empty() && !hex.is_empty());
                if !valid {
                    return Err(invalid("digest must be algorithm:hex"));
                }
                (rest, Some(digest.to_string()))
            }
            None => (input, None),
        };

        let (registry, path) = match rest.split_once('/') {
            Some((first, remainder)) if is_host(first) => (first, remainder),
            _ => (RegistryConfig::DOCKER_HUB_REGISTRY, rest),
        };

        // A tag separator can only appear after the last path separator.
        let name_start = path.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match path[name_start..].rfind(':') {
            Some(i) => (&path[..name_start + i], &path[name_start + i + 1..]),
            None => (path, DEFAULT_TAG),
        };

        if tag.is_empty() {
            return Err(invalid("empty tag"));
        }
        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(invalid("empty repository path component"));
        }

        let (registry, repository) = if DOCKER_HUB_ALIASES.contains(&registry) {
            let repository = if repository.contains('/') {
                repository.to_string()
            } else {
                format!("library/{repository}")
            };
            (RegistryConfig::DOCKER_HUB_REGISTRY.to_string(), repository)
        } else {
            (registry.to_string(), repository.to_string())
        };

        Ok(Self {
            registry,
            repository,
            tag: tag.to_string(),
            digest,
        })
    }
}

fn is_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

impl FromStr for ImageReference {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)?;
        if let Some(ref digest) = self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
