//! Registry host lookup.

use std::collections::HashMap;
use std::time::Duration;

use crate::client::RegistryClient;
use crate::config::RegistryConfig;
use crate::digest::DigestSet;
use crate::error::RegistryError;
use crate::reference::{ImageReference, DOCKER_HUB_ALIASES};

/// Clients keyed by registry host.
///
/// Docker Hub and GHCR are preconfigured. Images on any other host are
/// resolved with a client for `https://{host}/v2`, built per call.
#[derive(Debug, Clone)]
pub struct Registries {
    clients: HashMap<String, RegistryClient>,
    timeout: Option<Duration>,
}

impl Registries {
    /// Creates the lookup with Docker Hub and GHCR registered.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be created.
    pub fn new() -> Result<Self, RegistryError> {
        Self::build(None)
    }

    /// Like [`Registries::new`], with a per-request deadline on every client.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be created.
    pub fn with_timeout(timeout: Duration) -> Result<Self, RegistryError> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self, RegistryError> {
        let registries = Self {
            clients: HashMap::new(),
            timeout,
        };

        registries
            .with_registry(RegistryConfig::DOCKER_HUB_REGISTRY, RegistryConfig::docker_hub())?
            .with_registry(RegistryConfig::GHCR_REGISTRY, RegistryConfig::ghcr())
    }

    /// Registers a client for `host`, replacing any existing one.
    ///
    /// Docker Hub aliases register the `docker.io` client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_registry(
        mut self,
        host: impl Into<String>,
        config: RegistryConfig,
    ) -> Result<Self, RegistryError> {
        let client = RegistryClient::new(self.apply_timeout(config))?;
        let host = host.into();
        self.clients.insert(canonical_host(&host).to_string(), client);
        Ok(self)
    }

    /// Returns the client registered for `host`, if any.
    ///
    /// Docker Hub aliases share the `docker.io` client.
    #[must_use]
    pub fn get(&self, host: &str) -> Option<&RegistryClient> {
        self.clients.get(canonical_host(host))
    }

    /// Resolves the digests published under the reference's tag.
    ///
    /// # Errors
    ///
    /// See [`RegistryClient::resolve_digests`].
    pub async fn resolve(&self, image: &ImageReference) -> Result<DigestSet, RegistryError> {
        if let Some(client) = self.get(&image.registry) {
            return client.resolve_digests(&image.repository, &image.tag).await;
        }

        tracing::debug!(registry = %image.registry, "Using generic V2 client");
        let config = self.apply_timeout(RegistryConfig::for_host(&image.registry));
        RegistryClient::new(config)?
            .resolve_digests(&image.repository, &image.tag)
            .await
    }

    fn apply_timeout(&self, config: RegistryConfig) -> RegistryConfig {
        match self.timeout {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        }
    }
}

fn canonical_host(host: &str) -> &str {
    if DOCKER_HUB_ALIASES.contains(&host) {
        RegistryConfig::DOCKER_HUB_REGISTRY
    } else {
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preconfigured_hosts() {
        let registries = Registries::new().unwrap();
        assert_eq!(
            registries.get("docker.io").unwrap().config().base_url,
            RegistryConfig::DOCKER_HUB_BASE_URL
        );
        assert_eq!(
            registries.get("registry-1.docker.io").unwrap().config().base_url,
            RegistryConfig::DOCKER_HUB_BASE_URL
        );
        assert_eq!(
            registries.get("ghcr.io").unwrap().config().base_url,
            RegistryConfig::GHCR_BASE_URL
        );
        assert!(registries.get("quay.io").is_none());
    }

    #[test]
    fn test_with_registry_overrides() {
        let registries = Registries::new()
            .unwrap()
            .with_registry("ghcr.io", RegistryConfig::new("http://127.0.0.1:5000/v2"))
            .unwrap();
        assert_eq!(
            registries.get("ghcr.io").unwrap().config().base_url,
            "http://127.0.0.1:5000/v2"
        );
    }

    #[test]
    fn test_with_registry_alias_replaces_docker_hub() {
        let registries = Registries::new()
            .unwrap()
            .with_registry("index.docker.io", RegistryConfig::new("http://127.0.0.1:5000/v2"))
            .unwrap();

        for host in DOCKER_HUB_ALIASES {
            assert_eq!(
                registries.get(host).unwrap().config().base_url,
                "http://127.0.0.1:5000/v2"
            );
        }
        assert_eq!(registries.clients.len(), 2);
    }

    #[test]
    fn test_timeout_applies_to_registered_clients() {
        let registries = Registries::with_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(
            registries.get("docker.io").unwrap().config().timeout,
            Some(Duration::from_secs(10))
        );
    }
}
