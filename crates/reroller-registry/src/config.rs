//! Configuration types for the registry client.

use std::time::Duration;

/// Configuration for a registry client bound to one base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Registry API base URL including the `/v2` prefix
    /// (e.g., "<https://index.docker.io/v2>"), without trailing slash.
    pub base_url: String,

    /// Per-request deadline. `None` leaves requests unbounded.
    pub timeout: Option<Duration>,

    /// User agent string.
    pub user_agent: String,
}

impl RegistryConfig {
    /// Registry name of Docker Hub as it appears in image references.
    pub const DOCKER_HUB_REGISTRY: &'static str = "docker.io";

    /// API base URL of Docker Hub.
    pub const DOCKER_HUB_BASE_URL: &'static str = "https://index.docker.io/v2";

    /// Registry name of the GitHub container registry.
    pub const GHCR_REGISTRY: &'static str = "ghcr.io";

    /// API base URL of the GitHub container registry.
    pub const GHCR_BASE_URL: &'static str = "https://ghcr.io/v2";

    /// Creates a new configuration for the given base URL.
    ///
    /// Trailing slashes are stripped.
    ///
    /// # Examples
    ///
    /// ```
    /// use reroller_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::new("https://registry.example.com/v2/");
    /// assert_eq!(config.base_url, "https://registry.example.com/v2");
    /// ```
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            timeout: None,
            user_agent: format!("reroller/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Configuration for Docker Hub.
    #[must_use]
    pub fn docker_hub() -> Self {
        Self::new(Self::DOCKER_HUB_BASE_URL)
    }

    /// Configuration for the GitHub container registry.
    #[must_use]
    pub fn ghcr() -> Self {
        Self::new(Self::GHCR_BASE_URL)
    }

    /// Configuration for an arbitrary V2 host, e.g. `quay.io` or
    /// `localhost:5000`.
    ///
    /// # Examples
    ///
    /// ```
    /// use reroller_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::for_host("quay.io");
    /// assert_eq!(config.base_url, "https://quay.io/v2");
    /// ```
    #[must_use]
    pub fn for_host(host: &str) -> Self {
        Self::new(format!("https://{host}/v2"))
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Returns the manifests endpoint for a repository and tag.
    #[must_use]
    pub fn manifests_url(&self, repository: &str, tag: &str) -> String {
        format!("{}/{repository}/manifests/{tag}", self.base_url)
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
