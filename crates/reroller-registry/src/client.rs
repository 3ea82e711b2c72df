//! Registry client resolving the digests published under a tag.
//!
//! A resolution runs at most five requests, strictly one after the other:
//! an unauthenticated `HEAD` to learn whether a token is needed, the token
//! request, and one `GET` per manifest schema.

use reqwest::header::{HeaderMap, AUTHORIZATION, WWW_AUTHENTICATE};

use crate::auth::{self, AuthChallenge, BearerToken};
use crate::config::RegistryConfig;
use crate::digest::{self, DigestSet};
use crate::error::RegistryError;
use crate::manifest::ManifestProbe;

/// Client for one V2 registry base URL.
///
/// Holds no per-resolution state: tokens are fetched for each call and
/// dropped afterwards, so a shared client can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    config: RegistryConfig,
    http: reqwest::Client,
}

impl RegistryClient {
    /// Creates a new registry client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use reroller_registry::{RegistryClient, RegistryConfig};
    ///
    /// let client = RegistryClient::new(RegistryConfig::ghcr())?;
    /// # Ok::<(), reroller_registry::RegistryError>(())
    /// ```
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http = Self::build_http_client(&config)?;
        Ok(Self { config, http })
    }

    /// Returns the registry configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Resolves every digest currently published under `repository:tag`.
    ///
    /// # Arguments
    ///
    /// * `repository` - Registry-scoped repository path (e.g. `org/name`).
    /// * `tag` - Tag to resolve.
    ///
    /// # Returns
    ///
    /// The digests in probe order: OCI index entries, then the manifest list
    /// digest, then the single manifest digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth discovery `HEAD` fails, the challenge or
    /// token exchange fails, a probe fails in transport, an announced OCI
    /// index does not decode, or no probe finds any digest.
    pub async fn resolve_digests(
        &self,
        repository: &str,
        tag: &str,
    ) -> Result<DigestSet, RegistryError> {
        let url = self.config.manifests_url(repository, tag);

        let token = match self.discover_challenge(&url).await? {
            Some(challenge) => Some(auth::fetch_token(&self.http, &challenge).await?),
            None => None,
        };

        let template = Self::request_template(token.as_ref());

        let mut results = Vec::with_capacity(ManifestProbe::ORDER.len());
        for probe in ManifestProbe::ORDER {
            results.push(probe.run(&self.http, &url, &template).await?);
        }

        let digests = digest::aggregate(repository, tag, results)?;
        tracing::info!(
            registry = %self.config.base_url,
            repository,
            tag,
            count = digests.len(),
            "Resolved tag digests"
        );
        Ok(digests)
    }

    /// Sends the unauthenticated `HEAD` and parses any bearer challenge.
    async fn discover_challenge(&self, url: &str) -> Result<Option<AuthChallenge>, RegistryError> {
        let response = self.http.head(url).send().await.map_err(|source| {
            RegistryError::ManifestHeadFailed {
                url: url.to_string(),
                source,
            }
        })?;

        let Some(header) = response.headers().get(WWW_AUTHENTICATE) else {
            tracing::debug!(url, status = %response.status(), "No auth challenge");
            return Ok(None);
        };

        let header = header
            .to_str()
            .map_err(|_| RegistryError::InvalidChallenge {
                header: String::from_utf8_lossy(header.as_bytes()).into_owned(),
                reason: "header is not valid ASCII".to_string(),
            })?;

        AuthChallenge::parse(header).map(Some)
    }

    /// Headers shared by every probe. `Accept` is added per probe.
    fn request_template(token: Option<&BearerToken>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = token.and_then(BearerToken::header_value) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    /// Builds the HTTP client with proper configuration.
    fn build_http_client(config: &RegistryConfig) -> Result<reqwest::Client, RegistryError> {
        let mut builder = reqwest::Client::builder().user_agent(&config.user_agent);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        builder.build().map_err(|source| RegistryError::ClientBuild {
            base_url: config.base_url.clone(),
            source,
        })
    }
}

/// Resolves the digests of `repository:tag` on the registry at `base_url`.
///
/// Convenience wrapper building a one-off [`RegistryClient`]; long-running
/// callers should keep a client per registry instead.
///
/// # Errors
///
/// See [`RegistryClient::resolve_digests`].
pub async fn resolve_image_digests(
    base_url: &str,
    repository: &str,
    tag: &str,
) -> Result<DigestSet, RegistryError> {
    RegistryClient::new(RegistryConfig::new(base_url))?
        .resolve_digests(repository, tag)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RegistryClient::new(RegistryConfig::docker_hub());
        assert!(client.is_ok());
    }

    #[test]
    fn test_request_template_without_token() {
        let headers = RegistryClient::request_template(None);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_request_template_with_token() {
        let token = BearerToken::new("abc.def");
        let headers = RegistryClient::request_template(Some(&token));
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc.def");
    }

    #[test]
    fn test_request_template_skips_empty_token() {
        let token = BearerToken::new("");
        let headers = RegistryClient::request_template(Some(&token));
        assert!(!headers.contains_key(AUTHORIZATION));
    }
}
