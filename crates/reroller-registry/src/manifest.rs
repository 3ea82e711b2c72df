//! Manifest schemas and the per-schema digest probes.
//!
//! A tag may be published as an OCI image index, a Docker manifest list or a
//! single Docker manifest. Registries answer the manifests endpoint according
//! to the `Accept` header, so each schema is probed with its own request.

use std::collections::HashMap;
use std::fmt;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::RegistryError;

/// Manifest media types understood by the probes.
pub struct MediaType;

impl MediaType {
    /// OCI image index media type.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// Docker manifest list media type.
    pub const DOCKER_MANIFEST_LIST: &'static str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// Docker image manifest media type.
    pub const DOCKER_MANIFEST: &'static str =
        "application/vnd.docker.distribution.manifest.v2+json";

    /// Returns true if a `Content-Type` value names the given media type.
    ///
    /// Parameters such as `charset` are ignored.
    #[must_use]
    pub fn matches(content_type: &str, media_type: &str) -> bool {
        content_type
            .split(';')
            .next()
            .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(media_type))
    }
}

/// Response header carrying the digest of the served manifest.
pub const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// One manifest schema probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestProbe {
    /// OCI image index, digests read from the body.
    OciIndex,

    /// Docker manifest list, digest read from `Docker-Content-Digest`.
    DockerManifestList,

    /// Docker image manifest, digest read from `Docker-Content-Digest`.
    DockerManifest,
}

impl ManifestProbe {
    /// All probes in the order they run.
    pub const ORDER: [Self; 3] = [
        Self::OciIndex,
        Self::DockerManifestList,
        Self::DockerManifest,
    ];

    /// Media type sent as `Accept`.
    #[must_use]
    pub const fn media_type(self) -> &'static str {
        match self {
            Self::OciIndex => MediaType::OCI_INDEX,
            Self::DockerManifestList => MediaType::DOCKER_MANIFEST_LIST,
            Self::DockerManifest => MediaType::DOCKER_MANIFEST,
        }
    }

    /// Builds the headers of this probe from the shared template.
    ///
    /// The template is cloned so that `Accept` is always set fresh.
    #[must_use]
    pub fn headers(self, template: &HeaderMap) -> HeaderMap {
        let mut headers = template.clone();
        headers.insert(ACCEPT, HeaderValue::from_static(self.media_type()));
        headers
    }

    /// Runs the probe against the manifests endpoint.
    ///
    /// An unsupported schema yields an empty list, not an error.
    pub(crate) async fn run(
        self,
        http: &reqwest::Client,
        url: &str,
        template: &HeaderMap,
    ) -> Result<Vec<Digest>, RegistryError> {
        let response = http
            .get(url)
            .headers(self.headers(template))
            .send()
            .await
            .map_err(|source| self.failed(url, source))?;

        let status = response.status();
        let digests = match self {
            Self::OciIndex => {
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();

                if !MediaType::matches(&content_type, MediaType::OCI_INDEX) {
                    tracing::debug!(probe = %self, %status, content_type = %content_type, "Schema not served");
                    return Ok(Vec::new());
                }

                let body = response
                    .bytes()
                    .await
                    .map_err(|source| self.failed(url, source))?;
                let index: ImageIndex =
                    serde_json::from_slice(&body).map_err(|source| {
                        RegistryError::ResolutionFailed {
                            url: url.to_string(),
                            source,
                        }
                    })?;

                index.digests()
            }
            Self::DockerManifestList | Self::DockerManifest => {
                let digests = content_digests(response.headers());
                // Drain the body so the connection can be reused.
                if let Err(e) = response.bytes().await {
                    tracing::debug!(probe = %self, error = %e, "Discarding unreadable body");
                }
                digests
            }
        };

        tracing::debug!(probe = %self, %status, count = digests.len(), "Probe finished");
        Ok(digests)
    }

    fn failed(self, url: &str, source: reqwest::Error) -> RegistryError {
        RegistryError::ProbeFailed {
            probe: self,
            url: url.to_string(),
            source,
        }
    }
}

impl fmt::Display for ManifestProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OciIndex => "OCI image index",
            Self::DockerManifestList => "Docker manifest list",
            Self::DockerManifest => "Docker manifest",
        };
        f.write_str(name)
    }
}

/// Collects every `Docker-Content-Digest` occurrence, in header order.
fn content_digests(headers: &HeaderMap) -> Vec<Digest> {
    headers
        .get_all(DOCKER_CONTENT_DIGEST)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(Digest::from)
        .collect()
}

/// OCI image index.
///
/// Only the fields needed to enumerate the referenced manifests are
/// modelled; unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Media type of this document.
    #[serde(default)]
    pub media_type: Option<String>,

    /// Schema version (always 2).
    #[serde(default)]
    pub schema_version: u32,

    /// Referenced manifests.
    #[serde(default)]
    pub manifests: Vec<IndexManifest>,
}

impl ImageIndex {
    /// Digests of the referenced manifests, in array order.
    #[must_use]
    pub fn digests(&self) -> Vec<Digest> {
        self.manifests
            .iter()
            .map(|m| Digest::from(m.digest.as_str()))
            .collect()
    }
}

/// Entry of an OCI image index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexManifest {
    /// Media type of the referenced manifest.
    #[serde(default)]
    pub media_type: String,

    /// Digest of the referenced manifest.
    pub digest: String,

    /// Size in bytes of the referenced manifest.
    #[serde(default)]
    pub size: u64,

    /// Platform the manifest is built for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// Optional annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

/// Target platform of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture (e.g. `amd64`).
    pub architecture: String,

    /// Operating system (e.g. `linux`).
    pub os: String,

    /// CPU variant (e.g. `v8`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}
