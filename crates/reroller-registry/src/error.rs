//! Error types for digest resolution.

use thiserror::Error;

use crate::manifest::ManifestProbe;

/// Errors that can occur while resolving the digests of a tag.
///
/// Every variant identifies the stage of the resolution that failed. None of
/// them are retried internally.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client for {base_url}: {source}")]
    ClientBuild {
        /// Registry base URL.
        base_url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// An image reference could not be parsed.
    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidReference {
        /// Reference string as given.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The unauthenticated HEAD used to discover auth requirements failed.
    #[error("Failed to request HEAD for {url}: {source}")]
    ManifestHeadFailed {
        /// Manifests endpoint URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The `WWW-Authenticate` header is not a usable bearer challenge.
    #[error("Invalid WWW-Authenticate challenge '{header}': {reason}")]
    InvalidChallenge {
        /// Header value as received.
        header: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The token endpoint could not be reached or refused the request.
    #[error("Failed to obtain token from {realm}: {message}")]
    AuthFailed {
        /// Token realm URL.
        realm: String,
        /// Error message.
        message: String,
    },

    /// A manifest probe request failed in transport.
    #[error("Failed to query {probe} for {url}: {source}")]
    ProbeFailed {
        /// Probe that was running.
        probe: ManifestProbe,
        /// Manifests endpoint URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The registry announced an OCI index but the body did not decode.
    #[error("Failed to decode OCI index from {url}: {source}")]
    ResolutionFailed {
        /// Manifests endpoint URL.
        url: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// None of the manifest probes produced a digest.
    #[error("No digests found for {repository}:{tag}")]
    NoDigestsFound {
        /// Repository path.
        repository: String,
        /// Tag.
        tag: String,
    },
}

impl RegistryError {
    /// Returns true when the registry answered but published no digest.
    ///
    /// Callers polling many images typically skip such images instead of
    /// aborting the whole cycle.
    #[must_use]
    pub const fn is_no_digests(&self) -> bool {
        matches!(self, Self::NoDigestsFound { .. })
    }
}
