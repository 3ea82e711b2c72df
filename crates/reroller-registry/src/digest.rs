//! Digests and their aggregation across probes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Content digest in `algorithm:hex` form.
///
/// Opaque: compared by equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Creates a digest from its string form.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Returns the digest string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Digest {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Digest {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for Digest {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Digest {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Ordered digests published under a tag.
///
/// Keeps probe order (OCI index entries, then manifest list, then manifest)
/// and duplicates. Never empty when returned from a resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestSet(Vec<Digest>);

impl DigestSet {
    /// Returns true if the digest is published under the tag.
    #[must_use]
    pub fn contains(&self, digest: &str) -> bool {
        self.0.iter().any(|d| d == digest)
    }

    /// First digest in probe order.
    #[must_use]
    pub fn first(&self) -> Option<&Digest> {
        self.0.first()
    }

    /// Number of digests, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no digests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the digests in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Digest> {
        self.0.iter()
    }

    /// Returns the digests as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Digest] {
        &self.0
    }

    /// Consumes the set, returning the digest list.
    #[must_use]
    pub fn into_vec(self) -> Vec<Digest> {
        self.0
    }
}

impl<'a> IntoIterator for &'a DigestSet {
    type Item = &'a Digest;
    type IntoIter = std::slice::Iter<'a, Digest>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for DigestSet {
    type Item = Digest;
    type IntoIter = std::vec::IntoIter<Digest>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Concatenates per-probe results in the order given.
///
/// # Errors
///
/// Returns [`RegistryError::NoDigestsFound`] if every probe came back empty.
///
/// # Examples
///
/// ```
/// use reroller_registry::{aggregate, Digest};
///
/// let set = aggregate(
///     "org/app",
///     "latest",
///     vec![vec![], vec![Digest::from("sha256:aaa")], vec![Digest::from("sha256:aaa")]],
/// )?;
/// assert_eq!(set.len(), 2);
/// assert!(set.contains("sha256:aaa"));
/// # Ok::<(), reroller_registry::RegistryError>(())
/// ```
pub fn aggregate(
    repository: &str,
    tag: &str,
    results: impl IntoIterator<Item = Vec<Digest>>,
) -> Result<DigestSet, RegistryError> {
    let digests: Vec<Digest> = results.into_iter().flatten().collect();

    if digests.is_empty() {
        return Err(RegistryError::NoDigestsFound {
            repository: repository.to_string(),
            tag: tag.to_string(),
        });
    }

    Ok(DigestSet(digests))
}
