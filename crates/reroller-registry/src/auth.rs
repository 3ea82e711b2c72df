//! Bearer token negotiation.
//!
//! A registry that requires authentication answers with a
//! `WWW-Authenticate: Bearer realm="...",service="...",scope="..."`
//! challenge. The challenge names a token endpoint (the realm) that hands
//! out short-lived anonymous tokens for the requested scope.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::header::HeaderValue;
use serde::Deserialize;
use url::Url;

use crate::error::RegistryError;

/// A parsed bearer challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Token endpoint URL.
    pub realm: String,

    /// Service the token is issued for.
    pub service: String,

    /// Requested access scope (e.g. `repository:library/nginx:pull`).
    pub scope: String,
}

impl AuthChallenge {
    const SCHEME: &'static str = "Bearer ";

    /// Parses a `WWW-Authenticate` header value.
    ///
    /// Keys other than `realm`, `service` and `scope` are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidChallenge`] if the header lacks the
    /// `Bearer ` prefix, contains an entry that is not exactly one
    /// `key=value` pair, or misses any of the three required keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use reroller_registry::AuthChallenge;
    ///
    /// let challenge = AuthChallenge::parse(
    ///     r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/nginx:pull""#,
    /// )?;
    /// assert_eq!(challenge.realm, "https://auth.docker.io/token");
    /// assert_eq!(challenge.service, "registry.docker.io");
    /// assert_eq!(challenge.scope, "repository:library/nginx:pull");
    /// # Ok::<(), reroller_registry::RegistryError>(())
    /// ```
    pub fn parse(header: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidChallenge {
            header: header.to_string(),
            reason: reason.to_string(),
        };

        let params = header
            .strip_prefix(Self::SCHEME)
            .ok_or_else(|| invalid("header lacks Bearer prefix"))?;

        let mut values = BTreeMap::new();
        for entry in params.split(',') {
            let entry = entry.trim();
            let mut parts = entry.split('=');
            let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(invalid(&format!("invalid key/value pair '{entry}'")));
            };
            values.insert(key, value.trim_matches(['"', '\'', ' ']));
        }

        let field = |key: &str| {
            values
                .get(key)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
        };

        match (field("realm"), field("service"), field("scope")) {
            (Some(realm), Some(service), Some(scope)) => Ok(Self {
                realm,
                service,
                scope,
            }),
            _ => Err(invalid("missing realm, service or scope")),
        }
    }

    /// Returns the token request URL: the realm with `service` and `scope`
    /// appended as URL-encoded query parameters.
    ///
    /// Only these two keys are forwarded; any other challenge key (such as
    /// `error`) is dropped from the query.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidChallenge`] if the realm is not an
    /// absolute URL.
    pub fn token_url(&self) -> Result<Url, RegistryError> {
        let mut url = Url::parse(&self.realm).map_err(|e| RegistryError::InvalidChallenge {
            header: self.realm.clone(),
            reason: format!("realm is not a valid URL: {e}"),
        })?;

        url.query_pairs_mut()
            .append_pair("service", &self.service)
            .append_pair("scope", &self.scope);

        Ok(url)
    }
}

/// Short-lived token issued by a realm. Used for a single resolution.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the realm handed out an empty token.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Authorization` header value, or `None` for an empty or unusable
    /// token.
    #[must_use]
    pub fn header_value(&self) -> Option<HeaderValue> {
        if self.is_empty() {
            return None;
        }
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0)).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken(<{} chars>)", self.0.len())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Exchanges a challenge for a bearer token.
pub(crate) async fn fetch_token(
    http: &reqwest::Client,
    challenge: &AuthChallenge,
) -> Result<BearerToken, RegistryError> {
    let url = challenge.token_url()?;
    let failed = |message: String| RegistryError::AuthFailed {
        realm: challenge.realm.clone(),
        message,
    };

    tracing::debug!(realm = %challenge.realm, service = %challenge.service, scope = %challenge.scope, "Requesting token");

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| failed(format!("request failed: {e}")))?;

    let status = response.status();
    if status.as_u16() >= 400 {
        return Err(failed(format!("token endpoint returned {status}")));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| failed(format!("decoding token response: {e}")))?;

    let token = BearerToken(body.token.or(body.access_token).unwrap_or_default());
    if token.is_empty() {
        tracing::warn!(realm = %challenge.realm, "Token endpoint returned an empty token");
    } else if token.header_value().is_none() {
        return Err(failed("token is not a valid header value".to_string()));
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DOCKER_HUB_CHALLENGE: &str = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:newrelic/infrastructure-bundle:pull""#;

    #[test]
    fn test_parse_docker_hub_challenge() {
        let challenge = AuthChallenge::parse(DOCKER_HUB_CHALLENGE).unwrap();
        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert_eq!(challenge.service, "registry.docker.io");
        assert_eq!(
            challenge.scope,
            "repository:newrelic/infrastructure-bundle:pull"
        );
    }

    #[test]
    fn test_parse_ignores_extra_keys_and_spaces() {
        let header = r#"Bearer realm="https://ghcr.io/token", service="ghcr.io", scope="repository:org/app:pull", error="insufficient_scope""#;
        let challenge = AuthChallenge::parse(header).unwrap();
        assert_eq!(challenge.realm, "https://ghcr.io/token");
        assert_eq!(challenge.service, "ghcr.io");
        assert_eq!(challenge.scope, "repository:org/app:pull");
    }

    #[test]
    fn test_parse_rejects_missing_bearer_prefix() {
        let err = AuthChallenge::parse(r#"Basic realm="Registry Realm""#).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidChallenge { .. }));
    }

    #[test]
    fn test_parse_rejects_pair_without_equals() {
        let header = r#"Bearer realm="https://auth.example.com/token",service,scope="x""#;
        let err = AuthChallenge::parse(header).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidChallenge { ref reason, .. } if reason.contains("service")
        ));
    }

    #[test]
    fn test_parse_rejects_pair_with_two_equals() {
        let header = r#"Bearer realm="https://auth.example.com/token?a=b",service="s",scope="x""#;
        assert!(AuthChallenge::parse(header).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_scope() {
        let header = r#"Bearer realm="https://auth.example.com/token",service="registry""#;
        let err = AuthChallenge::parse(header).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidChallenge { ref reason, .. } if reason.contains("missing")
        ));
    }

    #[test]
    fn test_parse_rejects_empty_realm() {
        let header = r#"Bearer realm="",service="registry",scope="repository:a/b:pull""#;
        assert!(AuthChallenge::parse(header).is_err());
    }

    #[test]
    fn test_token_url_encodes_query() {
        let challenge = AuthChallenge::parse(DOCKER_HUB_CHALLENGE).unwrap();
        let url = challenge.token_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://auth.docker.io/token?service=registry.docker.io&scope=repository%3Anewrelic%2Finfrastructure-bundle%3Apull"
        );
    }

    #[test]
    fn test_token_url_drops_extra_challenge_keys() {
        let header = r#"Bearer realm="https://auth.example.com/token",service="registry",scope="repository:a/b:pull",error="insufficient_scope""#;
        let url = AuthChallenge::parse(header).unwrap().token_url().unwrap();

        let keys: Vec<String> = url.query_pairs().map(|(key, _)| key.into_owned()).collect();
        assert_eq!(keys, vec!["service", "scope"]);
    }

    #[test]
    fn test_token_url_rejects_relative_realm() {
        let challenge = AuthChallenge {
            realm: "/token".to_string(),
            service: "registry".to_string(),
            scope: "repository:a/b:pull".to_string(),
        };
        assert!(matches!(
            challenge.token_url(),
            Err(RegistryError::InvalidChallenge { .. })
        ));
    }

    #[test]
    fn test_bearer_token_header_value() {
        let value = BearerToken::new("abc.def").header_value().unwrap();
        assert_eq!(value, "Bearer abc.def");
        assert!(value.is_sensitive());
        assert!(BearerToken::new("").header_value().is_none());
        assert!(BearerToken::new("bad\ntoken").header_value().is_none());
    }

    #[test]
    fn test_bearer_token_debug_hides_value() {
        let token = BearerToken::new("secret-value");
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret-value"));
        assert_eq!(token.as_str(), "secret-value");
    }

    fn value_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9:/._-]{1,40}"
    }

    fn extra_key_strategy() -> impl Strategy<Value = String> {
        "x-[a-z]{1,8}"
    }

    proptest! {
        #[test]
        fn prop_parse_yields_the_three_fields(
            realm in value_strategy(),
            service in value_strategy(),
            scope in value_strategy(),
            extra_key in extra_key_strategy(),
            extra_value in value_strategy(),
            extra_first in any::<bool>(),
        ) {
            let extra = format!("{extra_key}=\"{extra_value}\"");
            let required = format!("realm=\"{realm}\",service=\"{service}\",scope=\"{scope}\"");
            let header = if extra_first {
                format!("Bearer {extra},{required}")
            } else {
                format!("Bearer {required},{extra}")
            };

            let challenge = AuthChallenge::parse(&header).unwrap();
            prop_assert_eq!(challenge.realm, realm);
            prop_assert_eq!(challenge.service, service);
            prop_assert_eq!(challenge.scope, scope);
        }

        #[test]
        fn prop_parse_requires_bearer_prefix(
            scheme in "(Basic|bearer|Digest|Token)",
            realm in value_strategy(),
        ) {
            let header = format!("{scheme} realm=\"{realm}\",service=\"s\",scope=\"x\"");
            let result = AuthChallenge::parse(&header);
            prop_assert!(
                matches!(result, Err(RegistryError::InvalidChallenge { .. })),
                "expected InvalidChallenge, got {:?}",
                result
            );
        }
    }
}
