//! Metadata discovery: RFC 8414 authorization server metadata and RFC 9728
//! protected resource metadata.

use serde::{Deserialize, Serialize};
use url::Url;

pub const OAUTH_AS_WELL_KNOWN: &str = ".well-known/oauth-authorization-server";
pub const OIDC_WELL_KNOWN: &str = ".well-known/openid-configuration";
pub const PROTECTED_RESOURCE_WELL_KNOWN: &str = "/.well-known/oauth-protected-resource";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("metadata request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no metadata document found for issuer {0}")]
    NotFound(String),

    #[error("metadata issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("invalid metadata URL: {0}")]
    InvalidUrl(String),
}

/// The parts of RFC 8414 metadata the gateway and agent use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    #[serde(default)]
    pub token_endpoint: Option<Url>,
    #[serde(default)]
    pub jwks_uri: Option<Url>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
}

impl AuthorizationServerMetadata {
    /// Fetch metadata for `issuer`, trying the OAuth well-known location
    /// first and the OpenID Connect one second.
    ///
    /// The document's `issuer` must equal the requested issuer exactly.
    ///
    /// # Errors
    /// [`DiscoveryError::NotFound`] when neither location serves a document,
    /// [`DiscoveryError::IssuerMismatch`] on a foreign issuer.
    pub async fn discover(http: &reqwest::Client, issuer: &Url) -> Result<Self, DiscoveryError> {
        for url in candidate_urls(issuer)? {
            tracing::debug!(%url, "trying authorization server metadata");
            let response = http
                .get(url.clone())
                .send()
                .await
                .map_err(|source| DiscoveryError::Http {
                    url: url.to_string(),
                    source,
                })?;
            if !response.status().is_success() {
                tracing::debug!(%url, status = %response.status(), "metadata not served here");
                continue;
            }
            let metadata: Self = response.json().await.map_err(|source| DiscoveryError::Http {
                url: url.to_string(),
                source,
            })?;

            let expected = issuer.as_str().trim_end_matches('/');
            if metadata.issuer.trim_end_matches('/') != expected {
                return Err(DiscoveryError::IssuerMismatch {
                    expected: expected.to_owned(),
                    actual: metadata.issuer,
                });
            }
            tracing::info!(issuer = %metadata.issuer, "discovered authorization server metadata");
            return Ok(metadata);
        }
        Err(DiscoveryError::NotFound(issuer.to_string()))
    }
}

/// RFC 8414 inserts the well-known segment before the issuer path; OIDC
/// appends it.
fn candidate_urls(issuer: &Url) -> Result<Vec<Url>, DiscoveryError> {
    let path = issuer.path().trim_matches('/');
    let mut oauth = issuer.clone();
    let mut oidc = issuer.clone();
    if path.is_empty() {
        oauth.set_path(&format!("/{OAUTH_AS_WELL_KNOWN}"));
        oidc.set_path(&format!("/{OIDC_WELL_KNOWN}"));
    } else {
        oauth.set_path(&format!("/{OAUTH_AS_WELL_KNOWN}/{path}"));
        oidc.set_path(&format!("/{path}/{OIDC_WELL_KNOWN}"));
    }
    if oauth.cannot_be_a_base() {
        return Err(DiscoveryError::InvalidUrl(issuer.to_string()));
    }
    Ok(vec![oauth, oidc])
}

/// RFC 9728 protected resource metadata, served by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bearer_methods_supported: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

impl ProtectedResourceMetadata {
    #[must_use]
    pub fn new(resource: impl Into<String>, authorization_server: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers: vec![authorization_server.into()],
            scopes_supported: Vec::new(),
            bearer_methods_supported: vec!["header".to_owned()],
            resource_name: None,
        }
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes_supported = scopes;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    /// Fetch the document a resource server publishes at its well-known path.
    ///
    /// # Errors
    /// [`DiscoveryError::Http`] on transport or decoding failure,
    /// [`DiscoveryError::NotFound`] on a non-success status.
    pub async fn fetch(http: &reqwest::Client, server_base: &Url) -> Result<Self, DiscoveryError> {
        let url = server_base
            .join(PROTECTED_RESOURCE_WELL_KNOWN)
            .map_err(|e| DiscoveryError::InvalidUrl(e.to_string()))?;
        let response = http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| DiscoveryError::Http {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(DiscoveryError::NotFound(url.to_string()));
        }
        response.json().await.map_err(|source| DiscoveryError::Http {
            url: url.to_string(),
            source,
        })
    }
}
