//! Error types for the token exchange module.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Which exchange step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// Identity assertion -> cross-domain assertion.
    IdentityToCrossDomain,
    /// Cross-domain assertion -> resource access token.
    CrossDomainToResource,
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityToCrossDomain => f.write_str("hop 1 (identity -> ID-JAG)"),
            Self::CrossDomainToResource => f.write_str("hop 2 (ID-JAG -> access token)"),
        }
    }
}

/// An authorization server's rejection, as reported by RFC 6749 section 5.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// HTTP status, absent when the server could not be reached at all.
    pub status: Option<u16>,
    pub error: String,
    pub error_description: Option<String>,
}

impl ProviderError {
    #[must_use]
    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self {
            status: None,
            error: "unreachable".to_owned(),
            error_description: Some(detail.into()),
        }
    }

    fn is_transient(&self) -> bool {
        self.status.is_none_or(|s| s >= 500)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error)?;
        if let Some(desc) = &self.error_description {
            write!(f, ": {desc}")?;
        }
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        Ok(())
    }
}

/// What the human or operator should do about a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Sign in again (and re-consent) at the identity provider.
    Relogin,
    /// A server is unavailable or slow; try again later.
    RetryLater,
    /// Hop 1 worked; the resource authorization server refused the assertion.
    CheckResourceConnection,
    /// Local keys or settings are broken.
    FixConfiguration,
}

impl Remediation {
    #[must_use]
    pub fn hint(self) -> &'static str {
        match self {
            Self::Relogin => "sign in again at your identity provider and grant consent",
            Self::RetryLater => "the authorization service is unavailable, try again later",
            Self::CheckResourceConnection => {
                "the resource server rejected the delegated assertion; check the resource connection and its access policy"
            }
            Self::FixConfiguration => "the agent is misconfigured; check its client id and signing key",
        }
    }
}

/// Errors returned by [`crate::TokenExchangeClient`].
#[derive(Debug, Error)]
pub enum TokenExchangeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The signing key is missing or corrupt. Never retried.
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("hop 1 (identity -> ID-JAG) failed: {0}")]
    Hop1Failed(ProviderError),

    #[error("hop 2 (ID-JAG -> access token) failed: {0}")]
    Hop2Failed(ProviderError),

    #[error("token exchange timed out after {after:?}")]
    Timeout { after: Duration },
}

const RELOGIN_ERRORS: &[&str] = &[
    "invalid_grant",
    "login_required",
    "consent_required",
    "interaction_required",
    "access_denied",
];

impl TokenExchangeError {
    #[must_use]
    pub fn hop(&self) -> Option<Hop> {
        match self {
            Self::Hop1Failed(_) => Some(Hop::IdentityToCrossDomain),
            Self::Hop2Failed(_) => Some(Hop::CrossDomainToResource),
            _ => None,
        }
    }

    #[must_use]
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Hop1Failed(e) | Self::Hop2Failed(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Timeout { .. } => Remediation::RetryLater,
            Self::Hop1Failed(e) | Self::Hop2Failed(e) if e.is_transient() => Remediation::RetryLater,
            Self::Hop1Failed(e) if RELOGIN_ERRORS.contains(&e.error.as_str()) => Remediation::Relogin,
            // Anything else hop 1 reports (invalid_client, invalid_target, ...) is ours to fix.
            Self::Configuration(_) | Self::KeyUnavailable(_) | Self::Hop1Failed(_) => {
                Remediation::FixConfiguration
            }
            Self::Hop2Failed(_) => Remediation::CheckResourceConnection,
        }
    }
}
