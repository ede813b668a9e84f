//! Token models. Every token value is a `SecretString`; `Debug` never prints it.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use time::OffsetDateTime;

/// `urn:ietf:params:oauth:token-type:id-jag`
pub const ID_JAG_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id-jag";
/// `urn:ietf:params:oauth:token-type:id_token`
pub const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";

/// The human's identity token from their home identity provider.
#[derive(Debug, Clone)]
pub struct IdentityAssertion(SecretString);

impl IdentityAssertion {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Intermediate ID-JAG returned by hop 1. Held in memory for the duration of
/// hop 2 only.
#[derive(Debug)]
pub struct CrossDomainAssertion {
    pub assertion: SecretString,
    pub issued_token_type: String,
    pub expires_in: Option<u64>,
}

/// Final bearer credential for one protected resource.
#[derive(Debug, Clone)]
pub struct ResourceAccessToken {
    pub access_token: SecretString,
    pub token_type: String,
    /// The resource audience this token was requested for.
    pub audience: String,
    pub scopes: Vec<String>,
    pub expires_at: OffsetDateTime,
}

impl ResourceAccessToken {
    /// True when the token expires within `skew` from now (or already has).
    /// A skew reaching past the calendar counts as expired.
    #[must_use]
    pub fn is_expired_within(&self, skew: Duration) -> bool {
        time::Duration::try_from(skew)
            .ok()
            .and_then(|skew| self.expires_at.checked_sub(skew))
            .is_none_or(|refresh_at| refresh_at <= OffsetDateTime::now_utc())
    }

    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn token(expires_in: i64) -> ResourceAccessToken {
        ResourceAccessToken {
            access_token: SecretString::from("at-123".to_owned()),
            token_type: "Bearer".to_owned(),
            audience: "mcp://resource".to_owned(),
            scopes: vec!["mcp:connect".to_owned()],
            expires_at: OffsetDateTime::now_utc() + time::Duration::seconds(expires_in),
        }
    }

    #[test]
    fn expiry_respects_skew() {
        let t = token(60);

        assert!(!t.is_expired_within(Duration::from_secs(10)));
        assert!(t.is_expired_within(Duration::from_secs(120)));
        assert!(token(-1).is_expired_within(Duration::ZERO));
    }

    #[test]
    fn huge_skew_counts_as_expired() {
        let t = token(3600);

        assert!(t.is_expired_within(Duration::from_secs(u64::MAX)));
        assert!(t.is_expired_within(Duration::MAX));
    }

    #[test]
    fn debug_redacts_token_values() {
        let t = token(60);
        assert!(!format!("{t:?}").contains("at-123"));

        let id = IdentityAssertion::new("id-token-secret");
        assert!(!format!("{id:?}").contains("id-token-secret"));
        assert_eq!(id.expose(), "id-token-secret");
    }
}
