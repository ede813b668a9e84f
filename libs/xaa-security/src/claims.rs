//! Typed claims of a validated access token.

use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::scopes::{missing_scopes, parse_scope_list};

/// Errors raised while turning a raw claim set into [`Claims`].
#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("claim '{0}' is out of range")]
    OutOfRange(&'static str),

    #[error("claim 'aud' must not be empty")]
    EmptyAudience,

    #[error("claim 'sub' must not be empty")]
    EmptySubject,
}

/// Claims carried by a resource access token.
///
/// The registered claims the gateway relies on are named fields; anything
/// provider-specific lands in [`Claims::extra`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawClaims")]
pub struct Claims {
    /// `sub` - the human on whose behalf the agent acts.
    pub subject: String,
    /// `iss` - the authorization server that minted the token.
    pub issuer: String,
    /// `aud` - normalized to a list; a single string becomes one element.
    pub audience: Vec<String>,
    /// Granted scopes, from `scope` (space-delimited) and/or `scp` (array).
    pub scopes: Vec<String>,
    /// `exp`
    pub expires_at: OffsetDateTime,
    /// `iat`
    pub issued_at: Option<OffsetDateTime>,
    /// `nbf`
    pub not_before: Option<OffsetDateTime>,
    /// `client_id` (RFC 8693 section 4.3), the agent the token was issued to.
    pub client_id: Option<String>,
    /// `jti`
    pub jwt_id: Option<String>,
    /// Every other claim.
    pub extra: Map<String, Value>,
}

impl Claims {
    /// True when `expected` is one of the token audiences (exact match).
    #[must_use]
    pub fn audience_matches(&self, expected: &str) -> bool {
        self.audience.iter().any(|aud| aud == expected)
    }

    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Required scopes that this token does not carry.
    #[must_use]
    pub fn missing_scopes<S: AsRef<str>>(&self, required: &[S]) -> Vec<String> {
        missing_scopes(&self.scopes, required)
    }

    /// True when `exp` lies at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
struct RawClaims {
    sub: String,
    iss: String,
    aud: OneOrMany,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    scp: Option<OneOrMany>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    jti: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn timestamp(claim: &'static str, secs: i64) -> Result<OffsetDateTime, ClaimsError> {
    OffsetDateTime::from_unix_timestamp(secs).map_err(|_| ClaimsError::OutOfRange(claim))
}

impl TryFrom<RawClaims> for Claims {
    type Error = ClaimsError;

    fn try_from(raw: RawClaims) -> Result<Self, Self::Error> {
        if raw.sub.is_empty() {
            return Err(ClaimsError::EmptySubject);
        }
        let audience = raw.aud.into_vec();
        if audience.is_empty() {
            return Err(ClaimsError::EmptyAudience);
        }

        let mut scopes = raw
            .scope
            .as_deref()
            .map(parse_scope_list)
            .unwrap_or_default();
        if let Some(scp) = raw.scp {
            for s in scp.into_vec() {
                for part in parse_scope_list(&s) {
                    if !scopes.contains(&part) {
                        scopes.push(part);
                    }
                }
            }
        }

        Ok(Self {
            subject: raw.sub,
            issuer: raw.iss,
            audience,
            scopes,
            expires_at: timestamp("exp", raw.exp)?,
            issued_at: raw.iat.map(|t| timestamp("iat", t)).transpose()?,
            not_before: raw.nbf.map(|t| timestamp("nbf", t)).transpose()?,
            client_id: raw.client_id,
            jwt_id: raw.jti,
            extra: raw.extra,
        })
    }
}
