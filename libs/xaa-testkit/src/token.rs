use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;

use crate::keys::{AGENT_PRIVATE_PEM, ISSUER_KID, ISSUER_PRIVATE_PEM};
use crate::{TEST_AUDIENCE, TEST_ISSUER};

/// Builder for signed resource access tokens.
///
/// Defaults: issuer [`TEST_ISSUER`], audience [`TEST_AUDIENCE`], five
/// minutes of validity, signed by the issuer key.
#[derive(Debug, Clone)]
pub struct TestToken {
    subject: String,
    issuer: String,
    audience: Value,
    scope: Option<String>,
    expires_at: i64,
    kid: Option<String>,
    private_pem: &'static str,
    extra: Map<String, Value>,
}

impl TestToken {
    #[must_use]
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_owned(),
            issuer: TEST_ISSUER.to_owned(),
            audience: Value::String(TEST_AUDIENCE.to_owned()),
            scope: None,
            expires_at: OffsetDateTime::now_utc().unix_timestamp() + 300,
            kid: Some(ISSUER_KID.to_owned()),
            private_pem: ISSUER_PRIVATE_PEM,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn issuer(mut self, issuer: &str) -> Self {
        self.issuer = issuer.to_owned();
        self
    }

    #[must_use]
    pub fn audience(mut self, audience: &str) -> Self {
        self.audience = Value::String(audience.to_owned());
        self
    }

    #[must_use]
    pub fn audiences(mut self, audiences: &[&str]) -> Self {
        self.audience = json!(audiences);
        self
    }

    /// Space-delimited `scope` claim.
    #[must_use]
    pub fn scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_owned());
        self
    }

    #[must_use]
    pub fn expires_in(mut self, secs: i64) -> Self {
        self.expires_at = OffsetDateTime::now_utc().unix_timestamp() + secs;
        self
    }

    /// Expired two minutes ago.
    #[must_use]
    pub fn expired(self) -> Self {
        self.expires_in(-120)
    }

    #[must_use]
    pub fn kid(mut self, kid: Option<&str>) -> Self {
        self.kid = kid.map(str::to_owned);
        self
    }

    /// Sign with the agent key while keeping the issuer `kid`, producing a
    /// token whose signature does not verify.
    #[must_use]
    pub fn signed_by_wrong_key(mut self) -> Self {
        self.private_pem = AGENT_PRIVATE_PEM;
        self
    }

    #[must_use]
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_owned(), value);
        self
    }

    #[must_use]
    pub fn sign(self) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut claims = self.extra;
        claims.insert("sub".to_owned(), json!(self.subject));
        claims.insert("iss".to_owned(), json!(self.issuer));
        claims.insert("aud".to_owned(), self.audience);
        claims.insert("iat".to_owned(), json!(now));
        claims.insert("exp".to_owned(), json!(self.expires_at));
        claims.insert("jti".to_owned(), json!(uuid::Uuid::new_v4().to_string()));
        if let Some(scope) = self.scope {
            claims.insert("scope".to_owned(), json!(scope));
        }

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = self.kid;
        let key = EncodingKey::from_ed_pem(self.private_pem.as_bytes()).unwrap();
        encode(&header, &Value::Object(claims), &key).unwrap()
    }
}
