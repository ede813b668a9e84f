use secrecy::SecretString;

use crate::claims::Claims;

/// `SecurityContext` carries the verified identity of a request into protected code.
///
/// Built by the access gate after a bearer token passed validation. Protected
/// operations use it to scope their data to the calling subject.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SecurityContext {
    /// Subject - the human the agent is acting for. Empty for anonymous contexts.
    subject: String,
    /// Audience the token was verified against.
    audience: Option<String>,
    /// Scopes granted to the token.
    #[serde(default)]
    scopes: Vec<String>,
    /// Agent client the token was issued to, when the issuer says so.
    client_id: Option<String>,
    /// Original bearer token. Never serialized/persisted; `Debug` redacts it.
    #[serde(skip)]
    bearer_token: Option<SecretString>,
}

impl SecurityContext {
    #[must_use]
    pub fn builder() -> SecurityContextBuilder {
        SecurityContextBuilder::default()
    }

    /// An unauthenticated context with no subject and no scopes.
    #[must_use]
    pub fn anonymous() -> Self {
        SecurityContextBuilder::default().build()
    }

    /// Build a context from claims the gate verified for `audience`.
    #[must_use]
    pub fn from_claims(claims: &Claims, audience: &str, bearer_token: &str) -> Self {
        let mut builder = Self::builder()
            .subject(&claims.subject)
            .audience(audience)
            .scopes(claims.scopes.clone())
            .bearer_token(bearer_token.to_owned());
        if let Some(client_id) = &claims.client_id {
            builder = builder.client_id(client_id);
        }
        builder.build()
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.subject.is_empty()
    }

    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    #[must_use]
    pub fn bearer_token(&self) -> Option<&SecretString> {
        self.bearer_token.as_ref()
    }
}

#[derive(Default)]
pub struct SecurityContextBuilder {
    subject: Option<String>,
    audience: Option<String>,
    scopes: Vec<String>,
    client_id: Option<String>,
    bearer_token: Option<SecretString>,
}

impl SecurityContextBuilder {
    #[must_use]
    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_owned());
        self
    }

    #[must_use]
    pub fn audience(mut self, audience: &str) -> Self {
        self.audience = Some(audience.to_owned());
        self
    }

    #[must_use]
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn client_id(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_owned());
        self
    }

    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<SecretString>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn build(self) -> SecurityContext {
        SecurityContext {
            subject: self.subject.unwrap_or_default(),
            audience: self.audience,
            scopes: self.scopes,
            client_id: self.client_id,
            bearer_token: self.bearer_token,
        }
    }
}
