use std::sync::Arc;

use xaa_security::Claims;

use crate::bearer::parse_bearer;
use crate::errors::AuthError;
use crate::validator::TokenValidator;

/// Verifies bearer tokens for one protected resource.
///
/// The gate owns the resource's audience; a token minted for any other
/// audience is rejected even when it is otherwise valid.
#[derive(Clone)]
pub struct AccessGate {
    validator: Arc<dyn TokenValidator>,
    audience: String,
}

impl AccessGate {
    #[must_use]
    pub fn new(validator: Arc<dyn TokenValidator>, audience: impl Into<String>) -> Self {
        Self {
            validator,
            audience: audience.into(),
        }
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Verify a raw `Authorization` header value.
    ///
    /// # Errors
    /// [`AuthError::Unauthenticated`] when the header is absent or malformed
    /// or the token fails validation; [`AuthError::Unauthorized`] when a
    /// required scope is missing.
    pub async fn verify<S: AsRef<str> + Sync>(
        &self,
        authorization: Option<&str>,
        expected_audience: &str,
        required_scopes: &[S],
    ) -> Result<Claims, AuthError> {
        let token = authorization
            .and_then(parse_bearer)
            .ok_or_else(|| AuthError::unauthenticated("missing or malformed bearer token"))?;
        self.verify_token(token, expected_audience, required_scopes)
            .await
    }

    /// Same as [`AccessGate::verify`] for an already extracted token.
    ///
    /// # Errors
    /// See [`AccessGate::verify`].
    pub async fn verify_token<S: AsRef<str> + Sync>(
        &self,
        token: &str,
        expected_audience: &str,
        required_scopes: &[S],
    ) -> Result<Claims, AuthError> {
        let claims = self.validator.validate(token, expected_audience).await?;

        let missing = claims.missing_scopes(required_scopes);
        if !missing.is_empty() {
            tracing::debug!(sub = %claims.subject, ?missing, "token lacks required scopes");
            return Err(AuthError::Unauthorized { missing });
        }
        Ok(claims)
    }

    /// Verify against this gate's own audience.
    ///
    /// # Errors
    /// See [`AccessGate::verify`].
    pub async fn verify_for_resource<S: AsRef<str> + Sync>(
        &self,
        authorization: Option<&str>,
        required_scopes: &[S],
    ) -> Result<Claims, AuthError> {
        self.verify(authorization, &self.audience, required_scopes)
            .await
    }
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}
