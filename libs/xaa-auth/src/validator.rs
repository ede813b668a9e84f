use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use time::OffsetDateTime;
use xaa_security::Claims;

use crate::errors::AuthError;
use crate::keys::KeyProvider;

/// Largest clock skew the validator honours. Larger settings are clamped.
pub const MAX_LEEWAY: Duration = Duration::from_secs(300);

/// Verifies a bearer token and returns its claims.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Check signature, issuer, exact audience and expiry.
    ///
    /// # Errors
    /// [`AuthError::Unauthenticated`] for any token problem,
    /// [`AuthError::KeySetUnavailable`] when keys cannot be fetched.
    async fn validate(&self, token: &str, expected_audience: &str) -> Result<Claims, AuthError>;
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Expected `iss`, compared exactly.
    pub issuer: String,
    /// Asymmetric algorithms accepted in the token header.
    pub allowed_algorithms: Vec<Algorithm>,
    /// Clock skew tolerated on `exp` and `nbf`, at most [`MAX_LEEWAY`].
    pub leeway: Duration,
}

impl ValidatorConfig {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            allowed_algorithms: vec![Algorithm::RS256, Algorithm::ES256, Algorithm::EdDSA],
            leeway: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway.min(MAX_LEEWAY);
        self
    }

    fn effective_leeway(&self) -> Duration {
        self.leeway.min(MAX_LEEWAY)
    }
}

/// JWT validator backed by a [`KeyProvider`].
pub struct JwtValidator {
    keys: Arc<dyn KeyProvider>,
    config: ValidatorConfig,
}

impl JwtValidator {
    #[must_use]
    pub fn new(keys: Arc<dyn KeyProvider>, config: ValidatorConfig) -> Self {
        Self { keys, config }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    fn validation(&self, alg: Algorithm, expected_audience: &str) -> Validation {
        let mut validation = Validation::new(alg);
        validation.algorithms = vec![alg];
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[expected_audience]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        validation.leeway = self.config.effective_leeway().as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validate(&self, token: &str, expected_audience: &str) -> Result<Claims, AuthError> {
        let header =
            decode_header(token).map_err(|_| AuthError::unauthenticated("malformed token"))?;
        if !self.config.allowed_algorithms.contains(&header.alg) {
            return Err(AuthError::unauthenticated(format!(
                "token algorithm {:?} is not accepted",
                header.alg
            )));
        }

        let key = self.keys.decoding_key(header.kid.as_deref()).await?;
        let data = decode::<Claims>(token, &key, &self.validation(header.alg, expected_audience))
            .map_err(|e| AuthError::unauthenticated(describe(e.kind())))?;
        let claims = data.claims;

        // The JWT library accepts `exp == now`; a token is already dead at its expiry instant.
        let skewed_now = OffsetDateTime::now_utc() - self.config.effective_leeway();
        if claims.is_expired_at(skewed_now) {
            return Err(AuthError::unauthenticated("token has expired"));
        }
        if !claims.audience_matches(expected_audience) {
            return Err(AuthError::unauthenticated("token audience does not match"));
        }

        tracing::debug!(sub = %claims.subject, aud = expected_audience, "token validated");
        Ok(claims)
    }
}

fn describe(kind: &ErrorKind) -> String {
    match kind {
        ErrorKind::ExpiredSignature => "token has expired".to_owned(),
        ErrorKind::ImmatureSignature => "token is not yet valid".to_owned(),
        ErrorKind::InvalidAudience => "token audience does not match".to_owned(),
        ErrorKind::InvalidIssuer => "token issuer is not trusted".to_owned(),
        ErrorKind::InvalidSignature => "token signature is invalid".to_owned(),
        ErrorKind::InvalidAlgorithm => "token algorithm is not accepted".to_owned(),
        ErrorKind::MissingRequiredClaim(claim) => format!("token is missing the '{claim}' claim"),
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            "malformed token".to_owned()
        }
        _ => "token rejected".to_owned(),
    }
}
