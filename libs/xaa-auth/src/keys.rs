use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};

use crate::errors::AuthError;

/// Source of verification keys for the issuer's signatures.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Resolve the key for the `kid` found in a token header.
    ///
    /// Returns [`AuthError::Unauthenticated`] when the key is unknown, and
    /// [`AuthError::KeySetUnavailable`] when the key source cannot be reached.
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError>;
}

/// Fixed set of keys known up front (configured public key, tests).
#[derive(Clone, Default)]
pub struct StaticKeyProvider {
    by_kid: HashMap<String, DecodingKey>,
    default_key: Option<DecodingKey>,
}

impl StaticKeyProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key(mut self, kid: impl Into<String>, key: DecodingKey) -> Self {
        self.by_kid.insert(kid.into(), key);
        self
    }

    /// Key used for tokens without a `kid`.
    #[must_use]
    pub fn with_default_key(mut self, key: DecodingKey) -> Self {
        self.default_key = Some(key);
        self
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        let key = match kid {
            Some(kid) => self.by_kid.get(kid).or(self.default_key.as_ref()),
            None => self.default_key.as_ref(),
        };
        key.cloned()
            .ok_or_else(|| AuthError::unauthenticated("token signed with an unknown key"))
    }
}

/// Parse a PEM public key for the given algorithm family.
///
/// # Errors
/// Returns [`AuthError::Internal`] when the PEM does not hold a key usable
/// with `alg`.
pub fn decoding_key_from_pem(alg: Algorithm, pem: &[u8]) -> Result<DecodingKey, AuthError> {
    let key = match alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem),
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
        _ => {
            return Err(AuthError::Internal(
                "symmetric algorithms are not accepted for access tokens".to_owned(),
            ));
        }
    };
    key.map_err(|e| AuthError::Internal(format!("invalid public key PEM: {e}")))
}
