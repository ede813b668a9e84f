//! Client assertion signing (RFC 7523 section 2.2).

use std::path::Path;
use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use secrecy::SecretString;
use serde::Serialize;
use time::OffsetDateTime;
use token_exchange_sdk::TokenExchangeError;

use crate::config::{MAX_ASSERTION_TTL_SECS, TokenExchangeConfig};

/// `urn:ietf:params:oauth:client-assertion-type:jwt-bearer`
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// A signed, single-use client assertion.
#[derive(Debug)]
pub struct ClientAssertion {
    pub assertion: SecretString,
    pub jti: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    jti: &'a str,
    iat: i64,
    exp: i64,
}

/// Holds the agent's private key, loaded once, and mints client assertions.
pub struct AssertionSigner {
    client_id: String,
    key_id: String,
    algorithm: Algorithm,
    key: EncodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for AssertionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionSigner")
            .field("client_id", &self.client_id)
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl AssertionSigner {
    /// Read and parse the configured private key.
    ///
    /// # Errors
    /// [`TokenExchangeError::KeyUnavailable`] when the file is missing,
    /// unreadable or not a key for the configured algorithm;
    /// [`TokenExchangeError::Configuration`] for invalid settings.
    pub fn load(config: &TokenExchangeConfig) -> Result<Self, TokenExchangeError> {
        let algorithm = config.algorithm()?;
        let path = config.private_key_path.as_path();
        let pem = std::fs::read(path).map_err(|e| {
            TokenExchangeError::KeyUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        warn_if_key_file_is_shared(path);

        let signer = Self::from_pem(
            &config.client_id,
            &config.key_id,
            algorithm,
            &pem,
            config.assertion_ttl(),
        )?;
        tracing::info!(
            key_id = %config.key_id,
            algorithm = ?algorithm,
            path = %path.display(),
            "client assertion signing key loaded"
        );
        Ok(signer)
    }

    /// # Errors
    /// See [`AssertionSigner::load`].
    pub fn from_pem(
        client_id: &str,
        key_id: &str,
        algorithm: Algorithm,
        pem: &[u8],
        ttl: Duration,
    ) -> Result<Self, TokenExchangeError> {
        if key_id.trim().is_empty() {
            return Err(TokenExchangeError::Configuration(
                "key_id must not be empty".to_owned(),
            ));
        }
        if ttl.is_zero() || ttl.as_secs() > MAX_ASSERTION_TTL_SECS {
            return Err(TokenExchangeError::Configuration(format!(
                "client assertion ttl must be between 1 and {MAX_ASSERTION_TTL_SECS} seconds"
            )));
        }
        let key = match algorithm {
            Algorithm::RS256 => EncodingKey::from_rsa_pem(pem),
            Algorithm::ES256 => EncodingKey::from_ec_pem(pem),
            Algorithm::EdDSA => EncodingKey::from_ed_pem(pem),
            other => {
                return Err(TokenExchangeError::Configuration(format!(
                    "unsupported signing algorithm {other:?}"
                )));
            }
        }
        .map_err(|e| TokenExchangeError::KeyUnavailable(format!("cannot parse private key: {e}")))?;

        Ok(Self {
            client_id: client_id.to_owned(),
            key_id: key_id.to_owned(),
            algorithm,
            key,
            ttl,
        })
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Sign an assertion for `audience`, which must be the literal URL of
    /// the token endpoint being called.
    ///
    /// # Errors
    /// [`TokenExchangeError::KeyUnavailable`] if signing fails.
    pub fn sign(&self, audience: &str) -> Result<ClientAssertion, TokenExchangeError> {
        self.sign_as(&self.client_id, audience)
    }

    /// Like [`AssertionSigner::sign`] with `iss = sub = client_id`, for a
    /// server where the agent is registered under another client id.
    ///
    /// # Errors
    /// [`TokenExchangeError::KeyUnavailable`] if signing fails.
    pub fn sign_as(
        &self,
        client_id: &str,
        audience: &str,
    ) -> Result<ClientAssertion, TokenExchangeError> {
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.ttl;
        let jti = uuid::Uuid::new_v4().to_string();

        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.key_id.clone());
        let claims = AssertionClaims {
            iss: client_id,
            sub: client_id,
            aud: audience,
            jti: &jti,
            iat: now.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };
        let assertion = encode(&header, &claims, &self.key)
            .map_err(|e| TokenExchangeError::KeyUnavailable(format!("signing failed: {e}")))?;

        tracing::debug!(%jti, aud = audience, "client assertion minted");
        Ok(ClientAssertion {
            assertion: SecretString::from(assertion),
            jti,
            expires_at,
        })
    }
}

#[cfg(unix)]
fn warn_if_key_file_is_shared(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            let mode = format!("{:o}", mode & 0o777);
            tracing::warn!(
                path = %path.display(),
                %mode,
                "private key file is accessible by group or others; restrict it to 0600"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_key_file_is_shared(_path: &Path) {}
