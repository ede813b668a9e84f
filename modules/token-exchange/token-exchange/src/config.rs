use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use token_exchange_sdk::TokenExchangeError;
use url::Url;

/// Upper bound for a client assertion's lifetime.
pub const MAX_ASSERTION_TTL_SECS: u64 = 300;
pub const MAX_REFRESH_SKEW_SECS: u64 = 86_400;

/// Configuration for the token exchange module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenExchangeConfig {
    /// The agent's client id at the identity provider.
    pub client_id: String,

    /// The agent's client id at the resource authorization server.
    /// Defaults to `client_id`.
    #[serde(default)]
    pub resource_client_id: Option<String>,

    /// `kid` of the registered public key. Required; there is no placeholder default.
    pub key_id: String,

    /// PEM private key used to sign client assertions. Should be mode 0600.
    pub private_key_path: PathBuf,

    #[serde(default = "default_signing_algorithm")]
    pub signing_algorithm: String,

    #[serde(default = "default_assertion_ttl_secs")]
    pub assertion_ttl_secs: u64,

    /// Token endpoint of the human's identity provider (hop 1).
    pub idp_token_endpoint: Url,

    /// Token endpoint of the resource authorization server (hop 2).
    pub resource_token_endpoint: Url,

    /// Audience of the ID-JAG: the resource authorization server's identifier.
    pub first_audience: String,

    /// Audience of the final access token: the protected resource.
    pub second_audience: String,

    /// Space-delimited scope hint sent on both hops.
    #[serde(default)]
    pub scope: Option<String>,

    /// Wall-clock bound for both hops together.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Cached tokens this close to expiry are exchanged again.
    #[serde(default = "default_refresh_skew_secs")]
    pub refresh_skew_secs: u64,
}

fn default_signing_algorithm() -> String {
    "RS256".to_owned()
}

fn default_assertion_ttl_secs() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_refresh_skew_secs() -> u64 {
    60
}

impl TokenExchangeConfig {
    /// # Errors
    /// Returns [`TokenExchangeError::Configuration`] naming the first invalid setting.
    pub fn validate(&self) -> Result<(), TokenExchangeError> {
        let fail = |msg: &str| Err(TokenExchangeError::Configuration(msg.to_owned()));

        if self.client_id.trim().is_empty() {
            return fail("client_id must not be empty");
        }
        if self
            .resource_client_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return fail("resource_client_id must not be empty when set");
        }
        if self.key_id.trim().is_empty() {
            return fail("key_id must not be empty");
        }
        if self.private_key_path.as_os_str().is_empty() {
            return fail("private_key_path must be set");
        }
        self.algorithm()?;
        if self.assertion_ttl_secs == 0 || self.assertion_ttl_secs > MAX_ASSERTION_TTL_SECS {
            return Err(TokenExchangeError::Configuration(format!(
                "assertion_ttl_secs must be between 1 and {MAX_ASSERTION_TTL_SECS}"
            )));
        }
        for (name, url) in [
            ("idp_token_endpoint", &self.idp_token_endpoint),
            ("resource_token_endpoint", &self.resource_token_endpoint),
        ] {
            if !matches!(url.scheme(), "https" | "http") {
                return Err(TokenExchangeError::Configuration(format!(
                    "{name} must be an http(s) URL"
                )));
            }
        }
        if self.second_audience.trim().is_empty() {
            return fail("second_audience must not be empty");
        }
        if self.first_audience.trim().is_empty() {
            return fail("first_audience must not be empty");
        }
        if self.first_audience == self.second_audience {
            return fail("first_audience and second_audience must differ");
        }
        if self.timeout_secs == 0 {
            return fail("timeout_secs must be positive");
        }
        if self.refresh_skew_secs > MAX_REFRESH_SKEW_SECS {
            return Err(TokenExchangeError::Configuration(format!(
                "refresh_skew_secs must be at most {MAX_REFRESH_SKEW_SECS}"
            )));
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`TokenExchangeError::Configuration`] for unknown or symmetric algorithms.
    pub fn algorithm(&self) -> Result<Algorithm, TokenExchangeError> {
        let alg = Algorithm::from_str(&self.signing_algorithm).map_err(|_| {
            TokenExchangeError::Configuration(format!(
                "unsupported signing_algorithm '{}'",
                self.signing_algorithm
            ))
        })?;
        match alg {
            Algorithm::RS256 | Algorithm::ES256 | Algorithm::EdDSA => Ok(alg),
            _ => Err(TokenExchangeError::Configuration(format!(
                "signing_algorithm must be RS256, ES256 or EdDSA, got '{}'",
                self.signing_algorithm
            ))),
        }
    }

    #[must_use]
    pub fn resource_client_id(&self) -> &str {
        self.resource_client_id.as_deref().unwrap_or(&self.client_id)
    }

    #[must_use]
    pub fn assertion_ttl(&self) -> Duration {
        Duration::from_secs(self.assertion_ttl_secs)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.refresh_skew_secs)
    }
}
