//! Wiring: config -> signer -> exchanger -> cache.

use std::sync::Arc;

use token_exchange_sdk::{TokenExchangeClient, TokenExchangeError};

use crate::config::TokenExchangeConfig;
use crate::domain::{AssertionSigner, TokenCache, TokenExchanger};

/// The assembled module. Holds the validated config and the client
/// consumers call.
pub struct TokenExchangeModule {
    config: TokenExchangeConfig,
    client: Arc<dyn TokenExchangeClient>,
}

impl TokenExchangeModule {
    /// Validate the config, load the signing key once, and build the cached
    /// exchanger.
    ///
    /// # Errors
    /// [`TokenExchangeError::Configuration`] for invalid settings and
    /// [`TokenExchangeError::KeyUnavailable`] for an unusable key file. Both
    /// are fatal; callers should not retry.
    pub fn init(
        config: TokenExchangeConfig,
        http: reqwest::Client,
    ) -> Result<Self, TokenExchangeError> {
        config.validate()?;
        let signer = Arc::new(AssertionSigner::load(&config)?);
        let exchanger: Arc<dyn TokenExchangeClient> =
            Arc::new(TokenExchanger::new(http, signer, &config));
        let client = Arc::new(TokenCache::new(exchanger, config.refresh_skew()));

        tracing::info!(
            client_id = %config.client_id,
            first_audience = %config.first_audience,
            second_audience = %config.second_audience,
            "token exchange module initialized"
        );
        Ok(Self { config, client })
    }

    #[must_use]
    pub fn client(&self) -> Arc<dyn TokenExchangeClient> {
        self.client.clone()
    }

    #[must_use]
    pub fn config(&self) -> &TokenExchangeConfig {
        &self.config
    }
}
