//! Reuse of resource access tokens until shortly before they expire.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use token_exchange_sdk::{
    IdentityAssertion, ResourceAccessToken, TokenExchangeClient, TokenExchangeError,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    /// SHA-256 of the identity assertion; the assertion itself is never stored.
    subject_fingerprint: String,
    first_audience: String,
    second_audience: String,
}

/// Wraps another [`TokenExchangeClient`] and caches its tokens.
///
/// There is no refresh-token path for derived tokens: a cached token within
/// `refresh_skew` of its expiry triggers a full new exchange.
pub struct TokenCache {
    inner: Arc<dyn TokenExchangeClient>,
    entries: DashMap<CacheKey, ResourceAccessToken>,
    refresh_skew: Duration,
}

impl TokenCache {
    #[must_use]
    pub fn new(inner: Arc<dyn TokenExchangeClient>, refresh_skew: Duration) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            refresh_skew,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached token for this identity assertion.
    pub fn invalidate(&self, identity_assertion: &IdentityAssertion) {
        let fingerprint = fingerprint(identity_assertion);
        self.entries
            .retain(|key, _| key.subject_fingerprint != fingerprint);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

fn fingerprint(identity_assertion: &IdentityAssertion) -> String {
    hex::encode(Sha256::digest(identity_assertion.expose().as_bytes()))
}

#[async_trait]
impl TokenExchangeClient for TokenCache {
    async fn exchange(
        &self,
        identity_assertion: &IdentityAssertion,
        first_audience: &str,
        second_audience: &str,
    ) -> Result<ResourceAccessToken, TokenExchangeError> {
        let key = CacheKey {
            subject_fingerprint: fingerprint(identity_assertion),
            first_audience: first_audience.to_owned(),
            second_audience: second_audience.to_owned(),
        };

        if let Some(cached) = self.entries.get(&key)
            && !cached.is_expired_within(self.refresh_skew)
        {
            tracing::debug!(audience = second_audience, "using cached resource token");
            return Ok(cached.clone());
        }
        self.entries.remove(&key);

        let token = self
            .inner
            .exchange(identity_assertion, first_audience, second_audience)
            .await?;
        // Entries inside the refresh window would be exchanged again anyway.
        self.entries
            .retain(|_, cached| !cached.is_expired_within(self.refresh_skew));
        self.entries.insert(key, token.clone());
        Ok(token)
    }
}
