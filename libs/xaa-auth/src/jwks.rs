//! JWKS-backed key provider with refresh-on-unknown-kid.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::time::Instant;
use url::Url;

use crate::errors::AuthError;
use crate::keys::KeyProvider;

const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Caches the issuer's JSON Web Key Set and refetches it when a token
/// names a `kid` the cache does not know (key rotation).
///
/// Refreshes are single-flight and rate limited by `min_refresh_interval`,
/// so a flood of tokens with a bogus `kid` cannot hammer the issuer.
pub struct JwksKeyProvider {
    http: reqwest::Client,
    jwks_uri: Url,
    keys: ArcSwap<JwkSet>,
    last_refresh: parking_lot::Mutex<Option<Instant>>,
    refresh_lock: tokio::sync::Mutex<()>,
    min_refresh_interval: Duration,
}

impl JwksKeyProvider {
    #[must_use]
    pub fn new(http: reqwest::Client, jwks_uri: Url) -> Self {
        Self {
            http,
            jwks_uri,
            keys: ArcSwap::from_pointee(JwkSet { keys: Vec::new() }),
            last_refresh: parking_lot::Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    /// Number of keys currently cached.
    #[must_use]
    pub fn cached_key_count(&self) -> usize {
        self.keys.load().keys.len()
    }

    /// Fetch the key set now, regardless of the refresh interval.
    ///
    /// # Errors
    /// Returns [`AuthError::KeySetUnavailable`] when the endpoint cannot be
    /// reached or does not return a key set.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store().await
    }

    /// Refresh unless another refresh happened within the minimum interval.
    async fn refresh_if_stale(&self) -> Result<(), AuthError> {
        let _guard = self.refresh_lock.lock().await;
        let recent = self
            .last_refresh
            .lock()
            .is_some_and(|at| at.elapsed() < self.min_refresh_interval);
        if recent {
            tracing::debug!("skipping JWKS refresh, last refresh is too recent");
            return Ok(());
        }
        self.fetch_and_store().await
    }

    async fn fetch_and_store(&self) -> Result<(), AuthError> {
        tracing::debug!(url = %self.jwks_uri, "fetching JWKS");
        *self.last_refresh.lock() = Some(Instant::now());

        let response = self
            .http
            .get(self.jwks_uri.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AuthError::KeySetUnavailable(format!("JWKS fetch failed: {e}")))?;
        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(format!("JWKS is not a key set: {e}")))?;

        tracing::info!(url = %self.jwks_uri, keys = set.keys.len(), "JWKS refreshed");
        self.keys.store(Arc::new(set));
        Ok(())
    }

    fn lookup(&self, kid: Option<&str>) -> Option<Jwk> {
        let set = self.keys.load();
        match kid {
            Some(kid) => set.find(kid).cloned(),
            // Without a kid, only an unambiguous single-key set can be used.
            None if set.keys.len() == 1 => set.keys.first().cloned(),
            None => None,
        }
    }
}

#[async_trait]
impl KeyProvider for JwksKeyProvider {
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        let jwk = match self.lookup(kid) {
            Some(jwk) => jwk,
            None => {
                self.refresh_if_stale().await?;
                self.lookup(kid).ok_or_else(|| {
                    tracing::debug!(?kid, "no matching key in JWKS");
                    AuthError::unauthenticated("token signed with an unknown key")
                })?
            }
        };
        DecodingKey::from_jwk(&jwk)
            .map_err(|e| AuthError::Internal(format!("unusable key in JWKS: {e}")))
    }
}
