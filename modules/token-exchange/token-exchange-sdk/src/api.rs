//! Public API trait for the token exchanger.

use async_trait::async_trait;

use crate::error::TokenExchangeError;
use crate::models::{IdentityAssertion, ResourceAccessToken};

/// Exchanges a human's identity assertion for a resource access token.
///
/// Implementations run two sequential hops against two independent
/// authorization servers:
///
/// 1. identity assertion -> cross-domain assertion (audience `first_audience`)
/// 2. cross-domain assertion -> resource access token (audience `second_audience`)
///
/// Hop 2 is never attempted unless hop 1 succeeded. Nothing is retried;
/// every attempt mints fresh client assertions.
#[async_trait]
pub trait TokenExchangeClient: Send + Sync {
    /// # Errors
    ///
    /// - `Hop1Failed` when the identity provider rejects the exchange
    /// - `Hop2Failed` when the resource authorization server rejects the assertion
    /// - `KeyUnavailable` when no client assertion can be signed
    /// - `Timeout` when both hops together exceed the configured bound
    async fn exchange(
        &self,
        identity_assertion: &IdentityAssertion,
        first_audience: &str,
        second_audience: &str,
    ) -> Result<ResourceAccessToken, TokenExchangeError>;
}
