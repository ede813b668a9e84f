//! Two-hop exchange: identity assertion -> ID-JAG -> resource access token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use time::OffsetDateTime;
use token_exchange_sdk::{
    CrossDomainAssertion, ID_JAG_TOKEN_TYPE, ID_TOKEN_TYPE, IdentityAssertion, ProviderError,
    ResourceAccessToken, TokenExchangeClient, TokenExchangeError,
};
use url::Url;

use super::signer::{AssertionSigner, CLIENT_ASSERTION_TYPE};
use crate::config::TokenExchangeConfig;

pub const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime assumed when a token response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 300;

/// `None` when `expires_in` does not fit in a date.
fn expiry_after(now: OffsetDateTime, expires_in: u64) -> Option<OffsetDateTime> {
    let secs = i64::try_from(expires_in).ok()?;
    now.checked_add(time::Duration::seconds(secs))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    issued_token_type: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Performs the exchange against the identity provider and the resource
/// authorization server.
#[derive(Debug)]
pub struct TokenExchanger {
    http: reqwest::Client,
    signer: Arc<AssertionSigner>,
    idp_token_endpoint: Url,
    resource_token_endpoint: Url,
    resource_client_id: String,
    scope: Option<String>,
    timeout: Duration,
}

impl TokenExchanger {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        signer: Arc<AssertionSigner>,
        config: &TokenExchangeConfig,
    ) -> Self {
        Self {
            http,
            signer,
            idp_token_endpoint: config.idp_token_endpoint.clone(),
            resource_token_endpoint: config.resource_token_endpoint.clone(),
            resource_client_id: config.resource_client_id().to_owned(),
            scope: config.scope.clone(),
            timeout: config.timeout(),
        }
    }

    /// Hop 1: token exchange at the identity provider.
    async fn request_id_jag(
        &self,
        identity_assertion: &IdentityAssertion,
        first_audience: &str,
        second_audience: &str,
    ) -> Result<CrossDomainAssertion, TokenExchangeError> {
        let endpoint = self.idp_token_endpoint.as_str();
        let client_assertion = self.signer.sign(endpoint)?;
        tracing::info!(hop = 1, jti = %client_assertion.jti, %endpoint, "requesting ID-JAG");

        let mut form = vec![
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("requested_token_type", ID_JAG_TOKEN_TYPE),
            ("subject_token", identity_assertion.expose()),
            ("subject_token_type", ID_TOKEN_TYPE),
            ("audience", first_audience),
            ("resource", second_audience),
            ("client_id", self.signer.client_id()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", client_assertion.assertion.expose_secret()),
        ];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }

        let response = self
            .post_token_request(&self.idp_token_endpoint, &form)
            .await
            .map_err(TokenExchangeError::Hop1Failed)?;

        let issued = response.issued_token_type.as_deref().unwrap_or_default();
        if issued != ID_JAG_TOKEN_TYPE {
            return Err(TokenExchangeError::Hop1Failed(ProviderError {
                status: Some(200),
                error: "unexpected_token_type".to_owned(),
                error_description: Some(format!(
                    "expected issued_token_type {ID_JAG_TOKEN_TYPE}, got '{issued}'"
                )),
            }));
        }

        Ok(CrossDomainAssertion {
            assertion: SecretString::from(response.access_token),
            issued_token_type: issued.to_owned(),
            expires_in: response.expires_in,
        })
    }

    /// Hop 2: JWT bearer grant at the resource authorization server.
    async fn request_access_token(
        &self,
        id_jag: CrossDomainAssertion,
        second_audience: &str,
    ) -> Result<ResourceAccessToken, TokenExchangeError> {
        let endpoint = self.resource_token_endpoint.as_str();
        let client_assertion = self.signer.sign_as(&self.resource_client_id, endpoint)?;
        tracing::info!(hop = 2, jti = %client_assertion.jti, %endpoint, "requesting resource access token");

        let mut form = vec![
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", id_jag.assertion.expose_secret()),
            ("client_id", self.resource_client_id.as_str()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", client_assertion.assertion.expose_secret()),
        ];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }

        let response = self
            .post_token_request(&self.resource_token_endpoint, &form)
            .await
            .map_err(TokenExchangeError::Hop2Failed)?;

        let scopes = response
            .scope
            .as_deref()
            .or(self.scope.as_deref())
            .map(|s| s.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default();
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_at = expiry_after(OffsetDateTime::now_utc(), expires_in).ok_or_else(|| {
            TokenExchangeError::Hop2Failed(ProviderError {
                status: Some(200),
                error: "invalid_response".to_owned(),
                error_description: Some(format!("expires_in {expires_in} is out of range")),
            })
        })?;

        Ok(ResourceAccessToken {
            access_token: SecretString::from(response.access_token),
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_owned()),
            audience: second_audience.to_owned(),
            scopes,
            expires_at,
        })
    }

    async fn post_token_request(
        &self,
        endpoint: &Url,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, ProviderError> {
        let response = self
            .http
            .post(endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::unreachable(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_slice::<TokenResponse>(&body).map_err(|e| ProviderError {
                status: Some(status.as_u16()),
                error: "invalid_response".to_owned(),
                error_description: Some(e.to_string()),
            });
        }

        let err = match serde_json::from_slice::<ErrorResponse>(&body) {
            Ok(body) => ProviderError {
                status: Some(status.as_u16()),
                error: body.error,
                error_description: body.error_description,
            },
            Err(_) => ProviderError {
                status: Some(status.as_u16()),
                error: "http_error".to_owned(),
                error_description: status.canonical_reason().map(str::to_owned),
            },
        };
        tracing::warn!(%endpoint, error = %err, "token endpoint rejected the request");
        Err(err)
    }
}

#[async_trait]
impl TokenExchangeClient for TokenExchanger {
    #[tracing::instrument(
        skip_all,
        fields(first_audience = %first_audience, second_audience = %second_audience)
    )]
    async fn exchange(
        &self,
        identity_assertion: &IdentityAssertion,
        first_audience: &str,
        second_audience: &str,
    ) -> Result<ResourceAccessToken, TokenExchangeError> {
        if first_audience == second_audience {
            return Err(TokenExchangeError::Configuration(
                "hop audiences must differ".to_owned(),
            ));
        }

        let both_hops = async {
            let id_jag = self
                .request_id_jag(identity_assertion, first_audience, second_audience)
                .await?;
            self.request_access_token(id_jag, second_audience).await
        };

        let token = tokio::time::timeout(self.timeout, both_hops)
            .await
            .map_err(|_| {
                tracing::warn!(after = ?self.timeout, "token exchange timed out");
                TokenExchangeError::Timeout {
                    after: self.timeout,
                }
            })??;

        tracing::info!(
            audience = %token.audience,
            scopes = ?token.scopes,
            expires_at = %token.expires_at,
            "resource access token obtained"
        );
        Ok(token)
    }
}
