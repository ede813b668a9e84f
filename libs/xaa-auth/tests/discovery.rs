#![allow(clippy::unwrap_used, clippy::expect_used)]

use httpmock::Method::GET;
use httpmock::MockServer;
use serde_json::json;
use url::Url;
use xaa_auth::{AuthorizationServerMetadata, DiscoveryError};

#[tokio::test]
async fn discovers_oauth_metadata_first() {
    let server = MockServer::start_async().await;
    let issuer = server.base_url();
    let oauth = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/.well-known/oauth-authorization-server");
            then.status(200).json_body(json!({
                "issuer": issuer,
                "token_endpoint": format!("{issuer}/token"),
                "jwks_uri": format!("{issuer}/jwks"),
                "scopes_supported": ["mcp:connect", "mcp:tools:read"]
            }));
        })
        .await;

    let metadata =
        AuthorizationServerMetadata::discover(&reqwest::Client::new(), &Url::parse(&issuer).unwrap())
            .await
            .unwrap();

    oauth.assert_async().await;
    assert_eq!(metadata.issuer, issuer);
    assert_eq!(
        metadata.jwks_uri.unwrap().as_str(),
        format!("{issuer}/jwks")
    );
    assert_eq!(metadata.scopes_supported.len(), 2);
}

#[tokio::test]
async fn falls_back_to_openid_configuration() {
    let server = MockServer::start_async().await;
    let issuer = server.url("/oauth2/default");
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/.well-known/oauth-authorization-server/oauth2/default");
            then.status(404);
        })
        .await;
    let oidc = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/oauth2/default/.well-known/openid-configuration");
            then.status(200).json_body(json!({
                "issuer": issuer,
                "jwks_uri": format!("{issuer}/v1/keys")
            }));
        })
        .await;

    let metadata =
        AuthorizationServerMetadata::discover(&reqwest::Client::new(), &Url::parse(&issuer).unwrap())
            .await
            .unwrap();

    oidc.assert_async().await;
    assert!(metadata.token_endpoint.is_none());
}

#[tokio::test]
async fn foreign_issuer_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/.well-known/oauth-authorization-server");
            then.status(200)
                .json_body(json!({ "issuer": "https://evil.example" }));
        })
        .await;

    let err = AuthorizationServerMetadata::discover(
        &reqwest::Client::new(),
        &Url::parse(&server.base_url()).unwrap(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DiscoveryError::IssuerMismatch { .. }));
}

#[tokio::test]
async fn missing_metadata_is_not_found() {
    let server = MockServer::start_async().await;

    let err = AuthorizationServerMetadata::discover(
        &reqwest::Client::new(),
        &Url::parse(&server.base_url()).unwrap(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DiscoveryError::NotFound(_)));
}
