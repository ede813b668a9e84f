//! Subcommand bodies. Each returns the text printed on success.

use std::path::Path;

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
use token_exchange::TokenExchangeModule;
use token_exchange_sdk::{IdentityAssertion, ResourceAccessToken};

use crate::config::AgentConfig;
use crate::mcp_client::{McpClient, McpSession};

fn read_identity_assertion(path: &Path) -> Result<IdentityAssertion> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read identity assertion {}", path.display()))?;
    let token = raw.trim();
    if token.is_empty() {
        anyhow::bail!("identity assertion file {} is empty", path.display());
    }
    Ok(IdentityAssertion::new(token))
}

/// Both hops, with the audiences from the exchange config.
///
/// # Errors
/// A [`token_exchange_sdk::TokenExchangeError`] (downcastable) when the
/// exchange fails.
pub async fn obtain_token(
    config: &AgentConfig,
    assertion_file: &Path,
) -> Result<ResourceAccessToken> {
    let assertion = read_identity_assertion(assertion_file)?;
    let http = reqwest::Client::new();
    let module = TokenExchangeModule::init(config.exchange.clone(), http)?;
    let token = module
        .client()
        .exchange(
            &assertion,
            &config.exchange.first_audience,
            &config.exchange.second_audience,
        )
        .await?;
    tracing::info!(
        audience = %token.audience,
        scopes = ?token.scopes,
        "resource access token obtained"
    );
    Ok(token)
}

fn describe(token: &ResourceAccessToken, print_token: bool) -> Result<Value> {
    let mut out = json!({
        "token_type": token.token_type,
        "audience": token.audience,
        "scopes": token.scopes,
        "expires_at": token.expires_at.format(&Rfc3339).context("unformattable expiry")?,
    });
    if print_token {
        out["access_token"] = Value::String(token.access_token.expose_secret().to_owned());
    }
    Ok(out)
}

/// # Errors
/// Exchange failures.
pub async fn exchange(
    config: &AgentConfig,
    assertion_file: &Path,
    print_token: bool,
) -> Result<String> {
    let token = obtain_token(config, assertion_file).await?;
    let out = describe(&token, print_token)?;
    serde_json::to_string_pretty(&out).context("failed to render output")
}

/// # Errors
/// Exchange or MCP failures.
pub async fn list_tools(config: &AgentConfig, assertion_file: &Path) -> Result<String> {
    let token = obtain_token(config, assertion_file).await?;
    let client = McpClient::new(&config.mcp, &token.authorization_header())?;
    let session = client.initialize().await?;
    let listed = client.list_tools(&session).await;
    close(&client, &session).await;
    serde_json::to_string_pretty(&listed?).context("failed to render output")
}

/// Exchange, open a session, call `tool`, terminate the session.
///
/// # Errors
/// Exchange or MCP failures, invalid `args`, or a tool-level error.
pub async fn call(
    config: &AgentConfig,
    assertion_file: &Path,
    tool: &str,
    args: &str,
) -> Result<String> {
    let arguments: Value = serde_json::from_str(args).context("--args must be a JSON object")?;
    if !arguments.is_object() {
        anyhow::bail!("--args must be a JSON object");
    }

    let token = obtain_token(config, assertion_file).await?;
    let client = McpClient::new(&config.mcp, &token.authorization_header())?;
    let session = client.initialize().await?;
    let result = client.call_tool(&session, tool, arguments).await;
    close(&client, &session).await;
    let result = result?;

    if result["isError"].as_bool().unwrap_or(false) {
        let error = &result["structuredContent"]["error"];
        anyhow::bail!(
            "tool '{tool}' failed ({}): {}",
            error["kind"].as_str().unwrap_or("error"),
            error["message"].as_str().unwrap_or("no details")
        );
    }
    let output = result.get("structuredContent").unwrap_or(&result);
    serde_json::to_string_pretty(output).context("failed to render output")
}

async fn close(client: &McpClient, session: &McpSession) {
    if let Err(e) = client.terminate(session).await {
        tracing::warn!(
            session_id = %session.id,
            error = %format!("{e:#}"),
            "failed to terminate MCP session"
        );
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;

    use httpmock::Method::POST;
    use httpmock::MockServer;
    use mcp_gateway::{GatewayConfig, McpGateway, OperationSet};
    use todo_tools::{TodoToolsConfig, TodoToolsModule};
    use token_exchange::TokenExchangeConfig;
    use token_exchange_sdk::{ID_JAG_TOKEN_TYPE, Remediation, TokenExchangeError};
    use tokio_util::sync::CancellationToken;
    use url::Url;
    use xaa_auth::{
        AccessGate, JwtValidator, StaticKeyProvider, ValidatorConfig, decoding_key_from_pem,
    };
    use xaa_testkit::keys::{AGENT_KID, AGENT_PRIVATE_PEM, ISSUER_PUBLIC_PEM};
    use xaa_testkit::{TEST_AUDIENCE, TEST_ISSUER, TestToken};

    use super::*;
    use crate::config::{LoggingConfig, McpClientConfig};

    const FIRST_AUDIENCE: &str = "https://as.example.test";

    struct Fixture {
        idp: MockServer,
        resource_as: MockServer,
        dir: tempfile::TempDir,
        endpoint: Url,
        cancel: CancellationToken,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    fn gate() -> AccessGate {
        let key =
            decoding_key_from_pem(jsonwebtoken::Algorithm::EdDSA, ISSUER_PUBLIC_PEM.as_bytes())
                .unwrap();
        let validator = JwtValidator::new(
            Arc::new(StaticKeyProvider::new().with_default_key(key)),
            ValidatorConfig::new(TEST_ISSUER),
        );
        AccessGate::new(Arc::new(validator), TEST_AUDIENCE)
    }

    impl Fixture {
        async fn start() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let key_path = dir.path().join("agent.pem");
            std::fs::write(&key_path, AGENT_PRIVATE_PEM).unwrap();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))
                    .unwrap();
            }
            std::fs::write(dir.path().join("id_token"), "alice-id-token\n").unwrap();

            let operations = TodoToolsModule::new(TodoToolsConfig::default())
                .unwrap()
                .register(OperationSet::new(gate()));
            let gateway =
                McpGateway::new(GatewayConfig::default(), gate(), operations, TEST_ISSUER).unwrap();
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let endpoint = Url::parse(&format!("http://{addr}/mcp")).unwrap();
            let cancel = CancellationToken::new();
            let serve_cancel = cancel.clone();
            tokio::spawn(async move { gateway.serve(listener, serve_cancel).await });

            Self {
                idp: MockServer::start_async().await,
                resource_as: MockServer::start_async().await,
                dir,
                endpoint,
                cancel,
            }
        }

        fn assertion_file(&self) -> std::path::PathBuf {
            self.dir.path().join("id_token")
        }

        fn config(&self) -> AgentConfig {
            AgentConfig {
                logging: LoggingConfig::default(),
                exchange: TokenExchangeConfig {
                    client_id: "agent-client".to_owned(),
                    resource_client_id: None,
                    key_id: AGENT_KID.to_owned(),
                    private_key_path: self.dir.path().join("agent.pem"),
                    signing_algorithm: "EdDSA".to_owned(),
                    assertion_ttl_secs: 60,
                    idp_token_endpoint: Url::parse(&self.idp.url("/token")).unwrap(),
                    resource_token_endpoint: Url::parse(&self.resource_as.url("/token")).unwrap(),
                    first_audience: FIRST_AUDIENCE.to_owned(),
                    second_audience: TEST_AUDIENCE.to_owned(),
                    scope: None,
                    timeout_secs: 5,
                    refresh_skew_secs: 60,
                },
                mcp: McpClientConfig {
                    endpoint: self.endpoint.clone(),
                    protocol_version: "2025-06-18".to_owned(),
                    timeout_secs: 5,
                },
            }
        }

        async fn grant(&self, scope: &str) {
            self.idp
                .mock_async(|when, then| {
                    when.method(POST).path("/token");
                    then.status(200).json_body(json!({
                        "access_token": "id-jag-123",
                        "issued_token_type": ID_JAG_TOKEN_TYPE,
                        "token_type": "N_A",
                        "expires_in": 300
                    }));
                })
                .await;
            let access_token = TestToken::new("alice").scope(scope).sign();
            self.resource_as
                .mock_async(|when, then| {
                    when.method(POST).path("/token");
                    then.status(200).json_body(json!({
                        "access_token": access_token,
                        "token_type": "Bearer",
                        "expires_in": 300,
                        "scope": scope
                    }));
                })
                .await;
        }
    }

    #[tokio::test]
    async fn exchange_prints_metadata_without_the_token() {
        let fx = Fixture::start().await;
        fx.grant("mcp:connect mcp:tools:read").await;

        let out = exchange(&fx.config(), &fx.assertion_file(), false).await.unwrap();
        let out: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(out["audience"], TEST_AUDIENCE);
        assert_eq!(out["scopes"], json!(["mcp:connect", "mcp:tools:read"]));
        assert!(out.get("access_token").is_none());

        let out = exchange(&fx.config(), &fx.assertion_file(), true).await.unwrap();
        let out: Value = serde_json::from_str(&out).unwrap();
        assert!(out["access_token"].as_str().is_some_and(|t| t.split('.').count() == 3));
    }

    #[tokio::test]
    async fn call_creates_a_todo_through_the_protected_endpoint() {
        let fx = Fixture::start().await;
        fx.grant("mcp:connect mcp:tools:read mcp:tools:manage").await;

        let out = call(
            &fx.config(),
            &fx.assertion_file(),
            "create_todo",
            r#"{"title":"milk"}"#,
        )
            .await
            .unwrap();
        let todo: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(todo["title"], "milk");
        assert_eq!(todo["owner"], "alice");

        let out = list_tools(&fx.config(), &fx.assertion_file()).await.unwrap();
        let tools: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(tools["tools"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn read_only_grant_cannot_create() {
        let fx = Fixture::start().await;
        fx.grant("mcp:connect mcp:tools:read").await;

        let err = call(
            &fx.config(),
            &fx.assertion_file(),
            "create_todo",
            r#"{"title":"milk"}"#,
        )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unauthorized"), "{err:#}");
    }

    #[tokio::test]
    async fn hop1_rejection_carries_a_relogin_hint() {
        let fx = Fixture::start().await;
        fx.idp
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(400).json_body(json!({ "error": "invalid_grant" }));
            })
            .await;

        let err = exchange(&fx.config(), &fx.assertion_file(), false).await.unwrap_err();
        let exchange_error = err.downcast_ref::<TokenExchangeError>().unwrap();
        assert_eq!(exchange_error.remediation(), Remediation::Relogin);
    }

    #[tokio::test]
    async fn arguments_must_be_a_json_object() {
        let fx = Fixture::start().await;
        let err = call(&fx.config(), &fx.assertion_file(), "list_todos", "[1]")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn empty_assertion_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_token");
        std::fs::write(&path, "  \n").unwrap();
        assert!(read_identity_assertion(&path).is_err());
    }
}
