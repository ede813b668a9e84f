//! Minimal streamable-HTTP MCP client: one session, JSON responses only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use serde_json::{Value, json};
use url::Url;

use crate::config::McpClientConfig;

const MCP_SESSION_ID: &str = "mcp-session-id";
const MCP_PROTOCOL_VERSION: &str = "mcp-protocol-version";

/// A session opened with `initialize`. Close it with [`McpClient::terminate`].
#[derive(Debug, Clone)]
pub struct McpSession {
    pub id: String,
    pub protocol_version: String,
    pub server_name: Option<String>,
}

pub struct McpClient {
    http: reqwest::Client,
    endpoint: Url,
    protocol_version: String,
    authorization: HeaderValue,
    next_id: AtomicU64,
}

impl McpClient {
    /// `authorization` is the full `Authorization` header value.
    ///
    /// # Errors
    /// Returns an error if the header value or HTTP client cannot be built.
    pub fn new(config: &McpClientConfig, authorization: &str) -> Result<Self> {
        let mut authorization = HeaderValue::from_str(authorization)
            .context("access token is not a valid header value")?;
        authorization.set_sensitive(true);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            protocol_version: config.protocol_version.clone(),
            authorization,
            next_id: AtomicU64::new(1),
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        session: Option<&McpSession>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, self.endpoint.clone())
            .header(AUTHORIZATION, self.authorization.clone())
            .header(ACCEPT, "application/json, text/event-stream");
        if let Some(session) = session {
            builder = builder
                .header(MCP_SESSION_ID, &session.id)
                .header(MCP_PROTOCOL_VERSION, &session.protocol_version);
        }
        builder
    }

    async fn post(&self, session: Option<&McpSession>, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .request(reqwest::Method::POST, session)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.endpoint))?;
        ensure_success(response).await
    }

    fn rpc(&self, method: &str, params: Value) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
    }

    /// Open a session and send `notifications/initialized`.
    ///
    /// # Errors
    /// Returns an error if the server refuses the call or omits the session id.
    pub async fn initialize(&self) -> Result<McpSession> {
        let body = self.rpc(
            "initialize",
            json!({
                "protocolVersion": self.protocol_version,
                "capabilities": {},
                "clientInfo": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") }
            }),
        );
        let response = self.post(None, &body).await?;
        let id = response
            .headers()
            .get(MCP_SESSION_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .context("server did not return an mcp-session-id")?;
        let result = rpc_result(response).await?;

        let session = McpSession {
            id,
            protocol_version: result["protocolVersion"]
                .as_str()
                .unwrap_or(&self.protocol_version)
                .to_owned(),
            server_name: result["serverInfo"]["name"].as_str().map(str::to_owned),
        };
        tracing::info!(
            session_id = %session.id,
            protocol = %session.protocol_version,
            server = ?session.server_name,
            "MCP session opened"
        );

        let initialized = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        self.post(Some(&session), &initialized).await?;
        Ok(session)
    }

    /// Returns the `tools/call` result, including tool-level errors
    /// (`isError: true`).
    ///
    /// # Errors
    /// Returns an error for transport failures and JSON-RPC errors.
    pub async fn call_tool(
        &self,
        session: &McpSession,
        name: &str,
        arguments: Value,
    ) -> Result<Value> {
        let body = self.rpc("tools/call", json!({ "name": name, "arguments": arguments }));
        let response = self.post(Some(session), &body).await?;
        rpc_result(response).await
    }

    /// # Errors
    /// Returns an error for transport failures and JSON-RPC errors.
    pub async fn list_tools(&self, session: &McpSession) -> Result<Value> {
        let response = self.post(Some(session), &self.rpc("tools/list", json!({}))).await?;
        rpc_result(response).await
    }

    /// # Errors
    /// Returns an error if the server refuses the termination.
    pub async fn terminate(&self, session: &McpSession) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, Some(session))
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.endpoint))?;
        ensure_success(response).await?;
        tracing::info!(session_id = %session.id, "MCP session terminated");
        Ok(())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let challenge = response
        .headers()
        .get(http::header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.text().await.unwrap_or_default();
    match (status, challenge) {
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, Some(challenge)) => {
            anyhow::bail!("MCP endpoint refused the token ({status}): {challenge}")
        }
        _ => anyhow::bail!("MCP endpoint returned {status}: {body}"),
    }
}

async fn rpc_result(response: reqwest::Response) -> Result<Value> {
    let mut body: Value = response.json().await.context("invalid JSON-RPC response")?;
    if let Some(error) = body.get("error") {
        anyhow::bail!(
            "JSON-RPC error {}: {}",
            error["code"],
            error["message"].as_str().unwrap_or("unknown error")
        );
    }
    match body.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => anyhow::bail!("JSON-RPC response has neither result nor error"),
    }
}
