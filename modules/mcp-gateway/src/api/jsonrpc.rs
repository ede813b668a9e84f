//! JSON-RPC 2.0 envelopes and the MCP method table.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use xaa_security::SecurityContext;

use crate::domain::{OperationSet, Rejection, RejectionKind, TransportHandle};

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

/// Protocol revisions this server speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26"];

pub const RESOURCE_UPDATED_NOTIFICATION: &str = "notifications/resources/updated";

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Decode and check the envelope of a request body.
    ///
    /// # Errors
    /// An error response with [`PARSE_ERROR`] for invalid JSON or
    /// [`INVALID_REQUEST`] for anything that is not a single 2.0 request.
    pub fn parse(body: &[u8]) -> Result<Self, JsonRpcResponse> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| JsonRpcResponse::error(Value::Null, PARSE_ERROR, e.to_string()))?;
        if value.is_array() {
            return Err(JsonRpcResponse::error(
                Value::Null,
                INVALID_REQUEST,
                "batch requests are not supported",
            ));
        }
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: Self = serde_json::from_value(value)
            .map_err(|e| JsonRpcResponse::error(id.clone(), INVALID_REQUEST, e.to_string()))?;
        if request.jsonrpc != "2.0" {
            return Err(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "jsonrpc must be \"2.0\"",
            ));
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

#[must_use]
pub fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params })
}

/// Result of the `initialize` request.
#[must_use]
pub fn initialize_result(params: &Value, server_name: &str) -> Value {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let version = requested
        .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);
    json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false }
        },
        "serverInfo": {
            "name": server_name,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Dispatch one request on an established session.
///
/// Returns `None` for notifications. Holding `transport` for the whole call
/// keeps work on one session sequential.
pub async fn dispatch(
    request: JsonRpcRequest,
    ctx: &SecurityContext,
    operations: &OperationSet,
    transport: &mut TransportHandle,
) -> Option<JsonRpcResponse> {
    let JsonRpcRequest {
        id, method, params, ..
    } = request;
    let Some(id) = id else {
        tracing::debug!(%method, "notification received");
        return None;
    };

    let response = match method.as_str() {
        "ping" => JsonRpcResponse::result(id, json!({})),
        "tools/list" => {
            let tools: Vec<Value> = operations
                .descriptors()
                .map(|d| {
                    let mut tool = serde_json::to_value(d).unwrap_or(Value::Null);
                    tool["annotations"] = json!({ "readOnlyHint": d.is_read_only() });
                    tool
                })
                .collect();
            JsonRpcResponse::result(id, json!({ "tools": tools }))
        }
        "tools/call" => call_tool(id, &params, ctx, operations, transport).await,
        "initialize" => JsonRpcResponse::error(id, INVALID_REQUEST, "session is already initialized"),
        other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("method '{other}' not found")),
    };
    Some(response)
}

async fn call_tool(
    id: Value,
    params: &Value,
    ctx: &SecurityContext,
    operations: &OperationSet,
    transport: &mut TransportHandle,
) -> JsonRpcResponse {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "tools/call requires a string 'name'");
    };
    let args = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    match operations.call(ctx, name, args).await {
        Ok(value) => {
            if let Some(uri) = operations
                .get(name)
                .and_then(|op| op.descriptor().updates_resource.clone())
            {
                transport.publish(notification(
                    RESOURCE_UPDATED_NOTIFICATION,
                    json!({ "uri": uri }),
                ));
            }
            JsonRpcResponse::result(id, tool_result(&value))
        }
        Err(rejection) if rejection.kind == RejectionKind::UnknownOperation => {
            JsonRpcResponse::error(id, INVALID_PARAMS, rejection.message)
        }
        Err(rejection) => JsonRpcResponse::result(id, rejection_result(&rejection)),
    }
}

fn tool_result(value: &Value) -> Value {
    json!({
        "content": [{ "type": "text", "text": value.to_string() }],
        "structuredContent": value,
        "isError": false
    })
}

fn rejection_result(rejection: &Rejection) -> Value {
    json!({
        "content": [{ "type": "text", "text": rejection.message }],
        "structuredContent": { "error": rejection },
        "isError": true
    })
}
