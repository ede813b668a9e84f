//! `/mcp` transport handlers and the public endpoints.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use xaa_auth::{Authz, ProtectedResourceMetadata};
use xaa_security::SecurityContext;

use super::error::ApiError;
use super::jsonrpc::{self, JsonRpcRequest, JsonRpcResponse};
use crate::domain::{CloseReason, OperationSet, ServerEvent, Session, SessionRegistry};

pub const MCP_SESSION_ID: &str = "mcp-session-id";
pub const LAST_EVENT_ID: &str = "last-event-id";

/// Shared state of the transport handlers.
#[derive(Clone)]
pub struct TransportState {
    pub registry: Arc<SessionRegistry>,
    pub operations: Arc<OperationSet>,
    pub server_name: Arc<str>,
    pub close_on_stream_disconnect: bool,
    pub keep_alive: Duration,
}

fn session_id(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    headers
        .get(MCP_SESSION_ID)
        .map(|v| {
            v.to_str()
                .map_err(|_| ApiError::invalid_request("mcp-session-id is not valid ASCII"))
        })
        .transpose()
}

fn required_session_id(headers: &HeaderMap) -> Result<&str, ApiError> {
    session_id(headers)?.ok_or_else(|| ApiError::invalid_request("missing mcp-session-id header"))
}

fn rpc_error(status: StatusCode, response: JsonRpcResponse) -> Response {
    (status, Json(response)).into_response()
}

/// POST: `initialize` without a session id opens a session; anything else
/// must name an existing session bound to the caller.
pub async fn handle_post(
    State(state): State<TransportState>,
    Authz(ctx): Authz,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = match JsonRpcRequest::parse(&body) {
        Ok(request) => request,
        Err(response) => return Ok(rpc_error(StatusCode::BAD_REQUEST, response)),
    };

    let Some(id) = session_id(&headers)? else {
        if request.method != "initialize" || request.is_notification() {
            return Err(ApiError::invalid_request(
                "missing mcp-session-id header; only initialize may open a session",
            ));
        }
        return Ok(initialize(&state, &ctx, request));
    };
    if request.method == "initialize" {
        return Err(ApiError::invalid_request(
            "initialize must not carry an mcp-session-id",
        ));
    }

    let session = state.registry.authorize(id, ctx.subject())?;
    let mut transport = session.transport().lock().await;
    match jsonrpc::dispatch(request, &ctx, &state.operations, &mut transport).await {
        Some(response) => Ok(Json(response).into_response()),
        None => Ok(StatusCode::ACCEPTED.into_response()),
    }
}

fn initialize(state: &TransportState, ctx: &SecurityContext, request: JsonRpcRequest) -> Response {
    let session = match state.registry.create(ctx.subject()) {
        Ok(session) => session,
        Err(e) => return ApiError::from(e).into_response(),
    };
    let result = jsonrpc::initialize_result(&request.params, &state.server_name);
    let body = JsonRpcResponse::result(request.id.unwrap_or_default(), result);

    let mut response = Json(body).into_response();
    match HeaderValue::from_str(session.id()) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(HeaderName::from_static(MCP_SESSION_ID), value);
        }
        Err(e) => {
            tracing::error!(error = %e, "session id is not a valid header value");
            state.registry.close(session.id(), CloseReason::Terminated);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    response
}

/// GET: the server-to-client event stream, resumable with `Last-Event-ID`.
pub async fn handle_get(
    State(state): State<TransportState>,
    Authz(ctx): Authz,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = required_session_id(&headers)?;
    let last_event_id = headers
        .get(LAST_EVENT_ID)
        .map(|v| {
            v.to_str()
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .ok_or_else(|| ApiError::invalid_request("last-event-id must be an event number"))
        })
        .transpose()?;

    let session = state.registry.authorize(id, ctx.subject())?;
    let attachment = session.attach_stream(last_event_id).await?;
    tracing::info!(
        session_id = %session.id(),
        resumed_from = ?last_event_id,
        replayed = attachment.replay.len(),
        "event stream attached"
    );

    let guard = StreamGuard {
        session: session.clone(),
        registry: state.registry.clone(),
        close_session: state.close_on_stream_disconnect,
    };
    let stream = event_stream(&session, attachment.replay, attachment.receiver, guard);
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(state.keep_alive))
        .into_response())
}

fn event_stream(
    session: &Session,
    replay: Vec<ServerEvent>,
    receiver: tokio::sync::broadcast::Receiver<ServerEvent>,
    guard: StreamGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let session_id = session.id().to_owned();
    let live = BroadcastStream::new(receiver).filter_map(move |item| {
        let session_id = session_id.clone();
        async move {
            match item {
                Ok(event) => Some(event),
                Err(lagged) => {
                    tracing::debug!(%session_id, error = %lagged, "stream lagged, client may resume");
                    None
                }
            }
        }
    });

    futures_util::stream::iter(replay)
        .chain(live)
        .take_until(session.cancellation().cancelled_owned())
        .map(move |event| {
            let _ = &guard;
            Ok(Event::default()
                .id(event.id.to_string())
                .event("message")
                .data(event.data.to_string()))
        })
}

/// Lives as long as the response stream. Dropping it means the client went
/// away or the session closed.
struct StreamGuard {
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    close_session: bool,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.session.detach_stream();
        if self.close_session && !self.session.is_closed() {
            self.registry
                .close(self.session.id(), CloseReason::StreamDisconnected);
        } else {
            tracing::debug!(session_id = %self.session.id(), "event stream detached");
        }
    }
}

/// DELETE: explicit termination by the bound subject.
pub async fn handle_delete(
    State(state): State<TransportState>,
    Authz(ctx): Authz,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let id = required_session_id(&headers)?;
    state.registry.terminate(id, ctx.subject())?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn protected_resource_metadata(
    State(metadata): State<Arc<ProtectedResourceMetadata>>,
) -> Json<ProtectedResourceMetadata> {
    Json(metadata.as_ref().clone())
}

pub async fn health(State(registry): State<Arc<SessionRegistry>>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "sessions": registry.len() }))
}
