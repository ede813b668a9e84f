use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use xaa_auth::{AccessGate, AuthError, extract_bearer_token};
use xaa_security::SecurityContext;

/// Shared state of the access gate middleware.
#[derive(Clone)]
pub struct GateState {
    pub gate: AccessGate,
    /// Scopes every transport call must carry.
    pub transport_scopes: Arc<[String]>,
    pub resource_metadata_url: Option<Arc<str>>,
}

/// Runs the access gate on every transport call.
///
/// On success a `SecurityContext` built from the verified claims is inserted
/// into the request extensions. On failure the request never reaches the handler.
pub async fn access_gate_middleware(
    State(state): State<GateState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(req.headers()).map(str::to_owned) else {
        return reject(
            &state,
            AuthError::unauthenticated("missing or malformed bearer token"),
        );
    };

    match state
        .gate
        .verify_token(&token, state.gate.audience(), &state.transport_scopes[..])
        .await
    {
        Ok(claims) => {
            let ctx = SecurityContext::from_claims(&claims, state.gate.audience(), &token);
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(err) => reject(&state, err),
    }
}

fn reject(state: &GateState, err: AuthError) -> Response {
    match &err {
        AuthError::Unauthenticated(reason) => tracing::debug!(%reason, "transport call not authenticated"),
        AuthError::Unauthorized { missing } => {
            tracing::debug!(?missing, "transport call lacks scope");
        }
        AuthError::KeySetUnavailable(msg) => tracing::error!("signing keys unavailable: {msg}"),
        AuthError::Internal(msg) => tracing::error!("access gate internal error: {msg}"),
    }
    err.into_response_with_metadata(state.resource_metadata_url.as_deref())
}
