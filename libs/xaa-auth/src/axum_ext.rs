//! Axum extractor for handlers behind the access gate middleware.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use xaa_security::SecurityContext;

use crate::errors::AuthError;

/// Extractor for `SecurityContext` - fails if the gate middleware has not run.
#[derive(Debug, Clone)]
pub struct Authz(pub SecurityContext);

impl<S> FromRequestParts<S> for Authz
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .map(Authz)
            .ok_or(AuthError::Internal(
                "SecurityContext not found - access gate middleware not configured".to_owned(),
            ))
    }
}
