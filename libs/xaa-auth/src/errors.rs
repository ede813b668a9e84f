use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::problem::Problem;

/// Access gate failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Missing, malformed, badly signed, wrong-issuer, wrong-audience or expired token.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The token is valid but lacks one or more required scopes.
    #[error("insufficient scope, missing: {}", missing.join(" "))]
    Unauthorized { missing: Vec<String> },

    /// The issuer's key set could not be obtained.
    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated(reason.into())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Unauthorized { .. } => StatusCode::FORBIDDEN,
            Self::KeySetUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error kind used in problem documents and tool rejections.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Unauthorized { .. } => "unauthorized",
            Self::KeySetUnavailable(_) => "service_unavailable",
            Self::Internal(_) => "internal",
        }
    }

    /// `WWW-Authenticate` challenge (RFC 6750 section 3, RFC 9728 section 5.1).
    #[must_use]
    pub fn www_authenticate(&self, resource_metadata: Option<&str>) -> Option<String> {
        let mut challenge = match self {
            Self::Unauthenticated(_) => r#"Bearer error="invalid_token""#.to_owned(),
            Self::Unauthorized { missing } => format!(
                r#"Bearer error="insufficient_scope", scope="{}""#,
                missing.join(" ")
            ),
            Self::KeySetUnavailable(_) | Self::Internal(_) => return None,
        };
        if let Some(url) = resource_metadata {
            challenge.push_str(&format!(r#", resource_metadata="{url}""#));
        }
        Some(challenge)
    }

    /// Client-facing detail. Internal causes are not echoed back.
    fn public_detail(&self) -> String {
        match self {
            Self::Unauthenticated(reason) => reason.clone(),
            Self::Unauthorized { missing } => {
                format!("token lacks required scope(s): {}", missing.join(" "))
            }
            Self::KeySetUnavailable(_) => "authorization server keys are unavailable".to_owned(),
            Self::Internal(_) => "internal authentication error".to_owned(),
        }
    }

    /// Render as a problem response, adding the `resource_metadata` hint to the challenge.
    #[must_use]
    pub fn into_response_with_metadata(self, resource_metadata: Option<&str>) -> Response {
        let challenge = self.www_authenticate(resource_metadata);
        let status = self.status();
        let title = status.canonical_reason().unwrap_or("Error");
        let mut resp = Problem::new(status, title, self.public_detail(), self.code()).into_response();
        if let Some(value) = challenge.and_then(|c| HeaderValue::from_str(&c).ok()) {
            resp.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        resp
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            Self::Unauthenticated(reason) => tracing::debug!(%reason, "request not authenticated"),
            Self::Unauthorized { missing } => {
                tracing::debug!(missing = ?missing, "request lacks scope");
            }
            Self::KeySetUnavailable(msg) => tracing::error!("signing keys unavailable: {msg}"),
            Self::Internal(msg) => tracing::error!("auth internal error: {msg}"),
        }
        self.into_response_with_metadata(None)
    }
}
