//! Scope-gated operations exposed as MCP tools.
//!
//! Every call goes through [`OperationSet::call`], which re-runs the access
//! gate with the operation's own scopes before the operation sees the
//! request. Failures come back as a [`Rejection`] value, never as a panic or
//! an error that escapes the wrapper.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use xaa_auth::{AccessGate, AuthError};
use xaa_security::SecurityContext;

/// Static description of a tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    /// Every scope listed here must be present on the caller's token.
    #[serde(skip)]
    pub required_scopes: Vec<String>,
    /// Resource URI announced to the session after a successful call.
    /// `None` for read-only operations.
    #[serde(skip)]
    pub updates_resource: Option<String>,
}

impl OperationDescriptor {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            required_scopes: Vec::new(),
            updates_resource: None,
        }
    }

    #[must_use]
    pub fn requires(mut self, scope: &str) -> Self {
        self.required_scopes.push(scope.to_owned());
        self
    }

    #[must_use]
    pub fn updates(mut self, resource_uri: &str) -> Self {
        self.updates_resource = Some(resource_uri.to_owned());
        self
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.updates_resource.is_none()
    }
}

/// Failure of the operation itself, after the gate approved the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Internal(String),
}

#[async_trait]
pub trait ProtectedOperation: Send + Sync {
    fn descriptor(&self) -> &OperationDescriptor;

    /// Run the operation for a caller the gate has already approved.
    ///
    /// # Errors
    /// Any [`OperationError`]; it is reported to the caller as a rejection.
    async fn invoke(&self, ctx: &SecurityContext, args: Value) -> Result<Value, OperationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    Unauthenticated,
    Unauthorized,
    UnknownOperation,
    NotFound,
    InvalidArguments,
    ServiceUnavailable,
    Internal,
}

/// Structured refusal returned in place of an operation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
}

impl Rejection {
    #[must_use]
    pub fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Authentication or authorization refusal, as opposed to an operation failure.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(
            self.kind,
            RejectionKind::Unauthenticated | RejectionKind::Unauthorized
        )
    }
}

impl From<AuthError> for Rejection {
    fn from(err: AuthError) -> Self {
        let kind = match &err {
            AuthError::Unauthenticated(_) => RejectionKind::Unauthenticated,
            AuthError::Unauthorized { .. } => RejectionKind::Unauthorized,
            AuthError::KeySetUnavailable(_) => RejectionKind::ServiceUnavailable,
            AuthError::Internal(_) => RejectionKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<OperationError> for Rejection {
    fn from(err: OperationError) -> Self {
        let kind = match &err {
            OperationError::NotFound(_) => RejectionKind::NotFound,
            OperationError::InvalidArguments(_) => RejectionKind::InvalidArguments,
            OperationError::Internal(_) => RejectionKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

/// The registered operations plus the gate that guards each call.
pub struct OperationSet {
    gate: AccessGate,
    operations: Vec<Arc<dyn ProtectedOperation>>,
}

impl OperationSet {
    #[must_use]
    pub fn new(gate: AccessGate) -> Self {
        Self {
            gate,
            operations: Vec::new(),
        }
    }

    /// Add an operation. A second operation with the same name is ignored.
    #[must_use]
    pub fn with(mut self, operation: Arc<dyn ProtectedOperation>) -> Self {
        let name = &operation.descriptor().name;
        if self.get(name).is_some() {
            tracing::error!(operation = %name, "duplicate operation name, skipping");
            return self;
        }
        tracing::debug!(
            operation = %name,
            scopes = ?operation.descriptor().required_scopes,
            "operation registered"
        );
        self.operations.push(operation);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ProtectedOperation>> {
        self.operations
            .iter()
            .find(|op| op.descriptor().name == name)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.iter().map(|op| op.descriptor())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Verify the caller's token for this operation's scopes, then run it.
    ///
    /// The operation receives a context rebuilt from the freshly verified
    /// claims.
    ///
    /// # Errors
    /// A [`Rejection`] for an unknown name, a failed gate check, or an
    /// operation failure.
    #[tracing::instrument(skip_all, fields(operation = %name, subject = %ctx.subject()))]
    pub async fn call(
        &self,
        ctx: &SecurityContext,
        name: &str,
        args: Value,
    ) -> Result<Value, Rejection> {
        let operation = self.get(name).ok_or_else(|| {
            Rejection::new(
                RejectionKind::UnknownOperation,
                format!("unknown operation '{name}'"),
            )
        })?;
        let descriptor = operation.descriptor();

        let token = ctx.bearer_token().ok_or_else(|| {
            Rejection::new(RejectionKind::Unauthenticated, "no bearer token on request")
        })?;
        let claims = self
            .gate
            .verify_token(
                token.expose_secret(),
                self.gate.audience(),
                descriptor.required_scopes.as_slice(),
            )
            .await
            .map_err(|err| {
                tracing::info!(error = %err, "operation refused by access gate");
                Rejection::from(err)
            })?;
        if claims.subject != ctx.subject() {
            return Err(Rejection::new(
                RejectionKind::Unauthenticated,
                "token subject changed within the request",
            ));
        }

        let verified =
            SecurityContext::from_claims(&claims, self.gate.audience(), token.expose_secret());
        match operation.invoke(&verified, args).await {
            Ok(value) => {
                tracing::info!("operation completed");
                Ok(value)
            }
            Err(err) => {
                tracing::info!(error = %err, "operation failed");
                Err(err.into())
            }
        }
    }
}

impl std::fmt::Debug for OperationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationSet")
            .field("gate", &self.gate)
            .field(
                "operations",
                &self.descriptors().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use xaa_auth::{JwtValidator, StaticKeyProvider, ValidatorConfig, decoding_key_from_pem};
    use xaa_testkit::keys::ISSUER_PUBLIC_PEM;
    use xaa_testkit::{TEST_AUDIENCE, TEST_ISSUER, TestToken};

    use super::*;

    struct Counter {
        descriptor: OperationDescriptor,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProtectedOperation for Counter {
        fn descriptor(&self) -> &OperationDescriptor {
            &self.descriptor
        }

        async fn invoke(&self, ctx: &SecurityContext, args: Value) -> Result<Value, OperationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if args.get("missing").is_some() {
                return Err(OperationError::NotFound("no such record".to_owned()));
            }
            Ok(json!({ "subject": ctx.subject() }))
        }
    }

    fn gate() -> AccessGate {
        let key = decoding_key_from_pem(jsonwebtoken::Algorithm::EdDSA, ISSUER_PUBLIC_PEM.as_bytes())
            .unwrap();
        let validator = JwtValidator::new(
            Arc::new(StaticKeyProvider::new().with_default_key(key)),
            ValidatorConfig::new(TEST_ISSUER),
        );
        AccessGate::new(Arc::new(validator), TEST_AUDIENCE)
    }

    fn set() -> (Arc<Counter>, OperationSet) {
        let op = Arc::new(Counter {
            descriptor: OperationDescriptor::new("bump", "Bump a counter", json!({"type": "object"}))
                .requires("mcp:tools:manage")
                .updates("counter://value"),
            calls: AtomicUsize::new(0),
        });
        (op.clone(), OperationSet::new(gate()).with(op))
    }

    fn ctx_for(subject: &str, scope: &str) -> SecurityContext {
        SecurityContext::builder()
            .subject(subject)
            .scopes(scope.split(' ').map(str::to_owned).collect())
            .bearer_token(TestToken::new(subject).scope(scope).sign())
            .build()
    }

    #[tokio::test]
    async fn missing_scope_is_rejected_before_invoking() {
        let (op, set) = set();

        let rejection = set
            .call(&ctx_for("alice", "mcp:connect mcp:tools:read"), "bump", json!({}))
            .await
            .unwrap_err();

        assert_eq!(rejection.kind, RejectionKind::Unauthorized);
        assert!(rejection.is_auth());
        assert!(rejection.message.contains("mcp:tools:manage"));
        assert_eq!(op.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sufficient_scope_runs_with_verified_subject() {
        let (op, set) = set();

        let value = set
            .call(&ctx_for("alice", "mcp:connect mcp:tools:manage"), "bump", json!({}))
            .await
            .unwrap();

        assert_eq!(value, json!({ "subject": "alice" }));
        assert_eq!(op.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn operation_failure_is_not_an_auth_rejection() {
        let (_, set) = set();

        let rejection = set
            .call(
                &ctx_for("alice", "mcp:tools:manage"),
                "bump",
                json!({ "missing": true }),
            )
            .await
            .unwrap_err();

        assert_eq!(rejection.kind, RejectionKind::NotFound);
        assert!(!rejection.is_auth());
    }

    #[tokio::test]
    async fn context_without_token_is_unauthenticated() {
        let (op, set) = set();
        let ctx = SecurityContext::builder().subject("alice").build();

        let rejection = set.call(&ctx, "bump", json!({})).await.unwrap_err();

        assert_eq!(rejection.kind, RejectionKind::Unauthenticated);
        assert_eq!(op.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_name_is_reported() {
        let (_, set) = set();

        let rejection = set
            .call(&ctx_for("alice", "mcp:tools:manage"), "nope", json!({}))
            .await
            .unwrap_err();

        assert_eq!(rejection.kind, RejectionKind::UnknownOperation);
    }

    #[test]
    fn duplicate_names_are_ignored() {
        let (op, set) = set();
        let set = set.with(op);

        assert_eq!(set.len(), 1);
    }

    #[test]
    fn descriptor_serializes_as_tool_listing() {
        let d = OperationDescriptor::new("list", "List things", json!({"type": "object"}))
            .requires("mcp:tools:read");
        let v = serde_json::to_value(&d).unwrap();

        assert_eq!(v["name"], "list");
        assert_eq!(v["inputSchema"]["type"], "object");
        assert!(v.get("required_scopes").is_none());
        assert!(d.is_read_only());
    }
}
