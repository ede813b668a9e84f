use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use xaa_auth::discovery::PROTECTED_RESOURCE_WELL_KNOWN;
use xaa_auth::{AccessGate, ProtectedResourceMetadata};

use crate::api::auth::{GateState, access_gate_middleware};
use crate::api::handlers::{
    TransportState, handle_delete, handle_get, handle_post, health, protected_resource_metadata,
};
use crate::config::GatewayConfig;
use crate::domain::{OperationSet, SessionRegistry};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// The protected MCP endpoint: owns the session registry and builds the router.
pub struct McpGateway {
    config: GatewayConfig,
    gate: AccessGate,
    registry: Arc<SessionRegistry>,
    operations: Arc<OperationSet>,
    metadata: Arc<ProtectedResourceMetadata>,
    server_name: Arc<str>,
}

impl McpGateway {
    /// # Errors
    /// Returns an error if the config is invalid or the gate guards a
    /// different audience than the configured resource.
    pub fn new(
        config: GatewayConfig,
        gate: AccessGate,
        operations: OperationSet,
        authorization_server: &str,
    ) -> Result<Self> {
        config.validate()?;
        if gate.audience() != config.resource {
            anyhow::bail!(
                "access gate audience '{}' does not match gateway.resource '{}'",
                gate.audience(),
                config.resource
            );
        }

        let mut metadata = ProtectedResourceMetadata::new(&config.resource, authorization_server)
            .with_scopes(config.scopes_supported.clone());
        if let Some(name) = &config.resource_name {
            metadata = metadata.with_name(name);
        }
        let server_name: Arc<str> = config
            .resource_name
            .as_deref()
            .unwrap_or(env!("CARGO_PKG_NAME"))
            .into();

        Ok(Self {
            registry: Arc::new(
                SessionRegistry::new(config.history_limit)
                    .with_max_per_subject(config.max_sessions_per_subject),
            ),
            operations: Arc::new(operations),
            metadata: Arc::new(metadata),
            server_name,
            config,
            gate,
        })
    }

    #[must_use]
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Transport routes behind the access gate, plus the public routes.
    #[must_use]
    pub fn build_router(&self) -> Router {
        let transport_state = TransportState {
            registry: self.registry.clone(),
            operations: self.operations.clone(),
            server_name: self.server_name.clone(),
            close_on_stream_disconnect: self.config.close_on_stream_disconnect,
            keep_alive: Duration::from_secs(self.config.keep_alive_secs),
        };
        let gate_state = GateState {
            gate: self.gate.clone(),
            transport_scopes: self.config.transport_scopes.clone().into(),
            resource_metadata_url: self
                .config
                .resource_metadata_url()
                .map(|u| Arc::from(u.as_str())),
        };

        let transport = Router::new()
            .route(
                &self.config.path,
                get(handle_get).post(handle_post).delete(handle_delete),
            )
            .route_layer(from_fn_with_state(gate_state, access_gate_middleware))
            .with_state(transport_state);

        // RFC 9728 allows the resource path as a suffix of the well-known path.
        let metadata_suffixed = format!("{PROTECTED_RESOURCE_WELL_KNOWN}{}", self.config.path);
        let public = Router::new()
            .route(PROTECTED_RESOURCE_WELL_KNOWN, get(protected_resource_metadata))
            .route(&metadata_suffixed, get(protected_resource_metadata))
            .with_state(self.metadata.clone())
            .merge(
                Router::new()
                    .route("/health", get(health))
                    .with_state(self.registry.clone()),
            );

        self.apply_middleware_stack(transport.merge(public))
    }

    /// Layers are added innermost first; the last one added runs first.
    ///
    /// Request order: `SetRequestId -> PropagateRequestId -> Trace -> Timeout -> BodyLimit -> Router`.
    fn apply_middleware_stack(&self, mut router: Router) -> Router {
        // 3) Body limit
        router = router.layer(RequestBodyLimitLayer::new(self.config.body_limit_bytes));
        router = router.layer(DefaultBodyLimit::max(self.config.body_limit_bytes));

        // 2) Timeout. Bounds the time to response headers; open event streams are unaffected.
        router = router.layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::GATEWAY_TIMEOUT,
            Duration::from_secs(self.config.request_timeout_secs),
        ));

        // 1) Trace
        router = router.layer({
            use tower_http::trace::TraceLayer;
            use tracing::field::Empty;

            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<axum::body::Body>| {
                    let rid = req
                        .headers()
                        .get(REQUEST_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("n/a");
                    let session_id = req
                        .headers()
                        .get(crate::api::handlers::MCP_SESSION_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");

                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        uri = %req.uri().path(),
                        request_id = %rid,
                        session_id = %session_id,
                        status = Empty,
                        latency_ms = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<axum::body::Body>,
                     latency: Duration,
                     span: &tracing::Span| {
                        span.record("status", res.status().as_u16());
                        span.record("latency_ms", latency.as_millis());
                    },
                )
        });

        // 0) Request ID: generate x-request-id if missing, echo it on the response.
        let x_request_id = axum::http::HeaderName::from_static(REQUEST_ID_HEADER);
        router = router.layer(PropagateRequestIdLayer::new(x_request_id.clone()));
        router = router.layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

        router
    }

    /// Serve on `listener` until `cancel` fires, then close every session so
    /// open streams end and graceful shutdown can complete.
    ///
    /// # Errors
    /// Returns an error if the server fails.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let addr = listener.local_addr().context("listener has no local address")?;
        let router = self.build_router();
        tracing::info!(
            %addr,
            path = %self.config.path,
            resource = %self.config.resource,
            tools = self.operations.len(),
            "MCP endpoint listening"
        );

        let sweeper = tokio::spawn(sweep_idle_sessions(
            self.registry.clone(),
            self.config.session_idle_timeout(),
            cancel.clone(),
        ));

        let registry = self.registry.clone();
        let shutdown = async move {
            cancel.cancelled().await;
            tracing::info!("MCP endpoint shutting down gracefully (cancellation)");
            registry.shutdown();
        };

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server failed");
        sweeper.abort();
        served
    }
}

/// Close idle sessions until `cancel` fires. Checks at half the idle
/// timeout, between once a second and once a minute.
async fn sweep_idle_sessions(
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    cancel: CancellationToken,
) {
    let period = (idle_timeout / 2).clamp(Duration::from_secs(1), Duration::from_secs(60));
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticks.tick() => {
                registry.reap_idle(idle_timeout);
            }
        }
    }
}
