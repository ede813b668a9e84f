//! Startup wiring: key source, access gate, tools, gateway.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mcp_gateway::{McpGateway, OperationSet};
use todo_tools::TodoToolsModule;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use xaa_auth::{
    AccessGate, AuthorizationServerMetadata, JwksKeyProvider, JwtValidator, KeyProvider,
    StaticKeyProvider, ValidatorConfig, decoding_key_from_pem,
};

use crate::config::{AppConfig, AuthConfig};

/// # Errors
/// Returns an error if the client cannot be built.
pub fn http_client(auth: &AuthConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(auth.http_timeout_secs))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

/// Resolve the issuer's verification keys: a fixed PEM, an explicit JWKS
/// URI, or the JWKS URI from the authorization server metadata.
async fn key_provider(auth: &AuthConfig, http: &reqwest::Client) -> Result<Arc<dyn KeyProvider>> {
    let algorithms = auth.parsed_algorithms()?;

    if let Some(path) = &auth.public_key_path {
        let pem = std::fs::read(path)
            .with_context(|| format!("failed to read public key {}", path.display()))?;
        let alg = algorithms
            .first()
            .copied()
            .context("auth.algorithms must not be empty")?;
        let key = decoding_key_from_pem(alg, &pem)
            .with_context(|| format!("invalid public key {}", path.display()))?;
        tracing::info!(path = %path.display(), ?alg, "using static issuer key");
        return Ok(Arc::new(StaticKeyProvider::new().with_default_key(key)));
    }

    let jwks_uri = match &auth.jwks_uri {
        Some(uri) => uri.clone(),
        None => {
            let metadata = AuthorizationServerMetadata::discover(http, &auth.issuer_url()?)
                .await
                .context("authorization server discovery failed")?;
            metadata
                .jwks_uri
                .context("authorization server metadata has no jwks_uri")?
        }
    };

    let provider = JwksKeyProvider::new(http.clone(), jwks_uri)
        .with_min_refresh_interval(Duration::from_secs(auth.jwks_min_refresh_secs));
    match provider.refresh().await {
        Ok(()) => tracing::info!(
            jwks_uri = %provider.jwks_uri(),
            keys = provider.cached_key_count(),
            "issuer key set loaded"
        ),
        Err(e) => tracing::warn!(
            jwks_uri = %provider.jwks_uri(),
            error = %e,
            "issuer key set not loaded yet, will retry on first request"
        ),
    }
    Ok(Arc::new(provider))
}

/// Build the gate, the tool set and the gateway from a validated config.
///
/// # Errors
/// Returns an error when the key source cannot be resolved or a section is invalid.
pub async fn build_gateway(config: &AppConfig, http: &reqwest::Client) -> Result<McpGateway> {
    let keys = key_provider(&config.auth, http).await?;
    let validator = JwtValidator::new(
        keys,
        ValidatorConfig::new(&config.auth.issuer)
            .with_algorithms(config.auth.parsed_algorithms()?)
            .with_leeway(Duration::from_secs(config.auth.leeway_secs)),
    );
    let gate = AccessGate::new(Arc::new(validator), &config.gateway.resource);

    let todo = TodoToolsModule::new(config.todo.clone()).context("invalid todo section")?;
    let operations = todo.register(OperationSet::new(gate.clone()));

    McpGateway::new(config.gateway.clone(), gate, operations, &config.auth.issuer)
}

/// Serve until `cancel` fires.
///
/// # Errors
/// Returns an error if startup fails or the server stops abnormally.
pub async fn run(config: AppConfig, cancel: CancellationToken) -> Result<()> {
    let http = http_client(&config.auth)?;
    let gateway = build_gateway(&config, &http).await?;
    let listener = TcpListener::bind(&config.gateway.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.gateway.bind_addr))?;
    gateway.serve(listener, cancel).await
}

/// Cancel `cancel` on Ctrl-C or SIGTERM.
pub fn cancel_on_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        cancel.cancel();
    });
}

async fn wait_for_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
