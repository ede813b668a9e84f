use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_owned()
}

fn default_path() -> String {
    "/mcp".to_owned()
}

fn default_resource() -> String {
    "mcp://resource".to_owned()
}

fn default_transport_scopes() -> Vec<String> {
    vec!["mcp:connect".to_owned()]
}

fn default_scopes_supported() -> Vec<String> {
    vec![
        "mcp:connect".to_owned(),
        "mcp:tools:read".to_owned(),
        "mcp:tools:manage".to_owned(),
    ]
}

fn default_history_limit() -> usize {
    256
}

fn default_close_on_stream_disconnect() -> bool {
    true
}

fn default_max_sessions_per_subject() -> usize {
    16
}

fn default_session_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_body_limit_bytes() -> usize {
    1024 * 1024
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_keep_alive_secs() -> u64 {
    15
}

/// Transport endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Single path serving POST, GET and DELETE.
    #[serde(default = "default_path")]
    pub path: String,
    /// Audience every bearer token must be issued for.
    #[serde(default = "default_resource")]
    pub resource: String,
    /// Human-readable name published in the protected resource metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    /// Externally visible base URL. When set, `WWW-Authenticate` challenges
    /// point clients at the metadata document under it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<Url>,
    /// Scopes required on every transport call, in addition to per-tool scopes.
    #[serde(default = "default_transport_scopes")]
    pub transport_scopes: Vec<String>,
    #[serde(default = "default_scopes_supported")]
    pub scopes_supported: Vec<String>,
    /// Server-to-client events kept per session for `Last-Event-ID` resumption.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_close_on_stream_disconnect")]
    pub close_on_stream_disconnect: bool,
    /// Open sessions one subject may hold at a time.
    #[serde(default = "default_max_sessions_per_subject")]
    pub max_sessions_per_subject: usize,
    /// Sessions with no request and no attached stream for this long are closed.
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// SSE comment interval keeping idle streams open through proxies.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            path: default_path(),
            resource: default_resource(),
            resource_name: None,
            public_url: None,
            transport_scopes: default_transport_scopes(),
            scopes_supported: default_scopes_supported(),
            history_limit: default_history_limit(),
            close_on_stream_disconnect: default_close_on_stream_disconnect(),
            max_sessions_per_subject: default_max_sessions_per_subject(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            body_limit_bytes: default_body_limit_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl GatewayConfig {
    /// # Errors
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.path.starts_with('/') || self.path.len() < 2 {
            anyhow::bail!("gateway.path must be an absolute path other than '/', got '{}'", self.path);
        }
        if self.resource.trim().is_empty() {
            anyhow::bail!("gateway.resource must not be empty");
        }
        if self.history_limit == 0 {
            anyhow::bail!("gateway.history_limit must be at least 1");
        }
        if self.max_sessions_per_subject == 0 {
            anyhow::bail!("gateway.max_sessions_per_subject must be at least 1");
        }
        if self.session_idle_timeout_secs == 0 {
            anyhow::bail!("gateway.session_idle_timeout_secs must be at least 1");
        }
        if self.body_limit_bytes == 0 {
            anyhow::bail!("gateway.body_limit_bytes must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("gateway.request_timeout_secs must be at least 1");
        }
        if self.transport_scopes.iter().any(|s| s.trim().is_empty()) {
            anyhow::bail!("gateway.transport_scopes must not contain empty entries");
        }
        Ok(())
    }

    #[must_use]
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    /// URL of the protected resource metadata document, if the public URL is known.
    #[must_use]
    pub fn resource_metadata_url(&self) -> Option<Url> {
        self.public_url
            .as_ref()
            .and_then(|base| base.join(xaa_auth::discovery::PROTECTED_RESOURCE_WELL_KNOWN).ok())
    }
}
