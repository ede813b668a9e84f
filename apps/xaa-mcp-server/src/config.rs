//! Server configuration: a YAML file overlaid with `XAA_*` environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use jsonwebtoken::Algorithm;
use mcp_gateway::GatewayConfig;
use serde::{Deserialize, Serialize};
use todo_tools::TodoToolsConfig;
use url::Url;
use xaa_auth::MAX_LEEWAY;

pub const ENV_PREFIX: &str = "XAA_";

/// Variables under `XAA_AGENT__` configure the agent, not this server.
const AGENT_SECTION: &str = "agent__";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub todo: TodoToolsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Where the access gate gets the issuer's verification keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Expected `iss` of every access token, compared exactly.
    pub issuer: String,

    /// Explicit JWKS location. When absent it is discovered from the issuer.
    #[serde(default)]
    pub jwks_uri: Option<Url>,

    /// Fixed PEM public key instead of a JWKS.
    #[serde(default)]
    pub public_key_path: Option<PathBuf>,

    /// Fetch authorization server metadata at startup.
    #[serde(default = "default_discover")]
    pub discover: bool,

    #[serde(default)]
    pub leeway_secs: u64,

    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,

    #[serde(default = "default_jwks_min_refresh_secs")]
    pub jwks_min_refresh_secs: u64,

    /// Timeout of outbound calls to the authorization server.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_discover() -> bool {
    true
}

fn default_algorithms() -> Vec<String> {
    vec!["RS256".to_owned(), "ES256".to_owned(), "EdDSA".to_owned()]
}

fn default_jwks_min_refresh_secs() -> u64 {
    30
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl AuthConfig {
    /// # Errors
    /// Returns an error if `issuer` is not a URL.
    pub fn issuer_url(&self) -> Result<Url> {
        Url::parse(&self.issuer).with_context(|| format!("auth.issuer '{}' is not a URL", self.issuer))
    }

    /// Parsed `algorithms`, restricted to the supported asymmetric ones.
    ///
    /// # Errors
    /// Returns an error for an unknown or symmetric algorithm.
    pub fn parsed_algorithms(&self) -> Result<Vec<Algorithm>> {
        self.algorithms
            .iter()
            .map(|name| {
                let alg = Algorithm::from_str(name)
                    .map_err(|_| anyhow::anyhow!("unknown signing algorithm '{name}'"))?;
                match alg {
                    Algorithm::RS256 | Algorithm::ES256 | Algorithm::EdDSA => Ok(alg),
                    _ => anyhow::bail!("unsupported signing algorithm '{name}'"),
                }
            })
            .collect()
    }
}

impl AppConfig {
    /// Load `path` (if given) and overlay `XAA_*` environment variables,
    /// using `__` as the section separator (`XAA_GATEWAY__BIND_ADDR`).
    /// Environment values win over the file.
    ///
    /// # Errors
    /// Returns an error if the sources cannot be read or do not form a valid config.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }
        let config: Self = figment
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .filter(|key| !key.as_str().to_ascii_lowercase().starts_with(AGENT_SECTION))
                    .split("__"),
            )
            .extract()
            .context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.gateway.validate().context("invalid gateway section")?;
        self.todo.validate().context("invalid todo section")?;

        let algorithms = self.auth.parsed_algorithms()?;
        if algorithms.is_empty() {
            anyhow::bail!("auth.algorithms must not be empty");
        }
        if self.auth.public_key_path.is_some() && algorithms.len() != 1 {
            anyhow::bail!("auth.public_key_path requires exactly one entry in auth.algorithms");
        }
        if self.auth.public_key_path.is_none()
            && self.auth.jwks_uri.is_none()
            && !self.auth.discover
        {
            anyhow::bail!(
                "no key source: set auth.jwks_uri, auth.public_key_path, or enable auth.discover"
            );
        }
        if self.auth.leeway_secs > MAX_LEEWAY.as_secs() {
            anyhow::bail!(
                "auth.leeway_secs must be at most {}",
                MAX_LEEWAY.as_secs()
            );
        }
        let issuer = self.auth.issuer_url()?;
        if !matches!(issuer.scheme(), "https" | "http") {
            anyhow::bail!("auth.issuer must be an http(s) URL");
        }
        Ok(())
    }
}
