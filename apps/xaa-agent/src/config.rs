use std::path::Path;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize};
use token_exchange::TokenExchangeConfig;
use url::Url;

pub const ENV_PREFIX: &str = "XAA_AGENT__";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub exchange: TokenExchangeConfig,
    pub mcp: McpClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_owned()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct McpClientConfig {
    /// The protected MCP endpoint, e.g. `https://todo.example.com/mcp`.
    pub endpoint: Url,

    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_protocol_version() -> String {
    "2025-06-18".to_owned()
}

fn default_timeout_secs() -> u64 {
    30
}

impl AgentConfig {
    /// Load `path` (if given) and overlay `XAA_AGENT__*` environment
    /// variables (`XAA_AGENT__EXCHANGE__CLIENT_ID`).
    ///
    /// # Errors
    /// Returns an error if the sources do not form a valid config.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.exchange.validate().context("invalid exchange section")?;
        if !matches!(self.mcp.endpoint.scheme(), "https" | "http") {
            anyhow::bail!("mcp.endpoint must be an http(s) URL");
        }
        if self.mcp.timeout_secs == 0 {
            anyhow::bail!("mcp.timeout_secs must be greater than zero");
        }
        Ok(())
    }
}
