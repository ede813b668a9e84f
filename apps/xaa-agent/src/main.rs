//! Agent side of delegated cross-app access: trades the user's identity
//! assertion for a resource access token and drives the MCP endpoint with it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use token_exchange_sdk::TokenExchangeError;

mod commands;
mod config;
mod mcp_client;

use config::AgentConfig;

#[derive(Parser)]
#[command(name = "xaa-agent", version, about = "Delegated cross-app access agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML config file; `XAA_AGENT__*` environment variables override it
    #[arg(short, long, global = true, env = "XAA_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long, global = true)]
    print_config: bool,
}

#[derive(clap::Args)]
struct AssertionArgs {
    /// File holding the user's identity assertion (an ID token)
    #[arg(long, env = "XAA_IDENTITY_ASSERTION_FILE")]
    identity_assertion_file: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the two-hop exchange and print the access token metadata
    Exchange {
        #[command(flatten)]
        assertion: AssertionArgs,

        /// Also print the access token itself
        #[arg(long)]
        print_token: bool,
    },
    /// List the tools the MCP endpoint exposes to this user
    Tools {
        #[command(flatten)]
        assertion: AssertionArgs,
    },
    /// Call one tool in a fresh MCP session
    Call {
        /// Tool name, e.g. `list_todos`
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        #[command(flatten)]
        assertion: AssertionArgs,
    },
}

fn init_logging(config: &config::LoggingConfig) -> Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid logging.level '{}'", config.level))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AgentConfig::load(cli.config.as_deref())?;

    if cli.print_config {
        let rendered =
            serde_json::to_string_pretty(&config).context("failed to render configuration")?;
        println!("{rendered}");
        return Ok(());
    }
    init_logging(&config.logging)?;

    let result = match cli.command {
        Commands::Exchange {
            assertion,
            print_token,
        } => commands::exchange(&config, &assertion.identity_assertion_file, print_token).await,
        Commands::Tools { assertion } => {
            commands::list_tools(&config, &assertion.identity_assertion_file).await
        }
        Commands::Call {
            tool,
            args,
            assertion,
        } => commands::call(&config, &assertion.identity_assertion_file, &tool, &args).await,
    };

    result.map(|output| println!("{output}")).inspect_err(|e| {
        if let Some(exchange_error) = e.downcast_ref::<TokenExchangeError>() {
            eprintln!("hint: {}", exchange_error.remediation().hint());
        }
    })
}
