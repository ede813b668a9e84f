//! MCP resource server guarded by delegated access tokens.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;

mod config;
mod logging;
mod server;

use config::AppConfig;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "xaa-mcp-server", version, about = "MCP tool server behind an OAuth access gate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// YAML config file; `XAA_*` environment variables override it
    #[arg(short, long, global = true, env = "XAA_CONFIG")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long, global = true)]
    print_config: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the MCP endpoint until Ctrl-C or SIGTERM (default)
    Serve,
    /// Load and validate the configuration, then exit
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    if cli.print_config {
        let rendered =
            serde_json::to_string_pretty(&config).context("failed to render configuration")?;
        println!("{rendered}");
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Check => {
            println!("configuration OK");
            Ok(())
        }
        Commands::Serve => {
            logging::init(&config.logging)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(async {
                let cancel = CancellationToken::new();
                server::cancel_on_signal(cancel.clone());
                let result = server::run(config, cancel).await;
                if let Err(e) = &result {
                    tracing::error!(error = %format!("{e:#}"), "server stopped with an error");
                }
                result
            })
        }
    }
}
