//! Synapse CLI — the main entry point.
//!
//! Commands:
//! - `serve`     — Start the OpenAI-compatible gateway
//! - `doctor`    — Validate config and probe collaborators and providers
//! - `status`    — Show the effective configuration
//! - `providers` — List the configured provider chain
//! - `onboard`   — Write a default config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "synapse",
    about = "Synapse — OpenAI-compatible inference gateway with memory and retrieval",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $SYNAPSE_CONFIG or ~/.synapse/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Validate configuration and probe dependencies
    Doctor,

    /// Show the effective configuration
    Status,

    /// List the configured provider chain
    Providers,

    /// Write a default config file
    Onboard,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "info" })
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(config, port, host).await?,
        Commands::Doctor => commands::doctor::run(config).await?,
        Commands::Status => commands::status::run(config).await?,
        Commands::Providers => commands::providers::run(config).await?,
        Commands::Onboard => commands::onboard::run(config).await?,
    }

    Ok(())
}
