//! Standalone registry server CLI binary.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use satchel_registry::{run_server, RegistryConfig};

#[derive(Parser)]
#[command(name = "satchel")]
#[command(about = "Satchel Registry - private npm-compatible package registry")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the registry server
    Serve {
        /// Path to a JSON configuration file
        #[arg(long, default_value = "config.json")]
        config: PathBuf,

        /// Host to bind to (overrides the configuration file)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides the configuration file)
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for package storage (overrides the configuration file)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Enable upstream proxying for metadata reads
        #[arg(long)]
        proxy: bool,
    },

    /// Print the effective configuration and exit
    Config {
        /// Path to a JSON configuration file
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            data,
            proxy,
        } => {
            let mut config = RegistryConfig::load_or_default(&config)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data) = data {
                config.data_dir = data;
            }
            if proxy {
                config.proxy = true;
            }
            run_server(config).await
        }

        Commands::Config { config } => {
            let config = RegistryConfig::load_or_default(&config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
