// ABOUTME: The octroi binary
// ABOUTME: serve and version subcommands over the gateway library crates

mod config;
mod serve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "octroi", about = "Egress gateway for AI agent tool access", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the gateway server
    Serve {
        /// Path to the YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the version and exit
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve::run(config).await,
        Command::Version => {
            println!("octroi {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
