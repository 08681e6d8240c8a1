//! Disguise proxy inbound.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌───────────────────────────────────────────────────┐
//!                      │                  DISGUISE INBOUND                  │
//!                      │                                                    │
//!   Client / Probe     │  ┌──────────┐   ┌─────────────┐   ┌────────────┐  │
//!   ───────────────────┼─▶│   net    │──▶│    http     │──▶│ transport  │  │
//!                      │  │ listener │   │ h1/h2/h2c/ws│   │ validator  │  │
//!                      │  │   tls    │   └─────────────┘   └─────┬──────┘  │
//!                      │  └──────────┘                   accept │ reject  │
//!                      │                                        ▼         │
//!                      │                       ┌──────────────────────┐    │
//!                      │                       │        relay         │    │
//!                      │                       │ upstream  |  decoy   │────┼──▶ Upstream
//!                      │                       └──────────────────────┘    │
//!                      │  config · observability · lifecycle               │
//!                      └───────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use disguise_proxy::config::{load_config, ServerConfig};
use disguise_proxy::lifecycle;
use disguise_proxy::observability::init_logging;

#[derive(Parser)]
#[command(name = "disguise-proxy")]
#[command(about = "Proxy inbound disguised as an ordinary web server", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    init_logging(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        tls = config.listener.tls.is_some(),
        "disguise-proxy starting"
    );

    lifecycle::run(config).await?;
    Ok(())
}
