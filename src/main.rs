//! Latency-hedging reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                 HEDGE PROXY                   │
//!   Client Request     │  ┌─────────┐   ┌──────────┐   ┌────────────┐ │      ┌──────────┐
//!  ────────────────────┼─▶│  http   │──▶│ upstream │──▶│ dispatcher │─┼─N──▶ │ Upstream │
//!                      │  │ server  │   │ builder  │   │  (race)    │ │      │   API    │
//!                      │  └─────────┘   └──────────┘   └─────┬──────┘ │      └──────────┘
//!                      │                                     │ winner │
//!   Client Response    │  ┌──────────────────────────────────▼──────┐ │
//!  ◀───────────────────┼──│ relay (buffered copy / ordered stream)  │ │
//!                      │  └─────────────────────────────────────────┘ │
//!                      │  config · observability · lifecycle          │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use hedge_proxy::config::load_config;
use hedge_proxy::http::HttpServer;
use hedge_proxy::lifecycle::{signals, Shutdown};
use hedge_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "hedge-proxy")]
#[command(about = "Latency-hedging reverse proxy", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!("hedge-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        hedge_count = config.hedge.count,
        race_policy = ?config.hedge.race_policy,
        cancel_losers = config.hedge.cancel_losers,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
