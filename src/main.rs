//! Trivia gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                 TRIVIA GATEWAY               │
//!  HTTP / WebSocket      │  ┌────────┐   ┌──────────┐   ┌────────────┐  │
//!  ──────────────────────┼─▶│  http  │──▶│ services │──▶│ resilience │──┼──▶ user management
//!                        │  │ server │   │  (saga)  │   │ breaker +  │  │
//!                        │  └───┬────┘   └──────────┘   │  deadline  │──┼──▶ game engine
//!                        │      │                       └────────────┘  │
//!                        │      ▼                                       │
//!                        │  ┌──────────┐   config · observability ·     │
//!  ◀─────────────────────┼──│ realtime │   lifecycle                    │
//!    room broadcasts     │  │  rooms   │                                │
//!                        │  └──────────┘                                │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use trivia_gateway::config::{load_config, GatewayConfig};
use trivia_gateway::lifecycle::{spawn_signal_listener, Shutdown};
use trivia_gateway::observability::{logging, metrics};
use trivia_gateway::services::{HttpGameSessions, HttpUserDirectory};
use trivia_gateway::{AppState, GatewayServer};

#[derive(Parser)]
#[command(name = "trivia-gateway")]
#[command(about = "API gateway with circuit breaking, sagas and room broadcasts", long_about = None)]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "trivia-gateway starting");

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        default_timeout_ms = config.resilience.default_timeout_ms,
        failure_threshold = config.resilience.breaker.failure_threshold,
        recovery_timeout_ms = config.resilience.breaker.recovery_timeout_ms,
        deadline_policy = ?config.resilience.deadline_policy,
        "Configuration loaded"
    );

    let users = Arc::new(HttpUserDirectory::new(&config.services)?);
    let games = Arc::new(HttpGameSessions::new(&config.services)?);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening");

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let state = AppState::new(config, users, games, shutdown);
    GatewayServer::new(state).run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
