//! hexsettle multiplayer game server.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod actor;
mod config;
mod protocol;
mod registry;
mod server;

use config::ServerConfig;
use server::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    info!(
        addr = %config.addr,
        max_players = config.max_players,
        victory_points = config.victory_points_to_win,
        discard_timeout_secs = config.discard_timeout.as_secs(),
        "Starting hexsettle server..."
    );

    let state = Arc::new(ServerState::new(&config));

    server::run_server(config.addr, state).await
}
