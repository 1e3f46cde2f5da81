use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, Level};

use gridclaim_server::config::GameConfig;
use gridclaim_server::net::session::{start_game_loop, GameSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Gridclaim Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = GameConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {}x{} map, {} cell chunks, {} ms tick",
        config.map_size, config.map_size, config.chunk_size, config.tick_interval_ms
    );

    // The session owns all game state; the transport layer admits connections
    // through GameSession::connect and feeds the command queue.
    let session = Arc::new(RwLock::new(GameSession::new(config)));
    let game_loop = start_game_loop(session.clone());

    info!("Simulation running; waiting for the transport to attach connections");

    // Run until shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    game_loop.abort();
    info!("Server stopped");

    Ok(())
}
