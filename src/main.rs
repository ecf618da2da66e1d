use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use territory_arena_server::config::{GameConfig, ServerConfig};
use territory_arena_server::game::tuning::TuningTables;
use territory_arena_server::lobby::manager::LobbyManager;
use territory_arena_server::lobby::room::RoomConfig;
use territory_arena_server::metrics::{self, Metrics};
use territory_arena_server::net::transport::WebTransportServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Territory Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate().map_err(|e| anyhow!("Invalid server config: {}", e))?;
    let game = GameConfig::from_env().with_max_players(config.max_players_per_room);
    game.validate().map_err(|e| anyhow!("Invalid game config: {}", e))?;
    info!(
        "Configuration loaded: {}:{}, max_rooms={}, players/room={}, map={}",
        config.bind_address, config.port, config.max_rooms, game.max_players, game.map_size
    );

    let tuning = Arc::new(TuningTables::load_or_builtin());
    let metrics = Arc::new(Metrics::new());

    if config.metrics_port != 0 {
        let metrics_clone = metrics.clone();
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let room_config = RoomConfig {
        game,
        stale_timeout: Duration::from_secs(config.stale_timeout_secs),
    };
    let lobby_manager = Arc::new(RwLock::new(LobbyManager::new(
        config.max_rooms,
        room_config,
        tuning,
        metrics.clone(),
    )));

    let server = WebTransportServer::new(config.clone(), lobby_manager.clone(), metrics.clone()).await?;

    info!("Server ready on https://{}", server.bind_addr());
    info!("Chrome flag: --ignore-certificate-errors-spki-list={}", server.cert_hash());

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    lobby_manager.write().await.shutdown_all_rooms().await;
    info!("Server stopped");

    Ok(())
}
