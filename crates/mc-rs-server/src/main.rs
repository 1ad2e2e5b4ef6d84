mod config;
mod connection;
mod context;
mod error;
mod handler;
mod listener;
mod sessions;
mod transport;

use std::sync::Arc;

use config::ServerConfig;
use context::{load_favicon, ServerContext};
use handler::PlayHandler;
use listener::Listener;
use mc_rs_crypto::ServerKeyPair;
use mc_rs_dispatch::WorkerPool;
use mc_rs_proto::packets::{GAME_VERSION, PROTOCOL_VERSION};
use mc_rs_proto::PacketRegistry;
use sessions::SessionRegistry;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServerConfig::load("server.toml") {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load server.toml: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        "MC-RS Server v{} starting on {}:{} (Minecraft {GAME_VERSION}, protocol {PROTOCOL_VERSION})",
        env!("CARGO_PKG_VERSION"),
        config.server.address,
        config.server.port
    );
    info!("MOTD: {}", config.server.motd);
    info!("Max players: {}", config.server.max_players);
    info!("Online mode: {}", config.server.online_mode);
    info!(
        "Compression threshold: {}",
        config.network.compression_threshold
    );

    let registry = match PacketRegistry::standard() {
        Ok(r) => r,
        Err(e) => {
            error!("Packet registry is inconsistent: {e}");
            std::process::exit(1);
        }
    };
    info!("Registered {} packet types", registry.len());

    let keypair = if config.server.online_mode {
        match ServerKeyPair::generate() {
            Ok(kp) => {
                info!("Generated server key pair");
                Some(kp)
            }
            Err(e) => {
                error!("Failed to generate server key pair: {e}");
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let favicon = config
        .server
        .favicon
        .as_deref()
        .and_then(|path| match load_favicon(path) {
            Ok(uri) => Some(uri),
            Err(e) => {
                warn!("Failed to load favicon {path}: {e}");
                None
            }
        });

    let sessions = Arc::new(SessionRegistry::new());
    let handler_sessions = Arc::clone(&sessions);
    let pool = match WorkerPool::spawn(config.workers.count, |_| {
        PlayHandler::new(Arc::clone(&handler_sessions))
    }) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to start workers: {e}");
            std::process::exit(1);
        }
    };

    let ctx = match ServerContext::new(
        config,
        registry,
        keypair,
        pool.router().clone(),
        sessions,
    ) {
        Ok(ctx) => Arc::new(ctx.with_favicon(favicon)),
        Err(e) => {
            error!("Failed to assign worlds: {e}");
            std::process::exit(1);
        }
    };

    for (name, world) in ctx.worlds() {
        if let Some(worker) = ctx.router.owner(world) {
            info!("World {name} ({world}) runs on {worker}");
        }
    }

    let listener = match Listener::bind(Arc::clone(&ctx)).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind: {e}");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Handle Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    listener.run(shutdown_rx).await;
    drop(ctx);
    pool.shutdown();
    info!("Server shut down.");
}
