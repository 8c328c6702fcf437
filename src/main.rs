use anyhow::{Context, Result};
use axum::Router;
use corral::api::{self, AppState};
use corral::config::{self, CorralConfig};
use corral::hub::BroadcastHub;
use corral::monitor;
use corral::registry::Registry;
use corral::storage::{self, StatusStore};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "corral=info".into()),
        )
        .init();

    let config = load_config()?;

    info!("Corral starting...");

    let registry = Arc::new(Registry::new(config.monitoring.agent_timeout_seconds));
    let hub = Arc::new(BroadcastHub::new(config.hub.channel_capacity));
    let store = Arc::new(
        StatusStore::new(&config.storage.path).context("Failed to open status store")?,
    );

    // Fire-and-forget persistence queue and its writer
    let (store_tx, store_rx) = mpsc::channel(config.storage.queue_capacity);
    let writer = tokio::spawn(storage::run_writer(Arc::clone(&store), store_rx));

    // Background loops share one shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(monitor::run_health_monitor(
        Arc::clone(&registry),
        Arc::clone(&hub),
        config.monitoring.health_check_interval_seconds,
        shutdown_rx.clone(),
    ));
    tokio::spawn(monitor::run_heartbeat(
        Arc::clone(&hub),
        config.hub.heartbeat_interval_seconds,
        shutdown_rx.clone(),
    ));
    tokio::spawn(monitor::run_retention_sweeper(
        Arc::clone(&store),
        config.monitoring.retention_days,
        shutdown_rx,
    ));

    let state = Arc::new(AppState {
        registry,
        hub,
        store,
        store_tx,
    });

    let app = Router::new()
        .merge(api::create_ingestion_router(Arc::clone(&state)))
        .merge(api::create_query_router(Arc::clone(&state)))
        .merge(api::create_ws_router(Arc::clone(&state)))
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Corral listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("Server error")?;

    // Dropping the last AppState drops the queue sender; the writer drains
    // what it already accepted and exits.
    drop(state);
    let _ = writer.await;

    info!("Corral stopped");
    Ok(())
}

/// Config path comes from the first CLI argument or CORRAL_CONFIG;
/// otherwise run with defaults.
fn load_config() -> Result<CorralConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CORRAL_CONFIG").ok());

    match path {
        Some(path) => config::load_config(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load config from {}: {}", path, e)),
        None => Ok(CorralConfig::default()),
    }
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
}
