mod config;

use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use taski_api::auth::{AppState, AppStateInner};
use taski_db::Database;
use taski_gateway::{MutationBroadcaster, TopicRegistry};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taski=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Realtime core: one registry, one dispatcher, shared by every handler
    let registry = TopicRegistry::new();
    let (broadcaster, dispatcher) = MutationBroadcaster::spawn(registry.clone());

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl_days: config.token_ttl_days,
        registry: registry.clone(),
        broadcaster,
    });

    let app = taski_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Taski server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    // The router (and with it the last broadcaster) is gone; let the
    // dispatcher drain what is left.
    match tokio::time::timeout(Duration::from_secs(5), dispatcher).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Mutation dispatcher ended abnormally: {}", e),
        Err(_) => warn!("Mutation dispatcher did not drain in time"),
    }
    info!("Taski server stopped");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM, after closing every realtime session so
/// open WebSockets do not hold the shutdown open.
async fn shutdown_signal(registry: TopicRegistry) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }

    registry.shutdown();
}
