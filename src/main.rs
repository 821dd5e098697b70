use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use choir_stats::analytics::StatsService;
use choir_stats::api;
use choir_stats::config::Config;
use choir_stats::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage = storage::connect(&config).await?;
    info!("Storage initialized successfully");

    let service = Arc::new(StatsService::from_config(&config.stats, storage));
    info!(
        "🎼 Home region: {} (refresh every {}s, {:?} composition)",
        config.stats.home_region,
        config.stats.refresh_interval_secs,
        config.stats.composition_policy
    );

    let router = api::create_api_router(service);

    // Start API server
    let addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 API server listening on http://{}", addr);
    info!("   - Statistics endpoints available at http://{}/api/stats/...", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
