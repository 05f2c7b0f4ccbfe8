//! sitedesk - backend service of a personal website

use anyhow::{Context, Result};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sitedesk::{
    api::{self, AppState},
    config::Config,
    db::DocumentStore,
    services::{build_http_client, build_mailer},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitedesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting sitedesk...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    for name in config.missing_required() {
        tracing::warn!("{} is not set; dependent routes will fail", name);
    }
    for name in config.missing_optional() {
        tracing::warn!("{} is not set; third-party routes will fail", name);
    }

    // Open the store and bring the schema up to date
    let store = DocumentStore::connect(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Outbound clients, built once and shared
    let mailer = build_mailer(&config.mail);
    let http = build_http_client().context("Failed to build HTTP client")?;

    let state = AppState::new(&config, store.clone(), mailer, http)
        .context("Failed to initialize application state")?;

    // Build router
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
