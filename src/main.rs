// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Withings-Link API Server
//!
//! Links local users to Withings and keeps their measurements in sync.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use withings_link::{
    config::Config,
    db::Database,
    services::{SessionStore, WithingsClient},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(port = config.port, "Starting Withings-Link API");

    // Open the SQLite store and create tables
    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to open database")?;
    tracing::info!(url = %config.database_url, "Database ready");

    let provider = WithingsClient::new(
        config.withings_client_id.clone(),
        config.withings_client_secret.clone(),
    )
    .context("Failed to initialize Withings client")?;

    if config.subscribe {
        tracing::info!("Notification subscriptions enabled");
    }

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        provider: Arc::new(provider),
        sessions: SessionStore::new(),
    });

    // Build router
    let app = withings_link::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("withings_link=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
