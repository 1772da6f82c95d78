// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! MyBodyScan API Server
//!
//! Credit-metered body composition scans backed by Firestore.

use mybodyscan::{
    config::Config, db::FirestoreDb, providers::ScanProviders, services::FirebaseTokenVerifier,
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        app_check_mode = config.app_check_mode.as_str(),
        "Starting MyBodyScan API"
    );

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id).await?;

    let id_tokens = Arc::new(FirebaseTokenVerifier::id_tokens(&config)?);
    let app_check = Arc::new(FirebaseTokenVerifier::app_check(&config)?);
    let providers = ScanProviders::from_config(&config);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        id_tokens,
        app_check,
        providers,
    });

    // Build router
    let app = mybodyscan::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mybodyscan=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
