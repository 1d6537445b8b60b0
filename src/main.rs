// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bodyscale API Server
//!
//! Listens for the scale's BLE advertisements, turns each weigh-in into a
//! body-composition measurement and serves them to the dashboard.

use bodyscale::{
    config::{Config, StorageBackend},
    db::{FirestoreDb, MemoryStore, Store},
    services::{spawn_ingest, DebounceTracker, EtlService},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        backend = ?config.storage_backend,
        "Starting Bodyscale API"
    );

    match config.storage_backend {
        StorageBackend::Firestore => {
            let db = FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore");
            run(config, db).await
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            run(config, MemoryStore::new()).await
        }
    }
}

async fn run<S: Store>(config: Config, db: S) -> Result<(), Box<dyn std::error::Error>> {
    let etl = Arc::new(EtlService::new(db.clone(), config.cooldown()));

    // Live pipeline
    let tracker = Arc::new(DebounceTracker::new(config.cooldown()));
    let (ingest, _ingest_tasks) = spawn_ingest(
        etl.clone(),
        config.advertisement_filter(),
        tracker,
        config.ingest_queue_capacity,
    );
    tracing::info!(
        scale_name = %config.scale_name,
        manufacturer_id = ?config.scale_manufacturer_id,
        "Ingest pipeline started"
    );

    // Catch up on anything stored while we were down, then keep sweeping
    if config.etl_interval_seconds > 0 {
        let etl = etl.clone();
        let period = Duration::from_secs(config.etl_interval_seconds);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = etl.run_batch().await {
                    tracing::error!(error = %e, "Scheduled ETL run failed");
                }
            }
        });
    }

    #[cfg(feature = "ble")]
    {
        let adapter = bodyscale::services::scanner::first_adapter()
            .await
            .expect("Failed to open Bluetooth adapter");
        let ingest = ingest.clone();
        tokio::spawn(async move {
            if let Err(e) = bodyscale::services::scanner::run_scanner(adapter, ingest).await {
                tracing::error!(error = %e, "BLE scanner stopped");
            }
        });
    }

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        etl,
        ingest,
    });

    // Build router
    let app = bodyscale::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bodyscale=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
