// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tarmac Scheduler - service entry point.
//!
//! Wires the database, event distribution, and cluster lock together and
//! runs the supervisor until interrupted. Safe to run any number of
//! replicas; only the one holding the cluster lock schedules.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tarmac_core::config::Config;
use tarmac_core::event::EventBroker;
use tarmac_core::lock::PgClusterLock;
use tarmac_core::migrations;
use tarmac_core::persistence::postgres::{PgRunStore, PgWorkspaceStore};
use tarmac_core::pubsub::PgEventChannel;

use tarmac_scheduler::supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tarmac_core=info".parse().unwrap())
                .add_directive("tarmac_scheduler=info".parse().unwrap()),
        )
        .init();

    info!("Starting Tarmac Scheduler");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        max_connections = config.db_max_connections,
        event_buffer = config.event_buffer,
        "Configuration loaded"
    );

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    info!("Database connection established");

    // Verify connection
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
    info!(result = row.0, "Database health check passed");

    info!("Running database migrations...");
    migrations::run_postgres(&pool).await?;
    info!("Migrations completed");

    let token = CancellationToken::new();

    // Event distribution: cluster events arrive over NOTIFY/LISTEN and fan
    // out through the in-process broker
    let broker = Arc::new(EventBroker::new(config.event_buffer));
    let events = PgEventChannel::new(pool.clone(), broker.clone());
    let listener_events = events.clone();
    let listener_token = token.clone();
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener_events.listen(listener_token).await {
            error!("Event listener error: {}", e);
        }
    });

    let workspaces = Arc::new(PgWorkspaceStore::new(pool.clone(), events.clone()));
    let runs = Arc::new(PgRunStore::new(pool.clone(), events.clone()));
    let lock = Arc::new(PgClusterLock::new(&config.database_url));

    // Translate Ctrl-C into cancellation
    let shutdown_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            shutdown_token.cancel();
        }
    });

    supervisor::start(token.clone(), lock, workspaces, runs, broker).await;

    token.cancel();
    let _ = listener_handle.await;
    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
