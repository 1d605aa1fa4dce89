// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for tarmac-core integration tests.
//!
//! Provides TestContext wiring a real PostgreSQL database, the event
//! broker, and the Postgres stores together.

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::PgPool;

use tarmac_core::event::EventBroker;
use tarmac_core::persistence::postgres::{PgRunStore, PgWorkspaceStore};
use tarmac_core::pubsub::PgEventChannel;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Test context that manages database, broker, and stores.
pub struct TestContext {
    pub pool: PgPool,
    pub broker: Arc<EventBroker>,
    pub events: PgEventChannel,
    pub workspaces: PgWorkspaceStore,
    pub runs: PgRunStore,
}

impl TestContext {
    /// Create a new test context.
    ///
    /// This sets up:
    /// 1. Database connection from TEST_DATABASE_URL
    /// 2. Schema migrations
    /// 3. Event channel and Postgres stores over the shared pool
    pub async fn new() -> Option<Self> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;

        let pool = PgPool::connect(&database_url).await.ok()?;
        MIGRATOR.run(&pool).await.ok()?;

        let broker = Arc::new(EventBroker::new(256));
        let events = PgEventChannel::new(pool.clone(), broker.clone());
        let workspaces = PgWorkspaceStore::new(pool.clone(), events.clone());
        let runs = PgRunStore::new(pool.clone(), events.clone());

        Some(Self {
            pool,
            broker,
            events,
            workspaces,
            runs,
        })
    }

    /// Database URL the context connected with.
    pub fn database_url() -> String {
        std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL not set")
    }

    /// Get a run's status column as text.
    pub async fn run_status(&self, run_id: &str) -> Option<String> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status::text FROM runs WHERE run_id = $1")
                .bind(run_id)
                .fetch_optional(&self.pool)
                .await
                .ok()?;
        row.map(|r| r.0)
    }

    /// Delete a workspace and, via cascade, its runs.
    pub async fn cleanup_workspace(&self, workspace_id: &str) {
        sqlx::query("DELETE FROM workspaces WHERE workspace_id = $1")
            .bind(workspace_id)
            .execute(&self.pool)
            .await
            .ok();
    }
}

/// Helper macro to skip tests if TEST_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}
