// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster-wide mutual exclusion.
//!
//! Exactly one process in the cluster may run the scheduler at a time.
//! [`PgClusterLock`] implements the contract with a Postgres session-level
//! advisory lock held on a dedicated connection. The lock lives and dies
//! with that connection: if the holder crashes, Postgres notices the closed
//! socket and releases the lock, so a standby's pending `pg_advisory_lock`
//! call returns and it takes over.

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use tracing::{debug, info};

use crate::error::{CoreError, Result};

/// A held cluster lock. Dropping the lease releases the lock as a side
/// effect of closing its connection; [`release`](LockLease::release) does
/// it promptly and cleanly.
#[async_trait]
pub trait LockLease: Send {
    /// Release the lock.
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Grants exclusive ownership of a numbered cluster-wide lock.
#[async_trait]
pub trait ClusterLock: Send + Sync {
    /// Block until the lock identified by `id` is acquired.
    async fn wait_and_lock(&self, id: i64) -> Result<Box<dyn LockLease>>;
}

/// Postgres advisory-lock implementation of [`ClusterLock`].
pub struct PgClusterLock {
    url: String,
}

impl PgClusterLock {
    /// Create a lock factory connecting to the given database URL.
    ///
    /// Each acquisition opens its own connection rather than borrowing from
    /// a pool. Session advisory locks are bound to the session that took
    /// them; a pooled connection could hand the session, and the lock, to
    /// an unrelated caller.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ClusterLock for PgClusterLock {
    async fn wait_and_lock(&self, id: i64) -> Result<Box<dyn LockLease>> {
        let mut conn = PgConnection::connect(&self.url)
            .await
            .map_err(|e| CoreError::database("advisory lock connect", e))?;

        debug!(lock_id = id, "waiting for cluster lock");
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(id)
            .execute(&mut conn)
            .await
            .map_err(|e| CoreError::database("advisory lock", e))?;
        info!(lock_id = id, "cluster lock acquired");

        Ok(Box::new(PgLockLease { conn, id }))
    }
}

struct PgLockLease {
    conn: PgConnection,
    id: i64,
}

#[async_trait]
impl LockLease for PgLockLease {
    async fn release(self: Box<Self>) -> Result<()> {
        let PgLockLease { mut conn, id } = *self;
        let unlock = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(id)
            .execute(&mut conn)
            .await;
        // closing the session releases the lock even if the unlock failed
        let close = conn.close().await;
        unlock.map_err(|e| CoreError::database("advisory unlock", e))?;
        close.map_err(|e| CoreError::database("advisory lock close", e))?;
        info!(lock_id = id, "cluster lock released");
        Ok(())
    }
}
