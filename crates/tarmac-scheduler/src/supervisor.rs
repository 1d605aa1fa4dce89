// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster-singleton supervision of the scheduler.
//!
//! Any number of processes may run this supervisor; the cluster lock lets
//! exactly one of them through at a time, and the rest block inside
//! `wait_and_lock` as warm standbys. When the active scheduler fails or
//! its process dies, a standby acquires the lock and rebuilds queue state
//! from the database.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tarmac_core::event::Subscriber;
use tarmac_core::lock::ClusterLock;
use tarmac_core::persistence::{RunStore, WorkspaceStore};
use tarmac_core::retry::{retry_with_backoff, Backoff};

use crate::scheduler::Scheduler;

/// Cluster lock number owned by the scheduler.
pub const SCHEDULER_LOCK_ID: i64 = 0x7461_726d_6163_3031;

/// Run the scheduler under the cluster lock until `token` is cancelled.
///
/// Failures release the lock, back off exponentially, and start over with
/// a fresh acquisition, so a flapping scheduler neither hot-loops nor
/// starves standbys of the chance to take over.
pub async fn start(
    token: CancellationToken,
    lock: Arc<dyn ClusterLock>,
    workspaces: Arc<dyn WorkspaceStore>,
    runs: Arc<dyn RunStore>,
    subscriber: Arc<dyn Subscriber>,
) {
    retry_with_backoff(&token, Backoff::default(), || {
        // each attempt gets a fresh scheduler; reinitialize discards any
        // queue state anyway, so nothing is worth carrying across attempts
        let token = token.clone();
        let lock = Arc::clone(&lock);
        let workspaces = Arc::clone(&workspaces);
        let runs = Arc::clone(&runs);
        let subscriber = Arc::clone(&subscriber);
        async move {
            let lease = lock.wait_and_lock(SCHEDULER_LOCK_ID).await?;
            info!("this process is now the active scheduler");

            let mut scheduler = Scheduler::new(workspaces, runs, subscriber);
            let result = scheduler.reinitialize(&token).await;

            if let Err(e) = lease.release().await {
                warn!(error = %e, "failed to release scheduler lock cleanly");
            }
            result
        }
    })
    .await;

    info!("scheduler supervisor stopped");
}
