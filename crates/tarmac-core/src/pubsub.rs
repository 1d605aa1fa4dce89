// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cross-process event distribution over Postgres NOTIFY/LISTEN.
//!
//! Several processes share one database. When any of them mutates a
//! workspace or run, every process must learn about it, not just the one
//! that issued the write. [`PgEventChannel`] bridges that gap: cluster-wide
//! events are sent through `pg_notify` and a background listener forwards
//! each notification into the local [`EventBroker`], including this
//! process's own notifications. A mutation therefore reaches local
//! subscribers through exactly one path, the database round trip, so every
//! process observes the same event order.

use std::sync::Arc;

use sqlx::postgres::{PgListener, PgPool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::event::{Event, EventBroker, EventKind};

/// Postgres notification channel carrying tarmac events.
pub const EVENTS_CHANNEL: &str = "tarmac_events";

/// Publishes events to the cluster and feeds received ones into the local
/// broker.
#[derive(Clone)]
pub struct PgEventChannel {
    pool: PgPool,
    broker: Arc<EventBroker>,
}

impl PgEventChannel {
    /// Create a channel over the given pool, forwarding into `broker`.
    pub fn new(pool: PgPool, broker: Arc<EventBroker>) -> Self {
        Self { pool, broker }
    }

    /// Publish an event to every process in the cluster.
    ///
    /// Delivery to local subscribers happens when the notification comes
    /// back through [`listen`](Self::listen), not here.
    pub async fn publish(&self, kind: &EventKind) -> Result<()> {
        let payload = serde_json::to_string(kind)?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(EVENTS_CHANNEL)
            .bind(&payload)
            .execute(&self.pool)
            .await
            .map_err(|e| crate::error::CoreError::database("pg_notify", e))?;
        Ok(())
    }

    /// Listen for cluster events until `token` is cancelled.
    ///
    /// Intended to run as a dedicated task for the process lifetime. A
    /// dropped connection is retried by `PgListener` internally; a
    /// notification that fails to parse is logged and skipped rather than
    /// taking the listener down.
    pub async fn listen(&self, token: CancellationToken) -> Result<()> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| crate::error::CoreError::database("listen connect", e))?;
        listener
            .listen(EVENTS_CHANNEL)
            .await
            .map_err(|e| crate::error::CoreError::database("listen", e))?;
        info!(channel = EVENTS_CHANNEL, "listening for cluster events");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("event listener shutting down");
                    return Ok(());
                }
                notification = listener.recv() => {
                    match notification {
                        Ok(n) => self.forward(n.payload()),
                        Err(e) => {
                            error!(error = %e, "event listener connection failed");
                            return Err(crate::error::CoreError::database("listen recv", e));
                        }
                    }
                }
            }
        }
    }

    fn forward(&self, payload: &str) {
        match serde_json::from_str::<EventKind>(payload) {
            Ok(kind) => {
                debug!(workspace_id = kind.workspace_id(), "cluster event received");
                self.broker.publish(Event::cluster(kind));
            }
            Err(e) => {
                warn!(error = %e, payload, "discarding malformed event notification");
            }
        }
    }
}
