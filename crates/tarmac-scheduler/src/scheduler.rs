// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The scheduler: routes events to per-workspace queues.
//!
//! One queue per workspace, rebuilt from scratch on every
//! (re)initialization. Bootstrap subscribes to the event stream first and
//! only then reads persisted state, so anything that changes while state
//! is being read arrives as a buffered event instead of being lost.
//! Replaying a state change the bootstrap already saw is harmless; every
//! queue action is guarded to be redelivery-safe.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tarmac_core::error::Result;
use tarmac_core::event::{Event, EventKind, Subscriber};
use tarmac_core::persistence::{PageOptions, RunStore, WorkspaceStore};
use tarmac_core::run::Run;

use crate::queue::WorkspaceQueue;

/// Routes workspace and run events to per-workspace queues.
pub struct Scheduler {
    workspaces: Arc<dyn WorkspaceStore>,
    runs: Arc<dyn RunStore>,
    subscriber: Arc<dyn Subscriber>,
    queues: HashMap<String, WorkspaceQueue>,
}

impl Scheduler {
    /// Create a scheduler with no queues. Queues are built by
    /// [`reinitialize`](Self::reinitialize).
    pub fn new(
        workspaces: Arc<dyn WorkspaceStore>,
        runs: Arc<dyn RunStore>,
        subscriber: Arc<dyn Subscriber>,
    ) -> Self {
        Self {
            workspaces,
            runs,
            subscriber,
            queues: HashMap::new(),
        }
    }

    /// The queue for a workspace, if one exists.
    pub fn queue(&self, workspace_id: &str) -> Option<&WorkspaceQueue> {
        self.queues.get(workspace_id)
    }

    /// Number of live queues.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Rebuild all queues from persisted state, then process events until
    /// cancellation.
    ///
    /// Returns `Err` when the event stream lags or a store operation fails;
    /// the caller is expected to call `reinitialize` again after backing
    /// off. Each call starts from a clean slate.
    pub async fn reinitialize(&mut self, token: &CancellationToken) -> Result<()> {
        self.queues.clear();

        // subscribe before reading state so no change can fall between the
        // snapshot and the stream
        let mut stream = self.subscriber.subscribe("scheduler");

        let mut page = PageOptions::default();
        let mut workspace_count = 0;
        loop {
            let result = self.workspaces.list_workspaces(page).await?;
            for workspace in result.items {
                workspace_count += 1;
                self.route(&Event::local(EventKind::WorkspaceChanged(workspace)))
                    .await?;
            }
            match result.next_page {
                Some(next) => page = PageOptions::page(next),
                None => break,
            }
        }

        // the listing is newest first; replay oldest first so each queue
        // sees runs in creation order
        let mut incomplete: Vec<Run> = Vec::new();
        let mut page = PageOptions::default();
        loop {
            let result = self.runs.list_incomplete_runs(page).await?;
            incomplete.extend(result.items);
            match result.next_page {
                Some(next) => page = PageOptions::page(next),
                None => break,
            }
        }
        let run_count = incomplete.len();
        for run in incomplete.into_iter().rev() {
            self.route(&Event::local(EventKind::RunChanged(run))).await?;
        }

        info!(
            workspaces = workspace_count,
            incomplete_runs = run_count,
            "scheduler initialized"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("scheduler shutting down");
                    return Ok(());
                }
                event = stream.recv() => {
                    match event {
                        Some(Ok(event)) => self.route(&event).await?,
                        // lagged; rebuilding from state is the only sound recovery
                        Some(Err(e)) => return Err(e),
                        None => {
                            info!("event stream ended");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn route(&mut self, event: &Event) -> Result<()> {
        match &event.kind {
            EventKind::WorkspaceDeleted(workspace_id) => {
                if self.queues.remove(workspace_id).is_some() {
                    info!(workspace_id, "workspace deleted, queue removed");
                }
                Ok(())
            }
            EventKind::WorkspaceChanged(ws) | EventKind::WorkspaceUnlocked(ws) => {
                let workspaces = Arc::clone(&self.workspaces);
                let runs = Arc::clone(&self.runs);
                self.queues
                    .entry(ws.id.clone())
                    .or_insert_with(|| WorkspaceQueue::new(workspaces, runs, ws.clone()))
                    .handle_event(event)
                    .await
            }
            EventKind::RunChanged(run) => match self.queues.get_mut(&run.workspace_id) {
                Some(queue) => queue.handle_event(event).await,
                None => {
                    // likely a deleted workspace's stragglers
                    error!(
                        run_id = %run.id,
                        workspace_id = %run.workspace_id,
                        "dropping run event for unknown workspace"
                    );
                    Ok(())
                }
            },
        }
    }
}
