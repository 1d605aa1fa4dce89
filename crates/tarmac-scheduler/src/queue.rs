// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-workspace run queue.
//!
//! Each workspace gets one queue enforcing its invariant: at most one
//! non-speculative run executes at a time, in creation order. The queue is
//! event-driven; it holds a cached workspace snapshot plus the current run
//! and the runs waiting behind it, and reacts to workspace and run events
//! routed to it by the scheduler.
//!
//! Speculative runs are the exception: they are read-only, so they are
//! dispatched immediately and never enter the queue.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info};

use tarmac_core::error::{CoreError, Result};
use tarmac_core::event::{Event, EventKind};
use tarmac_core::persistence::{RunStore, WorkspaceStore};
use tarmac_core::run::{Run, RunStatus};
use tarmac_core::workspace::{LockHolder, Workspace};

/// Scheduling state for a single workspace.
pub struct WorkspaceQueue {
    workspaces: Arc<dyn WorkspaceStore>,
    runs: Arc<dyn RunStore>,
    workspace: Workspace,
    current: Option<Run>,
    pending: VecDeque<Run>,
}

impl WorkspaceQueue {
    /// Create an empty queue for a workspace.
    pub fn new(
        workspaces: Arc<dyn WorkspaceStore>,
        runs: Arc<dyn RunStore>,
        workspace: Workspace,
    ) -> Self {
        Self {
            workspaces,
            runs,
            workspace,
            current: None,
            pending: VecDeque::new(),
        }
    }

    /// The run currently occupying the workspace, if any.
    pub fn current_run(&self) -> Option<&Run> {
        self.current.as_ref()
    }

    /// Runs waiting behind the current one, oldest first.
    pub fn queued_runs(&self) -> &VecDeque<Run> {
        &self.pending
    }

    /// Apply one event to this queue.
    ///
    /// Events are applied in arrival order; every state change the queue
    /// makes goes through the stores, so a crash loses nothing that cannot
    /// be rebuilt by replaying incomplete runs.
    pub async fn handle_event(&mut self, event: &Event) -> Result<()> {
        match &event.kind {
            EventKind::WorkspaceChanged(ws) => {
                self.workspace = ws.clone();
                Ok(())
            }
            EventKind::WorkspaceUnlocked(ws) => {
                self.workspace = ws.clone();
                // a queued run may have been waiting on this lock
                if let Some(current) = self.current.clone() {
                    self.schedule_run(&current).await?;
                }
                Ok(())
            }
            // queue removal is the scheduler's job
            EventKind::WorkspaceDeleted(_) => Ok(()),
            EventKind::RunChanged(run) => self.handle_run(run).await,
        }
    }

    async fn handle_run(&mut self, run: &Run) -> Result<()> {
        if run.speculative {
            // read-only, bypasses the queue entirely
            if run.status == RunStatus::Pending {
                let _ = self.dispatch(run).await?;
            }
            return Ok(());
        }

        if self.current.as_ref().is_some_and(|c| c.id == run.id) {
            return self.handle_current_run(run).await;
        }

        if run.done() {
            // finished without ever becoming current, drop it if queued
            self.pending.retain(|r| r.id != run.id);
            return Ok(());
        }

        if self.current.is_none() {
            self.set_latest_run(run).await?;
            self.current = Some(run.clone());
            return self.schedule_run(run).await;
        }

        match self.pending.iter().position(|r| r.id == run.id) {
            Some(pos) => self.pending[pos] = run.clone(),
            None => {
                debug!(
                    run_id = %run.id,
                    workspace_id = %self.workspace.id,
                    position = self.pending.len(),
                    "run queued behind current run"
                );
                self.pending.push_back(run.clone());
            }
        }
        Ok(())
    }

    async fn handle_current_run(&mut self, run: &Run) -> Result<()> {
        if !run.done() {
            self.current = Some(run.clone());
            return Ok(());
        }

        info!(
            run_id = %run.id,
            workspace_id = %self.workspace.id,
            status = %run.status,
            "current run finished"
        );
        self.current = None;

        if let Some(next) = self.pending.pop_front() {
            // the successor takes the lock over directly; no unlock window
            // in which a user could cut in
            self.set_latest_run(&next).await?;
            self.current = Some(next.clone());
            self.schedule_run(&next).await?;
        } else if self.workspace.lock == LockHolder::Run(run.id.clone()) {
            // the unlock is attributed to the run, not a user, for audit;
            // a run that finished without ever taking the lock (canceled
            // while blocked behind a user lock) has nothing to release
            let subject = LockHolder::Run(run.id.clone());
            self.workspace = self
                .workspaces
                .unlock_workspace(&self.workspace.id, &subject)
                .await?;
        }
        Ok(())
    }

    /// Record `run` as the workspace's latest, skipping the write when the
    /// workspace already points at it.
    async fn set_latest_run(&mut self, run: &Run) -> Result<()> {
        if self.workspace.latest_run_id.as_deref() == Some(run.id.as_str()) {
            return Ok(());
        }
        self.workspace = self
            .workspaces
            .set_latest_run(&self.workspace.id, &run.id)
            .await?;
        Ok(())
    }

    /// Lock the workspace for `run` and dispatch it.
    ///
    /// A no-op unless the run is still `Pending`. A user-held lock leaves
    /// the run where it is; the next unlock event retries. Losing a lock
    /// race is equally benign.
    async fn schedule_run(&mut self, run: &Run) -> Result<()> {
        if run.status != RunStatus::Pending {
            return Ok(());
        }
        if self.workspace.locked_by_user() {
            debug!(
                run_id = %run.id,
                workspace_id = %self.workspace.id,
                "workspace locked by user, run stays queued"
            );
            return Ok(());
        }

        let holder = LockHolder::Run(run.id.clone());
        match self.workspaces.lock_workspace(&self.workspace.id, &holder).await {
            Ok(ws) => self.workspace = ws,
            Err(CoreError::WorkspaceAlreadyLocked { holder, .. }) => {
                debug!(
                    run_id = %run.id,
                    workspace_id = %self.workspace.id,
                    holder,
                    "lost lock race, run stays queued"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        if let Some(dispatched) = self.dispatch(run).await? {
            self.current = Some(dispatched);
        }
        Ok(())
    }

    /// Hand a run to the execution backend, tolerating redelivery.
    async fn dispatch(&self, run: &Run) -> Result<Option<Run>> {
        match self.runs.dispatch(&run.id).await {
            Ok(dispatched) => {
                info!(
                    run_id = %dispatched.id,
                    workspace_id = %dispatched.workspace_id,
                    speculative = dispatched.speculative,
                    "run dispatched"
                );
                Ok(Some(dispatched))
            }
            // the event was stale; another pass already dispatched the run
            Err(CoreError::InvalidRunTransition { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
