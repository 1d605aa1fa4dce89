// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run entity and its status state machine.
//!
//! A run is one plan/apply execution request against a workspace. The
//! scheduler never drives these transitions directly; it reacts to status
//! changes delivered as events, and only ever asks the run store to
//! dispatch a `Pending` run.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Cool-off period after a cancel request before a force-cancel is honoured.
const FORCE_CANCEL_COOL_OFF_SECS: i64 = 10;

/// Status of a run.
///
/// Happy path: `Pending → PlanQueued → Planning → Planned → ApplyQueued →
/// Applying → Applied`. `Discarded`, `Canceled`, `ForceCanceled` and
/// `Errored` are the other terminal statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "run_status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet handed to the execution backend.
    Pending,
    /// Queued for planning.
    PlanQueued,
    /// Plan in progress.
    Planning,
    /// Plan finished, awaiting confirmation or apply.
    Planned,
    /// Queued for applying.
    ApplyQueued,
    /// Apply in progress.
    Applying,
    /// Apply finished successfully.
    Applied,
    /// Discarded before applying.
    Discarded,
    /// Gracefully canceled.
    Canceled,
    /// Forcefully canceled after the cool-off period.
    ForceCanceled,
    /// Plan or apply errored.
    Errored,
}

impl RunStatus {
    /// Whether this status is terminal.
    pub fn done(&self) -> bool {
        matches!(
            self,
            RunStatus::Applied
                | RunStatus::Discarded
                | RunStatus::Canceled
                | RunStatus::ForceCanceled
                | RunStatus::Errored
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::PlanQueued => "plan_queued",
            RunStatus::Planning => "planning",
            RunStatus::Planned => "planned",
            RunStatus::ApplyQueued => "apply_queued",
            RunStatus::Applying => "applying",
            RunStatus::Applied => "applied",
            RunStatus::Discarded => "discarded",
            RunStatus::Canceled => "canceled",
            RunStatus::ForceCanceled => "force_canceled",
            RunStatus::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// A plan/apply execution request against a workspace.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Run {
    /// Unique run identifier.
    pub id: String,
    /// The workspace this run executes against.
    pub workspace_id: String,
    /// Current status.
    pub status: RunStatus,
    /// Speculative runs are read-only: they never lock their workspace and
    /// bypass the workspace queue. Immutable after creation.
    pub speculative: bool,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// Earliest time a force-cancel is honoured, set by a cancel request.
    pub force_cancel_available_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Create a new run against a workspace, in `Pending` status.
    pub fn new(workspace_id: impl Into<String>, speculative: bool) -> Self {
        Self {
            id: format!("run-{}", Uuid::new_v4().simple()),
            workspace_id: workspace_id.into(),
            status: RunStatus::Pending,
            speculative,
            created_at: Utc::now(),
            force_cancel_available_at: None,
        }
    }

    /// Whether the run has reached a terminal status.
    pub fn done(&self) -> bool {
        self.status.done()
    }

    /// Whether the run can be discarded.
    pub fn discardable(&self) -> bool {
        matches!(self.status, RunStatus::Pending | RunStatus::Planned)
    }

    /// Whether the run can be canceled.
    pub fn cancelable(&self) -> bool {
        matches!(
            self.status,
            RunStatus::Pending
                | RunStatus::PlanQueued
                | RunStatus::Planning
                | RunStatus::Planned
                | RunStatus::ApplyQueued
                | RunStatus::Applying
        )
    }

    /// Hand the run to the execution backend for planning.
    ///
    /// Only a `Pending` run can be dispatched; this is the guard that makes
    /// event redelivery safe.
    pub fn enqueue_plan(&mut self) -> Result<()> {
        if self.status != RunStatus::Pending {
            return Err(self.invalid_transition("enqueue a plan"));
        }
        self.status = RunStatus::PlanQueued;
        Ok(())
    }

    /// Queue the apply phase of a planned run.
    pub fn queue_apply(&mut self) -> Result<()> {
        if self.status != RunStatus::Planned {
            return Err(self.invalid_transition("queue an apply"));
        }
        self.status = RunStatus::ApplyQueued;
        Ok(())
    }

    /// Discard the run.
    pub fn discard(&mut self) -> Result<()> {
        if !self.discardable() {
            return Err(self.invalid_transition("discard"));
        }
        self.status = RunStatus::Discarded;
        Ok(())
    }

    /// Request a graceful stop.
    ///
    /// Also opens the force-cancel window after a cool-off period. How the
    /// stop reaches an in-flight plan or apply is the execution backend's
    /// concern; only the status transition is modelled here.
    pub fn issue_cancel(&mut self) -> Result<()> {
        if !self.cancelable() {
            return Err(self.invalid_transition("cancel"));
        }
        self.force_cancel_available_at =
            Some(Utc::now() + Duration::seconds(FORCE_CANCEL_COOL_OFF_SECS));
        self.status = RunStatus::Canceled;
        Ok(())
    }

    /// Stop the run immediately.
    ///
    /// Only honoured once the cool-off period opened by
    /// [`issue_cancel`](Self::issue_cancel) has elapsed.
    pub fn force_cancel(&mut self) -> Result<()> {
        match self.force_cancel_available_at {
            Some(available_at) if Utc::now() > available_at => {
                self.status = RunStatus::ForceCanceled;
                Ok(())
            }
            _ => Err(self.invalid_transition("force-cancel")),
        }
    }

    fn invalid_transition(&self, operation: &'static str) -> CoreError {
        CoreError::InvalidRunTransition {
            run_id: self.id.clone(),
            status: self.status,
            operation,
        }
    }
}
