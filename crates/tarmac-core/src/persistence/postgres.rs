// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed workspace and run stores.
//!
//! Mutations publish a cluster-wide event through [`PgEventChannel`] after
//! the row is committed, carrying the fresh snapshot the UPDATE returned.
//! Lock semantics are enforced in the UPDATE's WHERE clause, so two
//! processes racing for the same lock resolve on the row, not in
//! application code.

use sqlx::postgres::PgPool;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::event::EventKind;
use crate::persistence::{Page, PageOptions, RunStore, WorkspaceStore};
use crate::pubsub::PgEventChannel;
use crate::run::{Run, RunStatus};
use crate::workspace::{LockHolder, Workspace};

const SELECT_WORKSPACE: &str = "SELECT workspace_id, organization, lock_kind, lock_id, \
     latest_run_id FROM workspaces";

const SELECT_RUN: &str = "SELECT run_id AS id, workspace_id, status, speculative, created_at, \
     force_cancel_available_at FROM runs";

/// Row shape of the `workspaces` table.
#[derive(sqlx::FromRow)]
struct WorkspaceRow {
    workspace_id: String,
    organization: String,
    lock_kind: Option<String>,
    lock_id: Option<String>,
    latest_run_id: Option<String>,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        let lock = match (row.lock_kind.as_deref(), row.lock_id) {
            (Some("user"), Some(id)) => LockHolder::User(id),
            (Some("run"), Some(id)) => LockHolder::Run(id),
            _ => LockHolder::Unlocked,
        };
        Workspace {
            id: row.workspace_id,
            organization: row.organization,
            lock,
            latest_run_id: row.latest_run_id,
        }
    }
}

fn lock_columns(holder: &LockHolder) -> (Option<&'static str>, Option<&str>) {
    match holder {
        LockHolder::Unlocked => (None, None),
        LockHolder::User(id) => (Some("user"), Some(id)),
        LockHolder::Run(id) => (Some("run"), Some(id)),
    }
}

fn into_page<T>(mut items: Vec<T>, page: PageOptions) -> Page<T> {
    // one extra row is fetched to detect whether another page exists
    let next_page = if items.len() as i64 > page.limit() {
        items.truncate(page.limit() as usize);
        Some(page.page_number.max(1) + 1)
    } else {
        None
    };
    Page { items, next_page }
}

/// PostgreSQL workspace store.
#[derive(Clone)]
pub struct PgWorkspaceStore {
    pool: PgPool,
    events: PgEventChannel,
}

impl PgWorkspaceStore {
    /// Create a store over the given pool.
    pub fn new(pool: PgPool, events: PgEventChannel) -> Self {
        Self { pool, events }
    }

    /// Insert a workspace. Used by provisioning flows and integration tests;
    /// the scheduler itself never creates workspaces.
    pub async fn create_workspace(&self, workspace: &Workspace) -> Result<Workspace> {
        let (lock_kind, lock_id) = lock_columns(&workspace.lock);
        let row: WorkspaceRow = sqlx::query_as(
            "INSERT INTO workspaces (workspace_id, organization, lock_kind, lock_id, latest_run_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING workspace_id, organization, lock_kind, lock_id, latest_run_id",
        )
        .bind(&workspace.id)
        .bind(&workspace.organization)
        .bind(lock_kind)
        .bind(lock_id)
        .bind(&workspace.latest_run_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::database("create workspace", e))?;

        let workspace: Workspace = row.into();
        self.events
            .publish(&EventKind::WorkspaceChanged(workspace.clone()))
            .await?;
        Ok(workspace)
    }

    /// Delete a workspace.
    pub async fn delete_workspace(&self, workspace_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM workspaces WHERE workspace_id = $1")
            .bind(workspace_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::database("delete workspace", e))?;
        if result.rows_affected() == 0 {
            return Err(CoreError::WorkspaceNotFound {
                workspace_id: workspace_id.to_string(),
            });
        }
        self.events
            .publish(&EventKind::WorkspaceDeleted(workspace_id.to_string()))
            .await?;
        Ok(())
    }

    async fn fetch_workspace(&self, workspace_id: &str) -> Result<Workspace> {
        let row: Option<WorkspaceRow> =
            sqlx::query_as(&format!("{SELECT_WORKSPACE} WHERE workspace_id = $1"))
                .bind(workspace_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CoreError::database("get workspace", e))?;
        row.map(Workspace::from)
            .ok_or_else(|| CoreError::WorkspaceNotFound {
                workspace_id: workspace_id.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl WorkspaceStore for PgWorkspaceStore {
    async fn list_workspaces(&self, page: PageOptions) -> Result<Page<Workspace>> {
        let rows: Vec<WorkspaceRow> = sqlx::query_as(&format!(
            "{SELECT_WORKSPACE} ORDER BY workspace_id LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit() + 1)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::database("list workspaces", e))?;

        let items: Vec<Workspace> = rows.into_iter().map(Workspace::from).collect();
        Ok(into_page(items, page))
    }

    async fn lock_workspace(&self, workspace_id: &str, holder: &LockHolder) -> Result<Workspace> {
        let (lock_kind, lock_id) = lock_columns(holder);

        // a run may take over a run-held lock; everything else requires the
        // workspace to be unlocked
        let row: Option<WorkspaceRow> = sqlx::query_as(
            "UPDATE workspaces SET lock_kind = $2, lock_id = $3 \
             WHERE workspace_id = $1 \
               AND (lock_kind IS NULL OR (lock_kind = 'run' AND $2 = 'run')) \
             RETURNING workspace_id, organization, lock_kind, lock_id, latest_run_id",
        )
        .bind(workspace_id)
        .bind(lock_kind)
        .bind(lock_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::database("lock workspace", e))?;

        match row {
            Some(row) => {
                let workspace: Workspace = row.into();
                debug!(workspace_id, holder = %holder, "workspace locked");
                self.events
                    .publish(&EventKind::WorkspaceChanged(workspace.clone()))
                    .await?;
                Ok(workspace)
            }
            None => {
                // distinguish "gone" from "someone else has it"
                let current = self.fetch_workspace(workspace_id).await?;
                Err(CoreError::WorkspaceAlreadyLocked {
                    workspace_id: workspace_id.to_string(),
                    holder: current.lock.to_string(),
                })
            }
        }
    }

    async fn unlock_workspace(
        &self,
        workspace_id: &str,
        subject: &LockHolder,
    ) -> Result<Workspace> {
        let (lock_kind, lock_id) = lock_columns(subject);

        let row: Option<WorkspaceRow> = sqlx::query_as(
            "UPDATE workspaces SET lock_kind = NULL, lock_id = NULL \
             WHERE workspace_id = $1 AND lock_kind = $2 AND lock_id = $3 \
             RETURNING workspace_id, organization, lock_kind, lock_id, latest_run_id",
        )
        .bind(workspace_id)
        .bind(lock_kind)
        .bind(lock_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::database("unlock workspace", e))?;

        match row {
            Some(row) => {
                let workspace: Workspace = row.into();
                debug!(workspace_id, subject = %subject, "workspace unlocked");
                self.events
                    .publish(&EventKind::WorkspaceUnlocked(workspace.clone()))
                    .await?;
                Ok(workspace)
            }
            None => {
                let current = self.fetch_workspace(workspace_id).await?;
                if !current.locked() {
                    // already unlocked, nothing to do
                    return Ok(current);
                }
                Err(CoreError::WorkspaceNotLockHolder {
                    workspace_id: workspace_id.to_string(),
                    subject: subject.to_string(),
                })
            }
        }
    }

    async fn set_latest_run(&self, workspace_id: &str, run_id: &str) -> Result<Workspace> {
        let row: Option<WorkspaceRow> = sqlx::query_as(
            "UPDATE workspaces SET latest_run_id = $2 WHERE workspace_id = $1 \
             RETURNING workspace_id, organization, lock_kind, lock_id, latest_run_id",
        )
        .bind(workspace_id)
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::database("set latest run", e))?;

        let workspace: Workspace = row
            .map(Workspace::from)
            .ok_or_else(|| CoreError::WorkspaceNotFound {
                workspace_id: workspace_id.to_string(),
            })?;
        self.events
            .publish(&EventKind::WorkspaceChanged(workspace.clone()))
            .await?;
        Ok(workspace)
    }
}

/// PostgreSQL run store.
#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
    events: PgEventChannel,
}

impl PgRunStore {
    /// Create a store over the given pool.
    pub fn new(pool: PgPool, events: PgEventChannel) -> Self {
        Self { pool, events }
    }

    /// Insert a run. Used by run-creating surfaces and integration tests;
    /// the scheduler only dispatches runs others created.
    pub async fn create_run(&self, run: &Run) -> Result<Run> {
        let created: Run = sqlx::query_as(
            "INSERT INTO runs (run_id, workspace_id, status, speculative, created_at, \
             force_cancel_available_at) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING run_id AS id, workspace_id, status, speculative, created_at, \
             force_cancel_available_at",
        )
        .bind(&run.id)
        .bind(&run.workspace_id)
        .bind(run.status)
        .bind(run.speculative)
        .bind(run.created_at)
        .bind(run.force_cancel_available_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::database("create run", e))?;

        self.events
            .publish(&EventKind::RunChanged(created.clone()))
            .await?;
        Ok(created)
    }

    /// Set a run's status, returning the fresh run.
    pub async fn set_status(&self, run_id: &str, status: RunStatus) -> Result<Run> {
        let run: Option<Run> = sqlx::query_as(
            "UPDATE runs SET status = $2 WHERE run_id = $1 \
             RETURNING run_id AS id, workspace_id, status, speculative, created_at, \
             force_cancel_available_at",
        )
        .bind(run_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::database("set run status", e))?;

        let run = run.ok_or_else(|| CoreError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        self.events
            .publish(&EventKind::RunChanged(run.clone()))
            .await?;
        Ok(run)
    }
}

#[async_trait::async_trait]
impl RunStore for PgRunStore {
    async fn list_incomplete_runs(&self, page: PageOptions) -> Result<Page<Run>> {
        let runs: Vec<Run> = sqlx::query_as(&format!(
            "{SELECT_RUN} WHERE status NOT IN \
             ('applied', 'discarded', 'canceled', 'force_canceled', 'errored') \
             ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit() + 1)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::database("list incomplete runs", e))?;

        Ok(into_page(runs, page))
    }

    async fn dispatch(&self, run_id: &str) -> Result<Run> {
        // the status guard in the WHERE clause makes dispatch idempotent
        // under event redelivery
        let run: Option<Run> = sqlx::query_as(
            "UPDATE runs SET status = 'plan_queued' \
             WHERE run_id = $1 AND status = 'pending' \
             RETURNING run_id AS id, workspace_id, status, speculative, created_at, \
             force_cancel_available_at",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::database("dispatch run", e))?;

        match run {
            Some(run) => {
                debug!(run_id, "run dispatched for planning");
                self.events
                    .publish(&EventKind::RunChanged(run.clone()))
                    .await?;
                Ok(run)
            }
            None => {
                let current: Option<Run> =
                    sqlx::query_as(&format!("{SELECT_RUN} WHERE run_id = $1"))
                        .bind(run_id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(|e| CoreError::database("get run", e))?;
                match current {
                    Some(run) => Err(CoreError::InvalidRunTransition {
                        run_id: run.id,
                        status: run.status,
                        operation: "enqueue a plan",
                    }),
                    None => Err(CoreError::RunNotFound {
                        run_id: run_id.to_string(),
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_row_lock_conversion() {
        let row = WorkspaceRow {
            workspace_id: "ws-1".into(),
            organization: "acme".into(),
            lock_kind: Some("run".into()),
            lock_id: Some("run-1".into()),
            latest_run_id: None,
        };
        let ws: Workspace = row.into();
        assert_eq!(ws.lock, LockHolder::Run("run-1".into()));

        let row = WorkspaceRow {
            workspace_id: "ws-1".into(),
            organization: "acme".into(),
            lock_kind: None,
            lock_id: None,
            latest_run_id: Some("run-2".into()),
        };
        let ws: Workspace = row.into();
        assert_eq!(ws.lock, LockHolder::Unlocked);
        assert_eq!(ws.latest_run_id.as_deref(), Some("run-2"));
    }

    #[test]
    fn test_into_page_detects_more_rows() {
        let page = PageOptions {
            page_number: 1,
            page_size: 2,
        };
        let result = into_page(vec![1, 2, 3], page);
        assert_eq!(result.items, vec![1, 2]);
        assert_eq!(result.next_page, Some(2));

        let result = into_page(vec![1, 2], page);
        assert_eq!(result.items, vec![1, 2]);
        assert_eq!(result.next_page, None);
    }
}
