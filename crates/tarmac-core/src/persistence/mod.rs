// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence contracts for workspaces and runs.
//!
//! The scheduler depends on these traits, never on concrete stores. The
//! Postgres implementations live in [`postgres`]; tests substitute in-memory
//! mocks.

pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::run::Run;
use crate::workspace::{LockHolder, Workspace};

/// Largest page size a listing accepts; larger requests are clamped.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination parameters for listing operations.
#[derive(Debug, Clone, Copy)]
pub struct PageOptions {
    /// 1-based page number.
    pub page_number: i64,
    /// Number of items per page, clamped to [`MAX_PAGE_SIZE`].
    pub page_size: i64,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page_number: 1,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl PageOptions {
    /// The page for the given 1-based page number, at the maximum size.
    pub fn page(page_number: i64) -> Self {
        Self {
            page_number: page_number.max(1),
            page_size: MAX_PAGE_SIZE,
        }
    }

    /// Effective page size after clamping.
    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> i64 {
        (self.page_number.max(1) - 1) * self.limit()
    }
}

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// The next page number, if more items exist.
    pub next_page: Option<i64>,
}

/// Workspace persistence operations used by the scheduler.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// List all workspaces, paginated.
    async fn list_workspaces(&self, page: PageOptions) -> Result<Page<Workspace>>;

    /// Lock a workspace on behalf of `holder`, returning the fresh
    /// workspace.
    ///
    /// Fails with [`CoreError::WorkspaceAlreadyLocked`] when another
    /// holder has it, except that a run may take over a lock held by
    /// another run.
    ///
    /// [`CoreError::WorkspaceAlreadyLocked`]: crate::error::CoreError::WorkspaceAlreadyLocked
    async fn lock_workspace(&self, workspace_id: &str, holder: &LockHolder) -> Result<Workspace>;

    /// Release a workspace lock on behalf of `subject`, returning the fresh
    /// workspace. A no-op when the workspace is already unlocked.
    async fn unlock_workspace(&self, workspace_id: &str, subject: &LockHolder)
    -> Result<Workspace>;

    /// Record `run_id` as the workspace's most recently scheduled run.
    async fn set_latest_run(&self, workspace_id: &str, run_id: &str) -> Result<Workspace>;
}

/// Run persistence operations used by the scheduler.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// List runs that have not reached a terminal status, newest first.
    async fn list_incomplete_runs(&self, page: PageOptions) -> Result<Page<Run>>;

    /// Hand a `Pending` run to the execution backend for planning.
    ///
    /// Returns the run in its new status. A run in any other status fails
    /// with [`CoreError::InvalidRunTransition`], which makes dispatch safe
    /// to re-attempt on event redelivery.
    ///
    /// [`CoreError::InvalidRunTransition`]: crate::error::CoreError::InvalidRunTransition
    async fn dispatch(&self, run_id: &str) -> Result<Run>;
}
