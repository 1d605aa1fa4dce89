// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared in-memory stores and fixtures for scheduler tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use tarmac_core::error::{CoreError, Result};
use tarmac_core::lock::{ClusterLock, LockLease};
use tarmac_core::persistence::{Page, PageOptions, RunStore, WorkspaceStore};
use tarmac_core::run::{Run, RunStatus};
use tarmac_core::workspace::{LockHolder, Workspace};

fn paginate<T: Clone>(items: &[T], page: PageOptions) -> Page<T> {
    let start = (page.offset() as usize).min(items.len());
    let end = (start + page.limit() as usize).min(items.len());
    let next_page = if end < items.len() {
        Some(page.page_number.max(1) + 1)
    } else {
        None
    };
    Page {
        items: items[start..end].to_vec(),
        next_page,
    }
}

/// In-memory workspace store enforcing the same lock rules as Postgres.
pub struct MockWorkspaceStore {
    workspaces: Mutex<BTreeMap<String, Workspace>>,
    set_latest_run_calls: AtomicUsize,
}

impl MockWorkspaceStore {
    pub fn new() -> Self {
        Self {
            workspaces: Mutex::new(BTreeMap::new()),
            set_latest_run_calls: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, workspace: Workspace) {
        self.workspaces
            .lock()
            .unwrap()
            .insert(workspace.id.clone(), workspace);
    }

    pub fn get(&self, workspace_id: &str) -> Option<Workspace> {
        self.workspaces.lock().unwrap().get(workspace_id).cloned()
    }

    pub fn set_latest_run_calls(&self) -> usize {
        self.set_latest_run_calls.load(Ordering::SeqCst)
    }

    fn with_workspace<T>(
        &self,
        workspace_id: &str,
        f: impl FnOnce(&mut Workspace) -> Result<T>,
    ) -> Result<T> {
        let mut workspaces = self.workspaces.lock().unwrap();
        let workspace = workspaces
            .get_mut(workspace_id)
            .ok_or_else(|| CoreError::WorkspaceNotFound {
                workspace_id: workspace_id.to_string(),
            })?;
        f(workspace)
    }
}

#[async_trait]
impl WorkspaceStore for MockWorkspaceStore {
    async fn list_workspaces(&self, page: PageOptions) -> Result<Page<Workspace>> {
        let workspaces: Vec<Workspace> =
            self.workspaces.lock().unwrap().values().cloned().collect();
        Ok(paginate(&workspaces, page))
    }

    async fn lock_workspace(&self, workspace_id: &str, holder: &LockHolder) -> Result<Workspace> {
        self.with_workspace(workspace_id, |ws| {
            ws.lock(holder.clone())?;
            Ok(ws.clone())
        })
    }

    async fn unlock_workspace(
        &self,
        workspace_id: &str,
        subject: &LockHolder,
    ) -> Result<Workspace> {
        self.with_workspace(workspace_id, |ws| {
            ws.unlock(subject)?;
            Ok(ws.clone())
        })
    }

    async fn set_latest_run(&self, workspace_id: &str, run_id: &str) -> Result<Workspace> {
        self.set_latest_run_calls.fetch_add(1, Ordering::SeqCst);
        self.with_workspace(workspace_id, |ws| {
            ws.latest_run_id = Some(run_id.to_string());
            Ok(ws.clone())
        })
    }
}

/// In-memory run store with the same dispatch guard as Postgres.
pub struct MockRunStore {
    runs: Mutex<Vec<Run>>,
    dispatch_calls: AtomicUsize,
}

impl MockRunStore {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            dispatch_calls: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, run: Run) {
        self.runs.lock().unwrap().push(run);
    }

    pub fn get(&self, run_id: &str) -> Option<Run> {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == run_id)
            .cloned()
    }

    /// Number of successful dispatches.
    pub fn dispatch_calls(&self) -> usize {
        self.dispatch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunStore for MockRunStore {
    async fn list_incomplete_runs(&self, page: PageOptions) -> Result<Page<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.done())
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(&runs, page))
    }

    async fn dispatch(&self, run_id: &str) -> Result<Run> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| CoreError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        run.enqueue_plan()?;
        self.dispatch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(run.clone())
    }
}

/// Cluster lock granting every acquisition immediately, counting handoffs.
pub struct MockClusterLock {
    acquired: AtomicUsize,
    released: std::sync::Arc<AtomicUsize>,
}

impl MockClusterLock {
    pub fn new() -> Self {
        Self {
            acquired: AtomicUsize::new(0),
            released: std::sync::Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterLock for MockClusterLock {
    async fn wait_and_lock(&self, _id: i64) -> Result<Box<dyn LockLease>> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockLockLease {
            released: std::sync::Arc::clone(&self.released),
            clean: false,
        }))
    }
}

struct MockLockLease {
    released: std::sync::Arc<AtomicUsize>,
    clean: bool,
}

#[async_trait]
impl LockLease for MockLockLease {
    async fn release(mut self: Box<Self>) -> Result<()> {
        self.clean = true;
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MockLockLease {
    fn drop(&mut self) {
        // a dropped lease still counts as a released lock, matching the
        // connection-drop semantics of the Postgres implementation
        if !self.clean {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A run created `age_secs` seconds ago, in the given status.
pub fn run_created_ago(workspace_id: &str, status: RunStatus, age_secs: i64) -> Run {
    let mut run = Run::new(workspace_id, false);
    run.status = status;
    run.created_at = Utc::now() - Duration::seconds(age_secs);
    run
}
