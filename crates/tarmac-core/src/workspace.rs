// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workspace entity and its lock.
//!
//! A workspace serializes mutations to one piece of Terraform state. The
//! lock records who is allowed to mutate it right now: nobody, a user, or
//! a run. The lock holder identity doubles as the audit subject for lock
//! and unlock actions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// The identity holding a workspace lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LockHolder {
    /// Nobody holds the lock.
    Unlocked,
    /// A user holds the lock (e.g. via the UI or CLI).
    User(String),
    /// A run holds the lock while it plans and applies.
    Run(String),
}

impl std::fmt::Display for LockHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockHolder::Unlocked => f.write_str("unlocked"),
            LockHolder::User(id) => write!(f, "user:{id}"),
            LockHolder::Run(id) => write!(f, "run:{id}"),
        }
    }
}

/// A workspace: the unit of state mutation and of run serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique workspace identifier.
    pub id: String,
    /// Organization the workspace belongs to.
    pub organization: String,
    /// Current lock holder.
    pub lock: LockHolder,
    /// The most recently scheduled run, if any.
    pub latest_run_id: Option<String>,
}

impl Workspace {
    /// Create a new unlocked workspace.
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            id: format!("ws-{}", Uuid::new_v4().simple()),
            organization: organization.into(),
            lock: LockHolder::Unlocked,
            latest_run_id: None,
        }
    }

    /// Whether anyone holds the lock.
    pub fn locked(&self) -> bool {
        self.lock != LockHolder::Unlocked
    }

    /// Whether a user holds the lock.
    ///
    /// A run waiting behind a user lock stays queued until the user
    /// unlocks; a run lock, by contrast, can be taken over by the next run.
    pub fn locked_by_user(&self) -> bool {
        matches!(self.lock, LockHolder::User(_))
    }

    /// Acquire the lock for `holder`.
    ///
    /// Succeeds when the workspace is unlocked, or when a run takes over a
    /// lock held by another run (the queue promotes the next run while the
    /// finished one still nominally holds the lock). Anything else fails
    /// with [`CoreError::WorkspaceAlreadyLocked`].
    pub fn lock(&mut self, holder: LockHolder) -> Result<()> {
        debug_assert!(holder != LockHolder::Unlocked);
        let takeover = matches!(
            (&self.lock, &holder),
            (LockHolder::Unlocked, _) | (LockHolder::Run(_), LockHolder::Run(_))
        );
        if !takeover {
            return Err(CoreError::WorkspaceAlreadyLocked {
                workspace_id: self.id.clone(),
                holder: self.lock.to_string(),
            });
        }
        self.lock = holder;
        Ok(())
    }

    /// Release the lock on behalf of `subject`.
    ///
    /// Only the current holder may unlock.
    pub fn unlock(&mut self, subject: &LockHolder) -> Result<()> {
        if self.lock == LockHolder::Unlocked {
            return Ok(());
        }
        if &self.lock != subject {
            return Err(CoreError::WorkspaceNotLockHolder {
                workspace_id: self.id.clone(),
                subject: subject.to_string(),
            });
        }
        self.lock = LockHolder::Unlocked;
        Ok(())
    }
}
