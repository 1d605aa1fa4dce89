// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tarmac Scheduler - Workspace Run Scheduling
//!
//! Decides which run executes next on each workspace and hands it to the
//! execution backend. The rules it enforces:
//!
//! - At most one non-speculative run occupies a workspace at a time, in
//!   creation order.
//! - A run holds the workspace lock while it executes; a user-held lock
//!   pauses scheduling until the user unlocks.
//! - Speculative (read-only) runs bypass the queue and are dispatched
//!   immediately.
//! - Exactly one scheduler is active across the cluster, enforced by an
//!   advisory lock; standbys block on the lock and take over on failure.
//!
//! The scheduler is purely reactive. It owns no run state of its own:
//! everything is rebuilt from the database on startup and on recovery, and
//! kept current by the event stream from `tarmac-core`.
//!
//! # Modules
//!
//! - [`queue`]: Per-workspace run queue
//! - [`scheduler`]: Event routing and bootstrap
//! - [`supervisor`]: Cluster-singleton supervision

#![deny(missing_docs)]

/// Per-workspace run queue.
pub mod queue;

/// Event routing across workspace queues, and scheduler bootstrap.
pub mod scheduler;

/// Cluster-singleton supervision of the scheduler.
pub mod supervisor;
