// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tarmac-core.
//!
//! Provides a unified error type shared by the domain entities, the
//! persistence layer, and the scheduling subsystem.

use crate::run::RunStatus;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while scheduling and persisting runs.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Workspace was not found in the database.
    #[error("workspace '{workspace_id}' not found")]
    WorkspaceNotFound {
        /// The workspace ID that was not found.
        workspace_id: String,
    },

    /// Run was not found in the database.
    #[error("run '{run_id}' not found")]
    RunNotFound {
        /// The run ID that was not found.
        run_id: String,
    },

    /// Workspace is already locked by another holder.
    ///
    /// This is an expected race: a user may grab the lock between the
    /// scheduler's check and its lock attempt. Callers treat it as
    /// "wait for the next unlock event", not as a failure.
    #[error("workspace '{workspace_id}' is already locked by {holder}")]
    WorkspaceAlreadyLocked {
        /// The workspace that is locked.
        workspace_id: String,
        /// Description of the current lock holder.
        holder: String,
    },

    /// An unlock was attempted by an identity that does not hold the lock.
    #[error("workspace '{workspace_id}' cannot be unlocked by {subject}")]
    WorkspaceNotLockHolder {
        /// The workspace in question.
        workspace_id: String,
        /// Description of the identity attempting the unlock.
        subject: String,
    },

    /// A run operation is not valid in the run's current status.
    #[error("run '{run_id}' cannot {operation} from status {status}")]
    InvalidRunTransition {
        /// The run in question.
        run_id: String,
        /// The run's current status.
        status: RunStatus,
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// An event subscription fell behind and missed events.
    ///
    /// Recovery is a full reinitialization, not incremental patching.
    #[error("event subscription lagged, {missed} events missed")]
    SubscriptionLagged {
        /// Number of events the subscriber missed.
        missed: u64,
    },

    /// Database operation failed.
    #[error("database error during '{operation}': {source}")]
    Database {
        /// The operation that failed.
        operation: &'static str,
        /// The underlying sqlx error.
        source: sqlx::Error,
    },

    /// Serializing or deserializing an event payload failed.
    #[error("event payload error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Wrap an sqlx error with the name of the failing operation.
    pub fn database(operation: &'static str, source: sqlx::Error) -> Self {
        CoreError::Database { operation, source }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Database {
            operation: "query",
            source: err,
        }
    }
}
