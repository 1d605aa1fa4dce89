// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tarmac Core - Run Scheduling Domain and Persistence
//!
//! This crate provides the domain model and infrastructure for scheduling
//! Terraform-style runs against workspaces: the run and workspace entities,
//! the event distribution layer, Postgres persistence, and the cluster-wide
//! lock that keeps exactly one scheduler active. The scheduler itself lives
//! in `tarmac-scheduler`.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     Run-creating surfaces                     │
//! │                 (API, CLI, VCS-triggered runs)                │
//! └───────────────────────────────────────────────────────────────┘
//!                │ writes runs/workspaces        ▲
//!                ▼                               │ events
//! ┌───────────────────────┐          ┌───────────────────────────┐
//! │      PostgreSQL       │──NOTIFY──│     tarmac-scheduler      │
//! │  workspaces + runs    │◄─LISTEN──│ (queues, cluster singleton)│
//! └───────────────────────┘          └───────────────────────────┘
//! ```
//!
//! Every process shares one database. Mutations publish a `pg_notify`
//! event; each process's listener feeds its local [`event::EventBroker`],
//! so all processes observe the same event order.
//!
//! # Run Status State Machine
//!
//! ```text
//! ┌─────────┐   ┌────────────┐   ┌──────────┐   ┌─────────┐
//! │ PENDING │──▶│ PLAN_QUEUED│──▶│ PLANNING │──▶│ PLANNED │
//! └────┬────┘   └────────────┘   └──────────┘   └────┬────┘
//!      │                                             │
//!      │ discard/cancel                              ▼
//!      │                                     ┌─────────────┐
//!      ▼                                     │ APPLY_QUEUED│
//! ┌───────────┐                              └──────┬──────┘
//! │ DISCARDED │                                     ▼
//! │ CANCELED  │                              ┌──────────┐   ┌─────────┐
//! │ ERRORED   │◄─────────────────────────────│ APPLYING │──▶│ APPLIED │
//! └───────────┘                              └──────────┘   └─────────┘
//! ```
//!
//! Terminal statuses are `APPLIED`, `DISCARDED`, `CANCELED`,
//! `FORCE_CANCELED` and `ERRORED`. The scheduler dispatches `PENDING` runs
//! and reacts to everything else.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TARMAC_DATABASE_URL` | Yes | - | PostgreSQL connection string |
//! | `TARMAC_DB_MAX_CONNECTIONS` | No | `10` | Maximum pool connections |
//! | `TARMAC_EVENT_BUFFER` | No | `1024` | Event buffer per subscriber |
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Unified error type
//! - [`event`]: Event types and the in-process broker
//! - [`lock`]: Cluster-wide advisory lock
//! - [`migrations`]: Embedded database migrations
//! - [`persistence`]: Store contracts and Postgres implementations
//! - [`pubsub`]: Cross-process event distribution over NOTIFY/LISTEN
//! - [`retry`]: Retry loop with exponential backoff
//! - [`run`]: Run entity and status state machine
//! - [`workspace`]: Workspace entity and its lock

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Error types for scheduling and persistence operations.
pub mod error;

/// Event types and the in-process event broker.
pub mod event;

/// Cluster-wide advisory lock for singleton services.
pub mod lock;

/// Embedded database migrations.
pub mod migrations;

/// Persistence contracts and their Postgres implementations.
pub mod persistence;

/// Cross-process event distribution over Postgres NOTIFY/LISTEN.
pub mod pubsub;

/// Retry loop with exponential backoff.
pub mod retry;

/// Run entity and status state machine.
pub mod run;

/// Workspace entity and its lock.
pub mod workspace;
