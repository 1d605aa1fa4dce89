// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event types and the in-process event broker.
//!
//! Every change to a workspace or run is announced as an [`Event`]. The
//! scheduler consumes these through the [`Subscriber`] contract; the
//! [`EventBroker`] is the in-process fan-out hub behind it. Cross-process
//! distribution is layered on top (see [`crate::pubsub`]).
//!
//! The payload union is closed: adding an event kind breaks every match
//! until each handler accounts for it, which is deliberate.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::run::Run;
use crate::workspace::Workspace;

/// Default per-broker event buffer, in events.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Where an event should be visible.
///
/// Carried for the distribution layer's benefit; scheduling logic ignores
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    /// Deliver to subscribers in this process only.
    Local,
    /// Deliver to every process sharing the database.
    ClusterWide,
}

/// The payload of an event: which entity changed, and its fresh snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    /// A workspace was created or updated.
    WorkspaceChanged(Workspace),
    /// A workspace was deleted.
    WorkspaceDeleted(String),
    /// A workspace lock was released. Distinct from `WorkspaceChanged`
    /// because queued runs resume scheduling only on this signal.
    WorkspaceUnlocked(Workspace),
    /// A run was created or changed status.
    RunChanged(Run),
}

impl EventKind {
    /// The workspace this event concerns.
    pub fn workspace_id(&self) -> &str {
        match self {
            EventKind::WorkspaceChanged(ws) | EventKind::WorkspaceUnlocked(ws) => &ws.id,
            EventKind::WorkspaceDeleted(id) => id,
            EventKind::RunChanged(run) => &run.workspace_id,
        }
    }
}

/// An event together with its distribution locality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Where the event should be visible.
    pub locality: Locality,
}

impl Event {
    /// An event visible to this process only.
    pub fn local(kind: EventKind) -> Self {
        Self {
            kind,
            locality: Locality::Local,
        }
    }

    /// An event visible to the whole cluster.
    pub fn cluster(kind: EventKind) -> Self {
        Self {
            kind,
            locality: Locality::ClusterWide,
        }
    }
}

/// The subscription contract consumed by the scheduler.
pub trait Subscriber: Send + Sync {
    /// Open a named subscription to the event stream.
    ///
    /// Events published after this call are buffered for the returned
    /// stream, so subscribing before reading persisted state closes the
    /// bootstrap gap.
    fn subscribe(&self, name: &str) -> EventStream;
}

/// Fan-out hub distributing events to in-process subscribers.
///
/// Built on a bounded broadcast channel: no per-subscriber task is ever
/// spawned, so resource usage is fixed regardless of subscriber count. A
/// subscriber that falls more than the buffer behind observes
/// [`CoreError::SubscriptionLagged`] on its stream and is expected to
/// rebuild from persisted state.
pub struct EventBroker {
    tx: broadcast::Sender<Event>,
}

impl EventBroker {
    /// Create a broker with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// An event published with no subscribers is dropped silently.
    pub fn publish(&self, event: Event) {
        // receiver_count of zero just means nobody cares yet
        let _ = self.tx.send(event);
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl Subscriber for EventBroker {
    fn subscribe(&self, name: &str) -> EventStream {
        debug!(subscriber = name, "event subscription opened");
        EventStream {
            name: name.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

/// A single subscriber's view of the event stream.
pub struct EventStream {
    name: String,
    rx: broadcast::Receiver<Event>,
}

impl EventStream {
    /// Receive the next event.
    ///
    /// Returns `None` once the broker is gone, and
    /// `Some(Err(CoreError::SubscriptionLagged))` if this subscriber fell
    /// behind and events were overwritten.
    pub async fn recv(&mut self) -> Option<Result<Event>> {
        match self.rx.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(subscriber = %self.name, missed, "subscription lagged");
                Some(Err(CoreError::SubscriptionLagged { missed }))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
