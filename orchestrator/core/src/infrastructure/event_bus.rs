// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Outbound push channel for domain events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Observers (UI bridges, CLI sinks) subscribe and receive every event
// published after they subscribed. Fire-and-forget: no ack, no retry,
// no replay. Events are lost on restart.

use crate::domain::events::{ConflictEvent, LockEvent, SwarmEvent, WorkspaceEvent};
use crate::domain::swarm::SwarmExecutionId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Lock(LockEvent),
    Conflict(ConflictEvent),
    Swarm(SwarmEvent),
    Workspace(WorkspaceEvent),
}

impl DomainEvent {
    /// Wire name of the event on the push channel (e.g. `lockAcquired`).
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::Lock(event) => event.name(),
            DomainEvent::Conflict(event) => event.name(),
            DomainEvent::Swarm(event) => event.name(),
            DomainEvent::Workspace(event) => event.name(),
        }
    }
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_lock_event(&self, event: LockEvent) {
        self.publish(DomainEvent::Lock(event));
    }

    pub fn publish_conflict_event(&self, event: ConflictEvent) {
        self.publish(DomainEvent::Conflict(event));
    }

    pub fn publish_swarm_event(&self, event: SwarmEvent) {
        self.publish(DomainEvent::Swarm(event));
    }

    pub fn publish_workspace_event(&self, event: WorkspaceEvent) {
        self.publish(DomainEvent::Workspace(event));
    }

    /// Publish a domain event to all subscribers
    pub fn publish(&self, event: DomainEvent) {
        debug!(event = event.name(), "Publishing event");

        // send() only fails when nobody is listening
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    /// Returns a receiver that can be used to listen for events
    pub fn subscribe(&self) -> EventReceiver {
        let receiver = self.sender.subscribe();
        EventReceiver { receiver }
    }

    /// Subscribe and filter for one swarm execution
    pub fn subscribe_swarm(&self, execution_id: SwarmExecutionId) -> SwarmEventReceiver {
        let receiver = self.sender.subscribe();
        SwarmEventReceiver {
            receiver,
            execution_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until an event is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for the events of a single swarm execution
pub struct SwarmEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    execution_id: SwarmExecutionId,
}

impl SwarmEventReceiver {
    /// Receive the next event for the execution, skipping everything else
    pub async fn recv(&mut self) -> Result<SwarmEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Swarm(swarm_event) = event {
                if swarm_event.execution_id() == self.execution_id {
                    return Ok(swarm_event);
                }
            }
        }
    }
}

fn map_recv_error(error: broadcast::error::RecvError) -> EventBusError {
    match error {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
