// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Change Fan-out Bus
//!
//! Synchronous observer list for workspace [`ChangeEvent`]s. Unlike the
//! broadcast [`EventBus`](super::event_bus::EventBus), delivery happens on the
//! publishing thread: `publish` returns only after every current subscriber
//! has seen the event.
//!
//! - Subscribers are snapshotted before delivery, so subscribing or
//!   unsubscribing from inside a callback never disturbs the round in flight.
//! - A subscriber returning `Err` or panicking is logged and skipped; the
//!   remaining subscribers still receive the event and the publisher never
//!   sees the failure.
//! - Fan-outs are serialized: one event reaches every subscriber before the
//!   next one starts. The guard is re-entrant, so a subscriber may publish
//!   from its own callback.
//! - There is no queue or replay. A late subscriber misses earlier events.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::domain::change::ChangeEvent;
use crate::domain::events::WorkspaceEvent;
use crate::infrastructure::event_bus::EventBus;

/// Receives workspace change events.
pub trait ChangeSubscriber: Send + Sync {
    fn on_change(&self, event: &ChangeEvent) -> anyhow::Result<()>;
}

impl<F> ChangeSubscriber for F
where
    F: Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Registry {
    subscribers: Mutex<BTreeMap<SubscriptionId, Arc<dyn ChangeSubscriber>>>,
    next_id: AtomicU64,
    delivery: ReentrantMutex<()>,
}

#[derive(Clone)]
pub struct ChangeBus {
    registry: Arc<Registry>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                subscribers: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                delivery: ReentrantMutex::new(()),
            }),
        }
    }

    /// Register a subscriber. Dropping the returned handle keeps the
    /// subscription alive; call [`Subscription::unsubscribe`] to end it.
    pub fn subscribe<S>(&self, subscriber: S) -> Subscription
    where
        S: ChangeSubscriber + 'static,
    {
        let id = SubscriptionId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry
            .subscribers
            .lock()
            .insert(id, Arc::new(subscriber));
        debug!(subscription = id.0, "Change subscriber registered");

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Register a closure as a subscriber.
    pub fn subscribe_fn<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(callback)
    }

    /// Deliver `event` to every current subscriber. Returns the number of
    /// subscribers that accepted it.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let _delivery = self.registry.delivery.lock();

        let snapshot: Vec<(SubscriptionId, Arc<dyn ChangeSubscriber>)> = self
            .registry
            .subscribers
            .lock()
            .iter()
            .map(|(id, subscriber)| (*id, Arc::clone(subscriber)))
            .collect();

        metrics::counter!("loom_change_events_total", "kind" => event.kind.as_str()).increment(1);

        let mut delivered = 0;
        for (id, subscriber) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| subscriber.on_change(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(error)) => {
                    warn!(
                        subscription = id.0,
                        path = %event.relative_path,
                        error = %error,
                        "Change subscriber failed"
                    );
                }
                Err(_) => {
                    warn!(
                        subscription = id.0,
                        path = %event.relative_path,
                        "Change subscriber panicked"
                    );
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers.lock().len()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`ChangeBus::subscribe`].
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the subscriber. Safe to call from inside a callback and after
    /// the bus itself has been dropped.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.subscribers.lock().remove(&self.id);
            debug!(subscription = self.id.0, "Change subscriber removed");
        }
    }
}

/// Forwards change events onto the push channel as `file:changed`.
pub struct EventBusForwarder {
    event_bus: EventBus,
}

impl EventBusForwarder {
    pub fn new(event_bus: EventBus) -> Self {
        Self { event_bus }
    }
}

impl ChangeSubscriber for EventBusForwarder {
    fn on_change(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        self.event_bus
            .publish_workspace_event(WorkspaceEvent::FileChanged(event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::change::ChangeKind;
    use crate::infrastructure::event_bus::DomainEvent;
    use std::path::PathBuf;

    fn event(name: &str) -> ChangeEvent {
        ChangeEvent::new(PathBuf::from("/ws").join(name), name, ChangeKind::Updated)
    }

    #[test]
    fn test_failing_subscribers_do_not_block_others() {
        let bus = ChangeBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _err = bus.subscribe_fn(|_: &ChangeEvent| anyhow::bail!("indexer offline"));
        let _panic = bus.subscribe_fn(|_: &ChangeEvent| panic!("boom"));
        let sink = Arc::clone(&seen);
        let _ok = bus.subscribe_fn(move |e: &ChangeEvent| {
            sink.lock().push(e.relative_path.clone());
            Ok(())
        });

        assert_eq!(bus.publish(&event("a.txt")), 1);
        assert_eq!(bus.publish(&event("b.txt")), 1);
        assert_eq!(*seen.lock(), vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = ChangeBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let subscription = bus.subscribe_fn(move |_: &ChangeEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(&event("a.txt"));
        subscription.unsubscribe();
        bus.publish(&event("b.txt"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_during_delivery_is_safe() {
        let bus = ChangeBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let later = Arc::new(AtomicU64::new(0));

        let own = Arc::clone(&slot);
        let first = bus.subscribe_fn(move |_: &ChangeEvent| {
            if let Some(subscription) = own.lock().take() {
                subscription.unsubscribe();
            }
            Ok(())
        });
        *slot.lock() = Some(first);

        let counter = Arc::clone(&later);
        let _second = bus.subscribe_fn(move |_: &ChangeEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.publish(&event("a.txt")), 2);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(&event("b.txt")), 1);
        assert_eq!(later.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reentrant_publish_does_not_deadlock() {
        let bus = ChangeBus::new();
        let inner_bus = bus.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _sub = bus.subscribe_fn(move |e: &ChangeEvent| {
            sink.lock().push(e.relative_path.clone());
            if e.relative_path == "outer.txt" {
                inner_bus.publish(&event("inner.txt"));
            }
            Ok(())
        });

        bus.publish(&event("outer.txt"));
        assert_eq!(*seen.lock(), vec!["outer.txt".to_string(), "inner.txt".to_string()]);
    }

    #[test]
    fn test_unsubscribe_after_bus_dropped() {
        let bus = ChangeBus::new();
        let subscription = bus.subscribe_fn(|_: &ChangeEvent| Ok(()));
        drop(bus);
        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn test_forwarder_publishes_file_changed() {
        let event_bus = EventBus::new(8);
        let mut receiver = event_bus.subscribe();
        let bus = ChangeBus::new();
        let _sub = bus.subscribe(EventBusForwarder::new(event_bus.clone()));

        bus.publish(&event("a.txt"));

        match receiver.recv().await.unwrap() {
            DomainEvent::Workspace(WorkspaceEvent::FileChanged(change)) => {
                assert_eq!(change.relative_path, "a.txt");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
