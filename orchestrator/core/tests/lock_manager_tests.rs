// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the lock manager's public API: the acquire/release
//! handoff between two agents, mutual exclusion under concurrent callers and
//! the background sweeper.

use loom_core::application::{LockManager, LockManagerConfig};
use loom_core::domain::error::ErrorKind;
use loom_core::domain::lock::LockAcquisition;
use loom_core::infrastructure::event_bus::{DomainEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;

fn manager(lease: Duration) -> LockManager {
    LockManager::new(
        LockManagerConfig {
            lease,
            sweep_interval: Duration::from_millis(50),
        },
        EventBus::new(1024),
    )
}

#[tokio::test(start_paused = true)]
async fn test_two_agent_handoff() {
    let locks = manager(Duration::from_secs(300));

    assert!(locks.acquire("src/a.ts", "agent-1").unwrap().is_granted());

    match locks.acquire("src/a.ts", "agent-2").unwrap() {
        LockAcquisition::Denied {
            reason,
            current_holder,
            ..
        } => {
            assert_eq!(current_holder, "agent-1");
            assert!(reason.contains("agent-1"));
        }
        other => panic!("expected denial, got {:?}", other),
    }

    assert_eq!(
        locks.release("src/a.ts", "agent-2").unwrap_err().kind(),
        ErrorKind::Mismatch
    );
    locks.release("src/a.ts", "agent-1").unwrap();
    assert!(locks.acquire("src/a.ts", "agent-2").unwrap().is_granted());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_grants_exactly_one() {
    let locks = Arc::new(manager(Duration::from_secs(300)));

    let attempts: Vec<_> = (0..32)
        .map(|i| {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire("shared/file.rs", &format!("agent-{}", i)) })
        })
        .collect();

    let mut granted = 0;
    for attempt in attempts {
        if attempt.await.unwrap().unwrap().is_granted() {
            granted += 1;
        }
    }

    assert_eq!(granted, 1);
    assert_eq!(locks.list_all().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_publishes_expiry() {
    let bus = EventBus::new(64);
    let mut receiver = bus.subscribe();
    let locks = LockManager::new(
        LockManagerConfig {
            lease: Duration::from_millis(100),
            sweep_interval: Duration::from_millis(30),
        },
        bus,
    );
    let token = locks.start_sweeper();

    locks.acquire("a.txt", "agent-1").unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut names = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let DomainEvent::Lock(event) = event {
            names.push(event.name());
        }
    }
    assert_eq!(names, vec!["lockAcquired", "lockExpired"]);
    assert!(locks.list_all().is_empty());

    token.cancel();
}
