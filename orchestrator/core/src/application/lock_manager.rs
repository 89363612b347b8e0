// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lock Manager - per-path advisory locks with leased auto-expiry
//!
//! Cooperating agents call [`LockManager::acquire`] before editing a workspace
//! path and [`LockManager::release`] afterwards. Nothing stops a write that
//! bypasses the manager.
//!
//! Expiry has three layers:
//!
//! 1. Every read and acquire checks the lease lazily, so a lock whose age has
//!    reached its lease is treated as absent even before it is reaped.
//! 2. Each granted lock gets a one-shot tokio timer that reaps it when the lease
//!    runs out. Release aborts the timer.
//! 3. [`LockManager::start_sweeper`] runs a periodic backstop for timers that
//!    never fired (process suspend, no runtime at acquire time).
//!
//! Acquisition never suspends: the decision is made under one short critical
//! section, and events are published after the table lock is dropped.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Owns the lock table exclusively

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::config::LockConfig;
use crate::domain::events::LockEvent;
use crate::domain::lock::{FileLock, LockAcquisition, LockError};
use crate::domain::lock_key::LockKey;
use crate::infrastructure::event_bus::EventBus;

/// Lease and sweep settings for one manager.
#[derive(Debug, Clone)]
pub struct LockManagerConfig {
    /// How long a granted lock lives without release.
    pub lease: Duration,
    /// Period of the backstop sweep.
    pub sweep_interval: Duration,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl From<&LockConfig> for LockManagerConfig {
    fn from(config: &LockConfig) -> Self {
        Self {
            lease: config.lease,
            sweep_interval: config.sweep_interval,
        }
    }
}

struct LockEntry {
    lock: FileLock,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl LockEntry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    config: LockManagerConfig,
    locks: Mutex<HashMap<LockKey, LockEntry>>,
    next_generation: AtomicU64,
    event_bus: EventBus,
    sweeper: Mutex<Option<CancellationToken>>,
}

/// Shared handle to the lock table. Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct LockManager {
    inner: Arc<Inner>,
}

impl LockManager {
    pub fn new(config: LockManagerConfig, event_bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                locks: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                event_bus,
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &LockManagerConfig {
        &self.inner.config
    }

    /// Try to take the lock on `path` for `holder_id`.
    ///
    /// An expired lock is reaped and the path treated as free. A live lock
    /// held by someone else yields [`LockAcquisition::Denied`] with the time
    /// left on its lease. Re-acquiring a lock you already hold renews its lease.
    pub fn acquire(&self, path: &str, holder_id: &str) -> Result<LockAcquisition, LockError> {
        let holder_id = validate_holder(holder_id)?;
        let key = LockKey::parse(path)?;
        let now = Instant::now();

        let mut expired = None;
        let outcome = {
            let mut locks = self.inner.locks.lock();

            if let Some(entry) = locks.get_mut(&key) {
                if entry.lock.is_expired_at(now) {
                    entry.cancel_timer();
                    expired = locks.remove(&key).map(|entry| entry.lock);
                } else if !entry.lock.is_held_by(holder_id) {
                    let remaining = entry.lock.remaining_at(now);
                    let denied = LockAcquisition::Denied {
                        reason: format!("{} is locked by {}", key, entry.lock.holder_id),
                        current_holder: entry.lock.holder_id.clone(),
                        expires_in_ms: remaining.as_millis().min(u64::MAX as u128) as u64,
                    };
                    drop(locks);

                    metrics::counter!("loom_lock_acquisitions_total", "outcome" => "denied")
                        .increment(1);
                    debug!(path = %key, holder = %holder_id, "Lock denied");
                    return Ok(denied);
                } else {
                    entry.cancel_timer();
                }
            }

            let lock = FileLock::new(key.clone(), holder_id, self.inner.config.lease);
            let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
            let timer = self.schedule_expiry(key.clone(), generation, &lock);
            locks.insert(
                key.clone(),
                LockEntry {
                    lock: lock.clone(),
                    generation,
                    timer,
                },
            );
            LockAcquisition::Granted { lock }
        };

        if let Some(lock) = expired {
            self.inner.announce_expired(lock);
        }

        metrics::counter!("loom_lock_acquisitions_total", "outcome" => "granted").increment(1);
        info!(path = %key, holder = %holder_id, "Lock acquired");
        if let LockAcquisition::Granted { lock } = &outcome {
            self.inner.event_bus.publish_lock_event(LockEvent::LockAcquired {
                lock: lock.clone(),
            });
        }
        Ok(outcome)
    }

    /// Release `path` on behalf of `holder_id`.
    ///
    /// Fails with [`LockError::NotLocked`] when no live lock exists and with
    /// [`LockError::HolderMismatch`] when someone else holds it; in the
    /// mismatch case the table is left untouched.
    pub fn release(&self, path: &str, holder_id: &str) -> Result<FileLock, LockError> {
        let holder_id = validate_holder(holder_id)?;
        let key = LockKey::parse(path)?;
        let now = Instant::now();

        let mut locks = self.inner.locks.lock();
        let Some(entry) = locks.get_mut(&key) else {
            metrics::counter!("loom_lock_releases_total", "outcome" => "not_locked").increment(1);
            return Err(LockError::NotLocked(key.into_string()));
        };

        if entry.lock.is_expired_at(now) {
            entry.cancel_timer();
            let expired = locks.remove(&key).map(|entry| entry.lock);
            drop(locks);
            if let Some(lock) = expired {
                self.inner.announce_expired(lock);
            }
            metrics::counter!("loom_lock_releases_total", "outcome" => "not_locked").increment(1);
            return Err(LockError::NotLocked(key.into_string()));
        }

        if !entry.lock.is_held_by(holder_id) {
            let error = LockError::HolderMismatch {
                path: key.to_string(),
                holder: entry.lock.holder_id.clone(),
                requested_by: holder_id.to_string(),
            };
            drop(locks);
            metrics::counter!("loom_lock_releases_total", "outcome" => "mismatch").increment(1);
            warn!(path = %key, requested_by = %holder_id, "Rejected release by non-holder");
            return Err(error);
        }

        entry.cancel_timer();
        let released = locks.remove(&key).map(|entry| entry.lock);
        drop(locks);

        let Some(lock) = released else {
            return Err(LockError::NotLocked(key.into_string()));
        };

        metrics::counter!("loom_lock_releases_total", "outcome" => "released").increment(1);
        info!(path = %key, holder = %holder_id, "Lock released");
        self.inner.event_bus.publish_lock_event(LockEvent::LockReleased {
            path: lock.path.clone(),
            holder_id: lock.holder_id.clone(),
            released_at: Utc::now(),
        });
        Ok(lock)
    }

    /// Current live lock on `path`, if any. Reaps it first when expired.
    pub fn inspect(&self, path: &str) -> Result<Option<FileLock>, LockError> {
        let key = LockKey::parse(path)?;
        let now = Instant::now();

        let mut locks = self.inner.locks.lock();
        let expired = match locks.get_mut(&key) {
            Some(entry) if entry.lock.is_expired_at(now) => {
                entry.cancel_timer();
                locks.remove(&key).map(|entry| entry.lock)
            }
            Some(entry) => return Ok(Some(entry.lock.clone())),
            None => return Ok(None),
        };
        drop(locks);

        if let Some(lock) = expired {
            self.inner.announce_expired(lock);
        }
        Ok(None)
    }

    /// Every live lock, ordered by path. Expired entries are reaped first.
    pub fn list_all(&self) -> Vec<FileLock> {
        self.inner.reap_expired();

        let mut live: Vec<FileLock> = self
            .inner
            .locks
            .lock()
            .values()
            .map(|entry| entry.lock.clone())
            .collect();
        live.sort_by(|a, b| a.path.cmp(&b.path));
        live
    }

    /// Remove every lock whose lease has run out and return them.
    pub fn sweep(&self) -> Vec<FileLock> {
        self.inner.reap_expired()
    }

    /// Release every lock held by `holder_id`. Returns the released paths.
    pub fn release_all(&self, holder_id: &str) -> Result<Vec<LockKey>, LockError> {
        let holder_id = validate_holder(holder_id)?;
        self.inner.reap_expired();

        let released: Vec<FileLock> = {
            let mut locks = self.inner.locks.lock();
            let keys: Vec<LockKey> = locks
                .iter()
                .filter(|(_, entry)| entry.lock.is_held_by(holder_id))
                .map(|(key, _)| key.clone())
                .collect();

            keys.iter()
                .filter_map(|key| locks.remove(key))
                .map(|mut entry| {
                    entry.cancel_timer();
                    entry.lock
                })
                .collect()
        };

        let released_at = Utc::now();
        let mut paths = Vec::with_capacity(released.len());
        for lock in released {
            metrics::counter!("loom_lock_releases_total", "outcome" => "released").increment(1);
            self.inner.event_bus.publish_lock_event(LockEvent::LockReleased {
                path: lock.path.clone(),
                holder_id: lock.holder_id,
                released_at,
            });
            paths.push(lock.path);
        }
        paths.sort();

        info!(holder = %holder_id, count = paths.len(), "Released all locks for holder");
        Ok(paths)
    }

    /// Start the periodic backstop sweep. Calling it again while a sweeper is
    /// running returns the running sweeper's token.
    pub fn start_sweeper(&self) -> CancellationToken {
        let mut slot = self.inner.sweeper.lock();
        if let Some(token) = slot.as_ref().filter(|token| !token.is_cancelled()) {
            return token.clone();
        }

        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        let period = self.inner.config.sweep_interval;
        let weak = Arc::downgrade(&self.inner);
        let shutdown = token.clone();
        tokio::spawn(async move {
            info!(interval_ms = period.as_millis() as u64, "Starting lock sweeper");
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let reaped = inner.reap_expired();
                        if !reaped.is_empty() {
                            info!(count = reaped.len(), "Lock sweep reaped expired locks");
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
            info!("Lock sweeper stopped");
        });

        token
    }

    /// Stop the sweeper, abort pending timers and drop every lock.
    pub fn shutdown(&self) {
        if let Some(token) = self.inner.sweeper.lock().take() {
            token.cancel();
        }

        let mut locks = self.inner.locks.lock();
        let count = locks.len();
        for entry in locks.values_mut() {
            entry.cancel_timer();
        }
        locks.clear();
        drop(locks);

        info!(dropped = count, "Lock manager shut down");
    }

    fn schedule_expiry(
        &self,
        key: LockKey,
        generation: u64,
        lock: &FileLock,
    ) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let deadline = lock.acquired_instant() + lock.lease();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        Some(handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire_generation(&key, generation);
            }
        }))
    }
}

impl Inner {
    fn expire_generation(&self, key: &LockKey, generation: u64) {
        let expired = {
            let mut locks = self.locks.lock();
            match locks.get(key) {
                Some(entry) if entry.generation == generation => {
                    locks.remove(key).map(|entry| entry.lock)
                }
                _ => None,
            }
        };

        if let Some(lock) = expired {
            self.announce_expired(lock);
        }
    }

    fn reap_expired(&self) -> Vec<FileLock> {
        let now = Instant::now();
        let reaped: Vec<FileLock> = {
            let mut locks = self.locks.lock();
            let keys: Vec<LockKey> = locks
                .iter()
                .filter(|(_, entry)| entry.lock.is_expired_at(now))
                .map(|(key, _)| key.clone())
                .collect();

            keys.iter()
                .filter_map(|key| locks.remove(key))
                .map(|mut entry| {
                    entry.cancel_timer();
                    entry.lock
                })
                .collect()
        };

        for lock in &reaped {
            self.announce_expired(lock.clone());
        }
        reaped
    }

    fn announce_expired(&self, lock: FileLock) {
        metrics::counter!("loom_locks_expired_total").increment(1);
        warn!(
            path = %lock.path,
            holder = %lock.holder_id,
            lease_ms = lock.lease_duration_ms,
            "Lock expired"
        );
        self.event_bus.publish_lock_event(LockEvent::LockExpired {
            path: lock.path,
            holder_id: lock.holder_id,
            acquired_at: lock.acquired_at,
            expired_at: Utc::now(),
        });
    }
}

fn validate_holder(holder_id: &str) -> Result<&str, LockError> {
    if holder_id.trim().is_empty() {
        return Err(LockError::MissingHolder);
    }
    Ok(holder_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;
    use crate::infrastructure::event_bus::{DomainEvent, EventBusError, EventReceiver};

    fn manager(lease_ms: u64) -> (LockManager, EventReceiver) {
        let bus = EventBus::new(64);
        let receiver = bus.subscribe();
        let config = LockManagerConfig {
            lease: Duration::from_millis(lease_ms),
            sweep_interval: Duration::from_millis(lease_ms * 4),
        };
        (LockManager::new(config, bus), receiver)
    }

    fn drain(receiver: &mut EventReceiver) -> Vec<&'static str> {
        let mut names = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(event) => names.push(event.name()),
                Err(EventBusError::Empty) | Err(EventBusError::Closed) => return names,
                Err(EventBusError::Lagged(_)) => continue,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_release_handoff() {
        let (locks, mut events) = manager(60_000);

        assert!(locks.acquire("src/a.ts", "agent-1").unwrap().is_granted());

        match locks.acquire("src/a.ts", "agent-2").unwrap() {
            LockAcquisition::Denied {
                current_holder,
                expires_in_ms,
                ..
            } => {
                assert_eq!(current_holder, "agent-1");
                assert_eq!(expires_in_ms, 60_000);
            }
            other => panic!("expected denial, got {:?}", other),
        }

        let err = locks.release("src/a.ts", "agent-2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mismatch);
        assert_eq!(locks.inspect("src/a.ts").unwrap().unwrap().holder_id, "agent-1");

        let released = locks.release("src/a.ts", "agent-1").unwrap();
        assert_eq!(released.holder_id, "agent-1");

        assert!(locks.acquire("src/a.ts", "agent-2").unwrap().is_granted());
        assert_eq!(
            drain(&mut events),
            vec!["lockAcquired", "lockReleased", "lockAcquired"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_paths_are_canonicalized_for_lookup() {
        let (locks, _events) = manager(60_000);
        locks.acquire("./src//a.ts", "agent-1").unwrap();

        let denied = locks.acquire("src/lib/../a.ts", "agent-2").unwrap();
        assert!(!denied.is_granted());
        assert!(locks.release("src\\a.ts", "agent-1").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_release_acquire_same_holder() {
        let (locks, _events) = manager(60_000);
        assert!(locks.acquire("a.txt", "agent-1").unwrap().is_granted());
        locks.release("a.txt", "agent-1").unwrap();
        assert!(locks.acquire("a.txt", "agent-1").unwrap().is_granted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reacquire_by_holder_renews_lease() {
        let (locks, _events) = manager(1_000);
        locks.acquire("a.txt", "agent-1").unwrap();
        tokio::time::advance(Duration::from_millis(600)).await;
        locks.acquire("a.txt", "agent-1").unwrap();
        tokio::time::advance(Duration::from_millis(600)).await;

        let lock = locks.inspect("a.txt").unwrap().unwrap();
        assert_eq!(lock.holder_id, "agent-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_at_exact_lease_is_expired() {
        let (locks, _events) = manager(100);
        locks.acquire("a.txt", "agent-1").unwrap();

        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(locks.acquire("a.txt", "agent-2").unwrap().is_granted());
        assert_eq!(locks.inspect("a.txt").unwrap().unwrap().holder_id, "agent-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_timer_reaps_and_announces_once() {
        let (locks, mut events) = manager(100);
        locks.acquire("a.txt", "agent-1").unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(locks.inspect("a.txt").unwrap().is_none());
        assert!(locks.sweep().is_empty());
        assert_eq!(drain(&mut events), vec!["lockAcquired", "lockExpired"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_cancels_expiry_timer() {
        let (locks, mut events) = manager(100);
        locks.acquire("a.txt", "agent-1").unwrap();
        locks.release("a.txt", "agent-1").unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(drain(&mut events), vec!["lockAcquired", "lockReleased"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_holder_keeps_lock_after_expiry() {
        let (locks, _events) = manager(100);
        locks.acquire("a.txt", "agent-1").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        locks.acquire("a.txt", "agent-2").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(locks.inspect("a.txt").unwrap().unwrap().holder_id, "agent-2");
    }

    #[test]
    fn test_sweep_reaps_locks_without_timers() {
        // outside a runtime no expiry timer is scheduled; only the sweep can reap
        let (locks, mut events) = manager(20);
        locks.acquire("a.txt", "agent-1").unwrap();
        locks.acquire("b.txt", "agent-1").unwrap();

        std::thread::sleep(Duration::from_millis(40));

        let reaped = locks.sweep();
        assert_eq!(reaped.len(), 2);
        assert!(locks.list_all().is_empty());
        assert_eq!(
            drain(&mut events),
            vec!["lockAcquired", "lockAcquired", "lockExpired", "lockExpired"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_cancel() {
        let (locks, _events) = manager(100);
        let token = locks.start_sweeper();
        assert!(!locks.start_sweeper().is_cancelled());

        locks.shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_all_for_holder() {
        let (locks, _events) = manager(60_000);
        locks.acquire("b.txt", "agent-1").unwrap();
        locks.acquire("a.txt", "agent-1").unwrap();
        locks.acquire("c.txt", "agent-2").unwrap();

        let released = locks.release_all("agent-1").unwrap();
        let released: Vec<&str> = released.iter().map(|key| key.as_str()).collect();
        assert_eq!(released, vec!["a.txt", "b.txt"]);

        let remaining = locks.list_all();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].holder_id, "agent-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_rejects_before_mutation() {
        let (locks, mut events) = manager(60_000);

        assert_eq!(locks.acquire("", "agent-1").unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(locks.acquire("a.txt", "  ").unwrap_err(), LockError::MissingHolder);
        assert_eq!(locks.release("a.txt", "agent-1").unwrap_err().kind(), ErrorKind::NotFound);

        assert!(locks.list_all().is_empty());
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clears_table() {
        let (locks, _events) = manager(60_000);
        locks.acquire("a.txt", "agent-1").unwrap();
        locks.shutdown();
        assert!(locks.list_all().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_event_payload() {
        let (locks, mut events) = manager(100);
        locks.acquire("src/a.ts", "agent-1").unwrap();
        let _ = events.recv().await.unwrap();

        match events.recv().await.unwrap() {
            DomainEvent::Lock(LockEvent::LockExpired { path, holder_id, .. }) => {
                assert_eq!(path.as_str(), "src/a.ts");
                assert_eq!(holder_id, "agent-1");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
