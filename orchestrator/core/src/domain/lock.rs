// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # File Lock Value Objects
//!
//! Advisory, lease-bounded locks on workspace paths.
//!
//! - [`FileLock`]: a held lock and its lease.
//! - [`LockAcquisition`]: outcome of an acquire attempt (granted or denied).
//! - [`LockError`]: why a lock operation was rejected.
//!
//! A lock is logically expired once its age reaches the lease, whether or not
//! it has been reaped from the lock table yet. Expiry is measured on the tokio
//! monotonic clock so that lease arithmetic is immune to wall-clock jumps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::domain::error::ErrorKind;
use crate::domain::lock_key::{LockKey, LockKeyError};

/// Advisory lock held on one canonical workspace path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLock {
    /// Canonical lock key.
    pub path: LockKey,
    /// Agent holding the lock.
    pub holder_id: String,
    /// Wall-clock acquisition time (for display only).
    pub acquired_at: DateTime<Utc>,
    /// Lease length in milliseconds.
    pub lease_duration_ms: u64,
    /// Wall-clock time at which the lease runs out.
    pub expires_at: DateTime<Utc>,
    #[serde(skip, default = "Instant::now")]
    acquired_instant: Instant,
}

impl FileLock {
    pub fn new(path: LockKey, holder_id: impl Into<String>, lease: Duration) -> Self {
        let acquired_at = Utc::now();
        let expires_at = chrono::Duration::from_std(lease)
            .ok()
            .and_then(|lease| acquired_at.checked_add_signed(lease))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            path,
            holder_id: holder_id.into(),
            acquired_at,
            lease_duration_ms: lease.as_millis().min(u64::MAX as u128) as u64,
            expires_at,
            acquired_instant: Instant::now(),
        }
    }

    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    /// Monotonic instant at which the lock was granted.
    pub fn acquired_instant(&self) -> Instant {
        self.acquired_instant
    }

    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.acquired_instant)
    }

    /// A lock whose age equals its lease is already expired.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.age_at(now) >= self.lease()
    }

    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.lease().saturating_sub(self.age_at(now))
    }

    pub fn is_held_by(&self, holder_id: &str) -> bool {
        self.holder_id == holder_id
    }
}

/// Result of an acquire attempt. Denial is an ordinary outcome, not an error:
/// there is no queue, so the caller decides whether and when to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LockAcquisition {
    Granted {
        lock: FileLock,
    },
    Denied {
        reason: String,
        current_holder: String,
        expires_in_ms: u64,
    },
}

impl LockAcquisition {
    pub fn is_granted(&self) -> bool {
        matches!(self, LockAcquisition::Granted { .. })
    }

    pub fn lock(&self) -> Option<&FileLock> {
        match self {
            LockAcquisition::Granted { lock } => Some(lock),
            LockAcquisition::Denied { .. } => None,
        }
    }
}

/// Errors returned by lock operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("Invalid lock path: {0}")]
    InvalidPath(#[from] LockKeyError),

    #[error("Holder id must not be empty")]
    MissingHolder,

    #[error("No lock held on {0}")]
    NotLocked(String),

    #[error("Lock on {path} is held by {holder}, not {requested_by}")]
    HolderMismatch {
        path: String,
        holder: String,
        requested_by: String,
    },
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LockError::InvalidPath(_) | LockError::MissingHolder => ErrorKind::Validation,
            LockError::NotLocked(_) => ErrorKind::NotFound,
            LockError::HolderMismatch { .. } => ErrorKind::Mismatch,
        }
    }
}
