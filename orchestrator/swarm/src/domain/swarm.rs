// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Execution Aggregate
//!
//! - [`SwarmExecution`]: aggregate root for one batch of concurrently
//!   dispatched units.
//! - [`SwarmConfig`]: per-batch dispatch settings.
//! - [`SwarmExecutionResult`]: the settled outcome handed back to callers.
//!
//! # Invariants
//!
//! - `progress.completed` never decreases and never exceeds `progress.total`.
//! - Once every unit has settled, `success_count + failure_count` equals the
//!   number of units that were dispatched.
//! - A cancelled execution stays cancelled; late results still accrue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use loom_core::domain::config::SwarmDispatchConfig;
use loom_core::domain::error::ErrorKind;
use loom_core::domain::swarm::{NodeResult, SwarmExecutionId, SwarmProgress, SwarmStatus};

/// Dispatch settings for one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmConfig {
    /// Delay between consecutive unit starts. Unit `i` waits `i * stagger_delay`.
    pub stagger_delay: Duration,
    /// Free-form label carried on the execution record.
    pub label: Option<String>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            stagger_delay: Duration::from_millis(10),
            label: None,
        }
    }
}

impl From<&SwarmDispatchConfig> for SwarmConfig {
    fn from(config: &SwarmDispatchConfig) -> Self {
        Self {
            stagger_delay: config.stagger_delay,
            label: None,
        }
    }
}

/// Errors raised by the swarm coordinator.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Swarm execution requires at least one unit")]
    EmptyBatch,

    #[error("None of the {requested} requested units could be loaded")]
    NoUnitsLoaded { requested: usize },

    #[error("Swarm execution {0} not found")]
    NotFound(SwarmExecutionId),

    #[error("Swarm execution {id} is {status}; only running executions can be cancelled")]
    InvalidState {
        id: SwarmExecutionId,
        status: SwarmStatus,
    },
}

impl SwarmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SwarmError::EmptyBatch | SwarmError::NoUnitsLoaded { .. } => ErrorKind::Validation,
            SwarmError::NotFound(_) => ErrorKind::NotFound,
            SwarmError::InvalidState { .. } => ErrorKind::ConflictState,
        }
    }
}

/// Aggregate root for one swarm run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmExecution {
    pub id: SwarmExecutionId,
    /// Units that were loaded and dispatched, in input order.
    pub unit_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub start_time: DateTime<Utc>,
    status: SwarmStatus,
    end_time: Option<DateTime<Utc>>,
    progress: SwarmProgress,
    results: Vec<NodeResult>,
}

impl SwarmExecution {
    pub fn start(unit_ids: Vec<String>, label: Option<String>) -> Self {
        let progress = SwarmProgress::new(unit_ids.len());
        Self {
            id: SwarmExecutionId::new(),
            unit_ids,
            label,
            start_time: Utc::now(),
            status: SwarmStatus::Running,
            end_time: None,
            progress,
            results: Vec::new(),
        }
    }

    pub fn status(&self) -> SwarmStatus {
        self.status
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn progress(&self) -> SwarmProgress {
        self.progress
    }

    pub fn results(&self) -> &[NodeResult] {
        &self.results
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    /// Record one settled unit and return the updated progress.
    pub fn record_result(&mut self, result: NodeResult) -> SwarmProgress {
        self.results.push(result);
        self.progress.advance();
        self.progress
    }

    pub fn cancel(&mut self) -> Result<(), SwarmError> {
        if self.status != SwarmStatus::Running {
            return Err(SwarmError::InvalidState {
                id: self.id,
                status: self.status,
            });
        }
        self.status = SwarmStatus::Cancelled;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    /// Close the record once every unit has settled.
    pub fn finalize(&mut self, total_duration: Duration) -> SwarmExecutionResult {
        if self.status == SwarmStatus::Running {
            self.status = classify(self.success_count(), self.failure_count());
        }
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }

        let total_duration_ms = duration_ms(total_duration);
        SwarmExecutionResult {
            execution_id: self.id,
            status: self.status,
            success_count: self.success_count(),
            failure_count: self.failure_count(),
            total_duration_ms,
            average_duration_ms: average_success_duration_ms(&self.results),
            parallelism_verified: verify_parallelism(&self.results, total_duration_ms),
            results: self.results.clone(),
        }
    }
}

/// Settled outcome of an `execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmExecutionResult {
    pub execution_id: SwarmExecutionId,
    pub status: SwarmStatus,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
    pub parallelism_verified: bool,
    pub results: Vec<NodeResult>,
}

/// `completed` with no failures, `failed` with no successes, else `partial`.
pub fn classify(success_count: usize, failure_count: usize) -> SwarmStatus {
    if failure_count == 0 {
        SwarmStatus::Completed
    } else if success_count == 0 {
        SwarmStatus::Failed
    } else {
        SwarmStatus::Partial
    }
}

/// Mean duration of the successful units, 0 when none succeeded.
pub fn average_success_duration_ms(results: &[NodeResult]) -> u64 {
    let durations: Vec<u64> = results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.duration_ms)
        .collect();
    if durations.is_empty() {
        return 0;
    }
    durations.iter().sum::<u64>() / durations.len() as u64
}

/// Heuristic check that units overlapped rather than ran back to back:
/// the batch took less than twice the average successful unit.
pub fn verify_parallelism(results: &[NodeResult], total_duration_ms: u64) -> bool {
    let successes: Vec<u64> = results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.duration_ms)
        .collect();
    if successes.is_empty() {
        return false;
    }
    let average = successes.iter().sum::<u64>() as f64 / successes.len() as f64;
    (total_duration_ms as f64) < 2.0 * average
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
