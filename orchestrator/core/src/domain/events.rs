// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::change::ChangeEvent;
use crate::domain::conflict::Conflict;
use crate::domain::lock::FileLock;
use crate::domain::lock_key::LockKey;
use crate::domain::swarm::{NodeId, NodeResult, SwarmExecutionId, SwarmProgress, SwarmStatus};

/// Lock lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LockEvent {
    LockAcquired {
        lock: FileLock,
    },
    LockReleased {
        path: LockKey,
        holder_id: String,
        released_at: DateTime<Utc>,
    },
    LockExpired {
        path: LockKey,
        holder_id: String,
        acquired_at: DateTime<Utc>,
        expired_at: DateTime<Utc>,
    },
}

impl LockEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LockEvent::LockAcquired { .. } => "lockAcquired",
            LockEvent::LockReleased { .. } => "lockReleased",
            LockEvent::LockExpired { .. } => "lockExpired",
        }
    }
}

/// Conflict lifecycle events. Each carries a snapshot of the conflict at the
/// moment the event was raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConflictEvent {
    ConflictDetected {
        conflict: Conflict,
    },
    ConflictResolved {
        conflict: Conflict,
    },
    ManualResolutionRequired {
        conflict: Conflict,
        artifact_path: String,
    },
}

impl ConflictEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConflictEvent::ConflictDetected { .. } => "conflict:detected",
            ConflictEvent::ConflictResolved { .. } => "conflict:resolved",
            ConflictEvent::ManualResolutionRequired { .. } => "conflict:manual-required",
        }
    }

    pub fn conflict(&self) -> &Conflict {
        match self {
            ConflictEvent::ConflictDetected { conflict }
            | ConflictEvent::ConflictResolved { conflict }
            | ConflictEvent::ManualResolutionRequired { conflict, .. } => conflict,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SwarmEvent {
    SwarmStarted {
        execution_id: SwarmExecutionId,
        unit_ids: Vec<String>,
        total: usize,
        started_at: DateTime<Utc>,
    },
    NodeStarted {
        execution_id: SwarmExecutionId,
        node_id: NodeId,
        unit_id: String,
        started_at: DateTime<Utc>,
    },
    NodeProgress {
        execution_id: SwarmExecutionId,
        node_id: NodeId,
        unit_id: String,
        percent: u8,
        message: String,
    },
    NodeCompleted {
        execution_id: SwarmExecutionId,
        result: NodeResult,
    },
    SwarmProgress {
        execution_id: SwarmExecutionId,
        progress: SwarmProgress,
    },
    SwarmCompleted {
        execution_id: SwarmExecutionId,
        status: SwarmStatus,
        success_count: usize,
        failure_count: usize,
        total_duration_ms: u64,
        parallelism_verified: bool,
        completed_at: DateTime<Utc>,
    },
    SwarmCancelled {
        execution_id: SwarmExecutionId,
        cancelled_at: DateTime<Utc>,
    },
}

impl SwarmEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SwarmEvent::SwarmStarted { .. } => "swarm:started",
            SwarmEvent::NodeStarted { .. } => "swarm:node-started",
            SwarmEvent::NodeProgress { .. } => "swarm:node-progress",
            SwarmEvent::NodeCompleted { .. } => "swarm:node-completed",
            SwarmEvent::SwarmProgress { .. } => "swarm:progress",
            SwarmEvent::SwarmCompleted { .. } => "swarm:completed",
            SwarmEvent::SwarmCancelled { .. } => "swarm:cancelled",
        }
    }

    pub fn execution_id(&self) -> SwarmExecutionId {
        match self {
            SwarmEvent::SwarmStarted { execution_id, .. }
            | SwarmEvent::NodeStarted { execution_id, .. }
            | SwarmEvent::NodeProgress { execution_id, .. }
            | SwarmEvent::NodeCompleted { execution_id, .. }
            | SwarmEvent::SwarmProgress { execution_id, .. }
            | SwarmEvent::SwarmCompleted { execution_id, .. }
            | SwarmEvent::SwarmCancelled { execution_id, .. } => *execution_id,
        }
    }
}

/// Workspace file events forwarded to the push channel for observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkspaceEvent {
    FileChanged(ChangeEvent),
}

impl WorkspaceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkspaceEvent::FileChanged(_) => "file:changed",
        }
    }
}
