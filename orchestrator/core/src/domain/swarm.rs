// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm value types shared between the swarm coordinator and the event bus.
//!
//! The execution aggregate itself lives in the `loom-orchestrator-swarm`
//! crate; the identifiers and per-unit results live here so that domain events
//! can carry them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a swarm execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmExecutionId(pub Uuid);

impl SwarmExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SwarmExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SwarmExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one dispatched unit within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmStatus {
    Running,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl SwarmStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SwarmStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwarmStatus::Running => "running",
            SwarmStatus::Completed => "completed",
            SwarmStatus::Partial => "partial",
            SwarmStatus::Failed => "failed",
            SwarmStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SwarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmProgress {
    pub completed: usize,
    pub total: usize,
}

impl SwarmProgress {
    pub fn new(total: usize) -> Self {
        Self { completed: 0, total }
    }

    /// Count one more settled unit. Never exceeds `total`.
    pub fn advance(&mut self) {
        self.completed = (self.completed + 1).min(self.total);
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Error,
}

/// Outcome of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResult {
    pub node_id: NodeId,
    pub unit_id: String,
    pub status: NodeStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeResult {
    pub fn is_success(&self) -> bool {
        self.status == NodeStatus::Success
    }
}
