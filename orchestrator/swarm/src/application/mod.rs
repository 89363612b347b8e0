// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm application layer: the coordinator and the seams it runs units through.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Unit loading / running contracts and the `SwarmService` use cases

pub mod coordinator;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use loom_core::domain::events::SwarmEvent;
use loom_core::domain::swarm::{NodeId, SwarmExecutionId};
use loom_core::infrastructure::event_bus::EventBus;

use crate::domain::{SwarmConfig, SwarmError, SwarmExecution, SwarmExecutionResult};

pub use coordinator::SwarmCoordinator;

/// Everything the runner needs to know about a unit before running it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnitMetadata {
    pub unit_id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
}

impl UnitMetadata {
    pub fn new(unit_id: impl Into<String>) -> Self {
        let unit_id = unit_id.into();
        Self {
            name: unit_id.clone(),
            unit_id,
            labels: HashMap::new(),
        }
    }
}

/// Resolves unit ids to metadata. A failed load skips the unit.
#[async_trait]
pub trait UnitCatalog: Send + Sync {
    async fn load(&self, unit_id: &str) -> Result<UnitMetadata>;
}

/// Performs a unit's work. An `Err` (or a panic) becomes an `error` result
/// for that unit only.
#[async_trait]
pub trait UnitRunner: Send + Sync {
    async fn run(&self, unit: &UnitMetadata, context: UnitContext) -> Result<()>;
}

/// Per-unit handle passed to [`UnitRunner::run`].
#[derive(Clone)]
pub struct UnitContext {
    pub execution_id: SwarmExecutionId,
    pub node_id: NodeId,
    pub unit_id: String,
    cancellation: CancellationToken,
    event_bus: EventBus,
}

impl UnitContext {
    pub(crate) fn new(
        execution_id: SwarmExecutionId,
        node_id: NodeId,
        unit_id: String,
        cancellation: CancellationToken,
        event_bus: EventBus,
    ) -> Self {
        Self {
            execution_id,
            node_id,
            unit_id,
            cancellation,
            event_bus,
        }
    }

    /// Cancelled when the execution is cancelled. Honouring it is up to the unit.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Publish an intermediate progress marker for this unit.
    pub fn report_progress(&self, percent: u8, message: impl Into<String>) {
        self.event_bus.publish_swarm_event(SwarmEvent::NodeProgress {
            execution_id: self.execution_id,
            node_id: self.node_id,
            unit_id: self.unit_id.clone(),
            percent: percent.min(100),
            message: message.into(),
        });
    }
}

/// Swarm use cases exposed to a request layer.
#[async_trait]
pub trait SwarmService: Send + Sync {
    async fn execute(
        &self,
        unit_ids: Vec<String>,
        config: SwarmConfig,
    ) -> Result<SwarmExecutionResult, SwarmError>;

    fn status(&self, id: SwarmExecutionId) -> Result<SwarmExecution, SwarmError>;

    fn list(&self) -> Vec<SwarmExecution>;

    fn cancel(&self, id: SwarmExecutionId) -> Result<SwarmExecution, SwarmError>;
}
