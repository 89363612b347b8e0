// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm Execution Coordinator
//!
//! `execute` loads every unit, dispatches the loaded ones as independent
//! tokio tasks and waits for all of them to settle. Per unit:
//!
//! 1. `swarm:node-started` is published by the dispatcher, in input order.
//! 2. The task waits `index * stagger_delay`, publishes a 50% progress marker,
//!    then runs the unit through the [`UnitRunner`].
//! 3. `swarm:node-completed` carries the unit's [`NodeResult`]; progress is
//!    advanced on the execution record and `swarm:progress` published.
//!
//! One unit's failure or panic never touches the others. Cancellation marks
//! the record and trips the units' cancellation tokens; running units are
//! left to finish.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use loom_core::domain::events::SwarmEvent;
use loom_core::domain::swarm::{NodeId, NodeResult, NodeStatus, SwarmExecutionId};
use loom_core::infrastructure::event_bus::EventBus;

use crate::application::{SwarmService, UnitCatalog, UnitContext, UnitMetadata, UnitRunner};
use crate::domain::swarm::duration_ms;
use crate::domain::{SwarmConfig, SwarmError, SwarmExecution, SwarmExecutionResult};

#[derive(Default)]
struct ExecutionTable {
    by_id: HashMap<SwarmExecutionId, SwarmExecution>,
    order: Vec<SwarmExecutionId>,
    tokens: HashMap<SwarmExecutionId, CancellationToken>,
}

pub struct SwarmCoordinator {
    catalog: Arc<dyn UnitCatalog>,
    runner: Arc<dyn UnitRunner>,
    event_bus: EventBus,
    executions: Arc<Mutex<ExecutionTable>>,
}

impl SwarmCoordinator {
    pub fn new(
        catalog: Arc<dyn UnitCatalog>,
        runner: Arc<dyn UnitRunner>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            catalog,
            runner,
            event_bus,
            executions: Arc::new(Mutex::new(ExecutionTable::default())),
        }
    }

    async fn load_units(&self, unit_ids: &[String]) -> Vec<UnitMetadata> {
        let loads = unit_ids.iter().map(|unit_id| async move {
            match self.catalog.load(unit_id).await {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!(unit_id = %unit_id, error = %e, "Skipping unit: metadata failed to load");
                    None
                }
            }
        });
        join_all(loads).await.into_iter().flatten().collect()
    }

    fn dispatch(
        &self,
        execution_id: SwarmExecutionId,
        index: usize,
        unit: UnitMetadata,
        config: &SwarmConfig,
        token: &CancellationToken,
    ) -> tokio::task::JoinHandle<NodeResult> {
        let node_id = NodeId::new();
        self.event_bus.publish_swarm_event(SwarmEvent::NodeStarted {
            execution_id,
            node_id,
            unit_id: unit.unit_id.clone(),
            started_at: Utc::now(),
        });

        let stagger = config.stagger_delay.saturating_mul(index as u32);
        let context = UnitContext::new(
            execution_id,
            node_id,
            unit.unit_id.clone(),
            token.child_token(),
            self.event_bus.clone(),
        );
        let runner = Arc::clone(&self.runner);
        let event_bus = self.event_bus.clone();
        let executions = Arc::clone(&self.executions);

        tokio::spawn(async move {
            if !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
            context.report_progress(50, "running");

            let start_time = Utc::now();
            let started = Instant::now();
            let outcome = AssertUnwindSafe(runner.run(&unit, context))
                .catch_unwind()
                .await;
            let elapsed = started.elapsed();

            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(panic) => Some(format!("unit panicked: {}", panic_message(panic.as_ref()))),
            };
            let result = NodeResult {
                node_id,
                unit_id: unit.unit_id.clone(),
                status: if error.is_none() {
                    NodeStatus::Success
                } else {
                    NodeStatus::Error
                },
                start_time,
                end_time: Utc::now(),
                duration_ms: duration_ms(elapsed),
                error,
            };

            metrics::histogram!("loom_swarm_unit_duration_ms").record(result.duration_ms as f64);
            match &result.error {
                None => debug!(
                    execution_id = %execution_id,
                    unit_id = %result.unit_id,
                    duration_ms = result.duration_ms,
                    "Unit succeeded"
                ),
                Some(e) => warn!(
                    execution_id = %execution_id,
                    unit_id = %result.unit_id,
                    error = %e,
                    "Unit failed"
                ),
            }

            event_bus.publish_swarm_event(SwarmEvent::NodeCompleted {
                execution_id,
                result: result.clone(),
            });

            let progress = executions
                .lock()
                .by_id
                .get_mut(&execution_id)
                .map(|execution| execution.record_result(result.clone()));
            if let Some(progress) = progress {
                event_bus.publish_swarm_event(SwarmEvent::SwarmProgress {
                    execution_id,
                    progress,
                });
            }

            result
        })
    }
}

#[async_trait]
impl SwarmService for SwarmCoordinator {
    async fn execute(
        &self,
        unit_ids: Vec<String>,
        config: SwarmConfig,
    ) -> Result<SwarmExecutionResult, SwarmError> {
        if unit_ids.is_empty() {
            return Err(SwarmError::EmptyBatch);
        }

        let units = self.load_units(&unit_ids).await;
        if units.is_empty() {
            error!(requested = unit_ids.len(), "No swarm units could be loaded");
            return Err(SwarmError::NoUnitsLoaded {
                requested: unit_ids.len(),
            });
        }

        let execution = SwarmExecution::start(
            units.iter().map(|unit| unit.unit_id.clone()).collect(),
            config.label.clone(),
        );
        let execution_id = execution.id;
        let token = CancellationToken::new();
        {
            let mut table = self.executions.lock();
            table.order.push(execution_id);
            table.tokens.insert(execution_id, token.clone());
            table.by_id.insert(execution_id, execution.clone());
        }

        info!(
            execution_id = %execution_id,
            units = units.len(),
            skipped = unit_ids.len() - units.len(),
            "Swarm execution started"
        );
        self.event_bus.publish_swarm_event(SwarmEvent::SwarmStarted {
            execution_id,
            unit_ids: execution.unit_ids.clone(),
            total: units.len(),
            started_at: execution.start_time,
        });

        let started = Instant::now();
        let handles: Vec<_> = units
            .into_iter()
            .enumerate()
            .map(|(index, unit)| self.dispatch(execution_id, index, unit, &config, &token))
            .collect();

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                // the unit future itself is panic-safe; this is a runtime abort
                error!(
                    execution_id = %execution_id,
                    error = %e,
                    "Swarm unit task did not complete"
                );
            }
        }
        let total = started.elapsed();

        let summary = {
            let mut table = self.executions.lock();
            table.tokens.remove(&execution_id);
            let execution = table
                .by_id
                .get_mut(&execution_id)
                .ok_or(SwarmError::NotFound(execution_id))?;
            execution.finalize(total)
        };

        metrics::counter!("loom_swarm_executions_total", "status" => summary.status.as_str())
            .increment(1);
        info!(
            execution_id = %execution_id,
            status = %summary.status,
            success_count = summary.success_count,
            failure_count = summary.failure_count,
            total_duration_ms = summary.total_duration_ms,
            parallelism_verified = summary.parallelism_verified,
            "Swarm execution settled"
        );
        self.event_bus.publish_swarm_event(SwarmEvent::SwarmCompleted {
            execution_id,
            status: summary.status,
            success_count: summary.success_count,
            failure_count: summary.failure_count,
            total_duration_ms: summary.total_duration_ms,
            parallelism_verified: summary.parallelism_verified,
            completed_at: Utc::now(),
        });

        Ok(summary)
    }

    fn status(&self, id: SwarmExecutionId) -> Result<SwarmExecution, SwarmError> {
        self.executions
            .lock()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(SwarmError::NotFound(id))
    }

    fn list(&self) -> Vec<SwarmExecution> {
        let table = self.executions.lock();
        table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id))
            .cloned()
            .collect()
    }

    fn cancel(&self, id: SwarmExecutionId) -> Result<SwarmExecution, SwarmError> {
        let cancelled = {
            let mut table = self.executions.lock();
            let execution = table.by_id.get_mut(&id).ok_or(SwarmError::NotFound(id))?;
            execution.cancel()?;
            let snapshot = execution.clone();
            if let Some(token) = table.tokens.get(&id) {
                token.cancel();
            }
            snapshot
        };

        info!(execution_id = %id, "Swarm execution cancelled");
        self.event_bus.publish_swarm_event(SwarmEvent::SwarmCancelled {
            execution_id: id,
            cancelled_at: cancelled.end_time().unwrap_or_else(Utc::now),
        });
        Ok(cancelled)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use loom_core::domain::error::ErrorKind;
    use loom_core::domain::swarm::SwarmStatus;
    use std::time::Duration;

    struct StaticCatalog;

    #[async_trait]
    impl UnitCatalog for StaticCatalog {
        async fn load(&self, unit_id: &str) -> anyhow::Result<UnitMetadata> {
            if unit_id.starts_with("missing") {
                return Err(anyhow!("no manifest for {}", unit_id));
            }
            Ok(UnitMetadata::new(unit_id))
        }
    }

    /// Sleeps 100ms; units named `fail*` error, `panic*` panic.
    struct SleepRunner;

    #[async_trait]
    impl UnitRunner for SleepRunner {
        async fn run(&self, unit: &UnitMetadata, _context: UnitContext) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if unit.unit_id.starts_with("fail") {
                return Err(anyhow!("{} exploded", unit.unit_id));
            }
            if unit.unit_id.starts_with("panic") {
                panic!("unit {} panicked", unit.unit_id);
            }
            Ok(())
        }
    }

    fn coordinator() -> SwarmCoordinator {
        SwarmCoordinator::new(Arc::new(StaticCatalog), Arc::new(SleepRunner), EventBus::new(256))
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_rejected_before_record() {
        let swarm = coordinator();
        let err = swarm.execute(vec![], SwarmConfig::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(swarm.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_units_failing_to_load_is_an_error() {
        let swarm = coordinator();
        let err = swarm
            .execute(ids(&["missing-1", "missing-2"]), SwarmConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::NoUnitsLoaded { requested: 2 }));
        assert!(swarm.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_units_run_concurrently() {
        let swarm = coordinator();
        let summary = swarm
            .execute(ids(&["u1", "u2", "u3"]), SwarmConfig::default())
            .await
            .unwrap();

        assert_eq!(summary.status, SwarmStatus::Completed);
        assert_eq!(summary.success_count, 3);
        assert!(summary.total_duration_ms >= 100 && summary.total_duration_ms < 300);
        assert!(summary.parallelism_verified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_and_failed_outcomes() {
        let swarm = coordinator();

        let partial = swarm
            .execute(ids(&["u1", "fail-2", "panic-3"]), SwarmConfig::default())
            .await
            .unwrap();
        assert_eq!(partial.status, SwarmStatus::Partial);
        assert_eq!(partial.success_count, 1);
        assert_eq!(partial.failure_count, 2);
        let panicked = partial
            .results
            .iter()
            .find(|r| r.unit_id == "panic-3")
            .unwrap();
        assert!(panicked.error.as_deref().unwrap().contains("panicked"));

        let failed = swarm
            .execute(ids(&["fail-1"]), SwarmConfig::default())
            .await
            .unwrap();
        assert_eq!(failed.status, SwarmStatus::Failed);
        assert!(!failed.parallelism_verified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_and_list() {
        let swarm = coordinator();
        let first = swarm.execute(ids(&["u1"]), SwarmConfig::default()).await.unwrap();
        let second = swarm.execute(ids(&["u2"]), SwarmConfig::default()).await.unwrap();

        let listed: Vec<SwarmExecutionId> = swarm.list().iter().map(|e| e.id).collect();
        assert_eq!(listed, vec![first.execution_id, second.execution_id]);

        let record = swarm.status(first.execution_id).unwrap();
        assert_eq!(record.status(), SwarmStatus::Completed);
        assert!(record.end_time().is_some());
        assert_eq!(
            swarm.status(SwarmExecutionId::new()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_requires_running() {
        let swarm = coordinator();
        let done = swarm.execute(ids(&["u1"]), SwarmConfig::default()).await.unwrap();

        let err = swarm.cancel(done.execution_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictState);
        assert_eq!(
            swarm.cancel(SwarmExecutionId::new()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
