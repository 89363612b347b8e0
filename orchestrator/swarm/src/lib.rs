// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `loom-swarm`: Concurrent Batch Execution
//!
//! Dispatches a batch of independent work units at once, waits for every one
//! to settle, and reports an aggregate outcome together with a heuristic
//! check that the units really overlapped.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `SwarmExecution` aggregate, `SwarmConfig`, `SwarmExecutionResult` |
//! | [`application`] | Application | `SwarmCoordinator`, `UnitCatalog` / `UnitRunner` seams |
//!
//! ## Key Concepts
//!
//! - **Unit**: one independent item of work, identified by a string id and
//!   resolved to [`application::UnitMetadata`] through a [`application::UnitCatalog`].
//! - **Partial failure**: a failing unit never cancels its siblings. It shows
//!   up as an `error` result and in the aggregate `partial` / `failed` status.
//! - **Cancellation** is cooperative. Units see it through
//!   [`application::UnitContext::cancellation`]; nothing is aborted.
//!
//! Executions are tracked in memory only and are lost on restart.

pub mod application;
pub mod domain;

pub use domain::*;
