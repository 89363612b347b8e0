// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure domain types for batch execution. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`swarm`] | `SwarmExecution`, `SwarmConfig`, `SwarmExecutionResult`, `SwarmError` |

pub mod swarm;

pub use swarm::*;
