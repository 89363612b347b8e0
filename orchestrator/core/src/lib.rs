// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Loom Core
//!
//! Coordination primitives for many agents editing one shared workspace:
//! advisory path locks, a synchronous change fan-out fed by a filesystem
//! watcher, conflict detection with an append-only merge, and the push
//! channel that carries every lifecycle event to observers.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model and services shared by the swarm coordinator and the `loom` binary

pub mod application;
pub mod domain;
pub mod infrastructure;
