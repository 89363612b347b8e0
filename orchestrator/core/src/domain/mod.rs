// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure domain types for workspace coordination. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`lock`] | `FileLock`, `LockAcquisition`, `LockError` |
//! | [`lock_key`] | `LockKey` |
//! | [`change`] | `ChangeEvent`, `ChangeKind` |
//! | [`conflict`] | `Conflict`, `ConflictStatus`, `append_merge` |
//! | [`swarm`] | `SwarmExecutionId`, `NodeResult`, `SwarmStatus` |
//! | [`events`] | `LockEvent`, `ConflictEvent`, `SwarmEvent` |
//! | [`storage`] | `WorkspaceFiles` |
//! | [`config`] | `LoomConfig` |
//! | [`error`] | `ErrorKind` |

pub mod change;
pub mod config;
pub mod conflict;
pub mod error;
pub mod events;
pub mod lock;
pub mod lock_key;
pub mod storage;
pub mod swarm;
