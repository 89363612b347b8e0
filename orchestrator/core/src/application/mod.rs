// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod conflict_registry;
pub mod lock_manager;

pub use conflict_registry::ConflictRegistry;
pub use lock_manager::{LockManager, LockManagerConfig};
