// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Loom CLI

pub mod config;
pub mod watch;

pub use self::config::ConfigCommand;
pub use self::watch::WatchArgs;
