// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod change_bus;
pub mod event_bus;
pub mod fs_watcher;
pub mod local_files;

pub use change_bus::{ChangeBus, ChangeSubscriber, EventBusForwarder, Subscription};
pub use event_bus::{DomainEvent, EventBus, EventBusError, EventReceiver};
pub use fs_watcher::{WatcherError, WorkspaceWatcher};
pub use local_files::LocalWorkspaceFiles;
