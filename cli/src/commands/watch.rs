// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `loom watch` - host a workspace until interrupted
//!
//! Starts the filesystem watcher, the change fan-out bus and the lock
//! sweeper, then streams every push-channel event to stdout.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

use loom_core::application::{LockManager, LockManagerConfig};
use loom_core::domain::config::LoomConfig;
use loom_core::infrastructure::{
    ChangeBus, DomainEvent, EventBus, EventBusError, EventBusForwarder, WorkspaceWatcher,
};

#[derive(Args)]
pub struct WatchArgs {
    /// Workspace root (overrides spec.workspace.root)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Serve Prometheus metrics on this port (overrides spec.observability.metrics_port)
    #[arg(long, env = "LOOM_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Event output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// One line of the event stream in `--format json`.
#[derive(Serialize)]
struct EventLine<'a> {
    event: &'static str,
    payload: &'a DomainEvent,
}

pub fn render_event(event: &DomainEvent, format: OutputFormat) -> Result<String> {
    let payload = serde_json::to_string(event).context("Failed to serialize event")?;
    Ok(match format {
        OutputFormat::Json => serde_json::to_string(&EventLine {
            event: event.name(),
            payload: event,
        })
        .context("Failed to serialize event")?,
        OutputFormat::Text => format!("{} {}", event.name().cyan().bold(), payload.dimmed()),
    })
}

pub async fn run(args: WatchArgs, config_override: Option<PathBuf>) -> Result<()> {
    let mut config = LoomConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    if let Some(root) = args.root {
        config.spec.workspace.root = root;
    }
    if let Some(port) = args.metrics_port {
        config.spec.observability.metrics_port = Some(port);
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    if let Some(port) = config.spec.observability.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus metrics exporter listening");
    }

    let event_bus = EventBus::new(config.spec.event_bus.capacity);
    let mut receiver = event_bus.subscribe();

    let locks = LockManager::new(
        LockManagerConfig::from(&config.spec.locks),
        event_bus.clone(),
    );
    locks.start_sweeper();

    let changes = ChangeBus::new();
    let forwarder = changes.subscribe(EventBusForwarder::new(event_bus.clone()));
    let watcher = WorkspaceWatcher::start(
        &config.spec.workspace.root,
        config.spec.workspace.excluded_dirs.clone(),
        changes,
    )
    .context("Failed to start workspace watcher")?;

    info!(
        workspace = %config.metadata.name,
        root = %watcher.root().display(),
        "Loom host running; press Ctrl+C to stop"
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for shutdown signal")?;
                break;
            }
            received = receiver.recv() => match received {
                Ok(event) => println!("{}", render_event(&event, args.format)?),
                Err(EventBusError::Lagged(missed)) => {
                    warn!(missed, "Event stream fell behind; events were dropped");
                }
                Err(_) => break,
            },
        }
    }

    info!("Shutting down");
    forwarder.unsubscribe();
    watcher.stop();
    locks.shutdown();

    Ok(())
}
