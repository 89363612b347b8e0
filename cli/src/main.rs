// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Loom Workspace Host CLI
//!
//! The `loom` binary hosts a shared workspace for a group of editing agents.
//!
//! ## Commands
//!
//! - `loom watch` - Watch the workspace, run the lock sweeper and stream
//!   push-channel events to stdout until interrupted
//! - `loom config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use loom_orchestrator::commands::{self, ConfigCommand, WatchArgs};

/// Loom - shared workspace coordination for editing agents
#[derive(Parser)]
#[command(name = "loom")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "LOOM_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the
    /// configured observability.log_level
    #[arg(long, global = true, env = "LOOM_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the workspace and stream events
    #[command(name = "watch")]
    Watch(WatchArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = commands::config::resolve_log_level(cli.log_level, cli.config.clone());
    init_logging(&log_level)?;

    match cli.command {
        Commands::Watch(args) => commands::watch::run(args, cli.config).await,
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    // stdout carries the event stream; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
