// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use loom_core::domain::config::LoomConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./loom-config.yaml)
        #[arg(short, long, default_value = "./loom-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = LoomConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. LOOM_CONFIG_PATH: {}",
            std::env::var("LOOM_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./loom-config.yaml");
        println!("  4. ~/.loom/config.yaml");
        println!("  5. /etc/loom/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let spec = &config.spec;
    println!("{}", "Workspace:".bold());
    println!("  Root: {}", spec.workspace.root.display());
    println!("  Excluded: {}", spec.workspace.excluded_dirs.join(", "));
    println!();

    println!("{}", "Locks:".bold());
    println!("  Lease: {:?}", spec.locks.lease);
    println!("  Sweep interval: {:?}", spec.locks.sweep_interval);
    println!();

    println!("{}", "Swarm:".bold());
    println!("  Stagger delay: {:?}", spec.swarm.stagger_delay);
    println!();

    println!("{}", "Observability:".bold());
    println!("  Event bus capacity: {}", spec.event_bus.capacity);
    println!("  Log level: {}", spec.observability.log_level);
    match spec.observability.metrics_port {
        Some(port) => println!("  Metrics port: {}", port),
        None => println!("  Metrics port: {}", "(disabled)".dimmed()),
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = LoomConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

/// Log level for the subscriber when `RUST_LOG` is unset: the `--log-level`
/// flag, else the configured `observability.log_level`. A configuration that
/// fails to load falls back to the default level here; the command itself
/// reports the load error.
pub fn resolve_log_level(flag: Option<String>, config_path: Option<PathBuf>) -> String {
    flag.unwrap_or_else(|| match LoomConfig::load_or_default(config_path) {
        Ok(config) => config.spec.observability.log_level,
        Err(_) => LoomConfig::default().spec.observability.log_level,
    })
}

/// Sample manifest written by `loom config generate`.
pub fn sample_config(with_examples: bool) -> &'static str {
    if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    }
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    tokio::fs::write(output, sample_config(with_examples))
        .await
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
