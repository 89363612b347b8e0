// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Workspace Configuration Types
//
// Defines the configuration manifest for a Loom host:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Workspace root and excluded directories for the watcher
// - Lock lease and sweep interval
// - Swarm dispatch stagger
// - Event bus capacity and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "loom/v1";
pub const KIND: &str = "WorkspaceConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoomConfig {
    /// API version (must be "loom/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "WorkspaceConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: LoomConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoomConfigSpec {
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub locks: LockConfig,

    #[serde(default)]
    pub swarm: SwarmDispatchConfig,

    #[serde(default)]
    pub event_bus: EventBusConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root of the shared file tree
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Directory names ignored by the watcher, at any depth
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long a lock is held before it expires on its own
    #[serde(default = "default_lease", with = "humantime_serde")]
    pub lease: Duration,

    /// How often the backstop sweep reaps expired locks
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmDispatchConfig {
    /// Delay inserted between consecutive unit starts
    #[serde(default = "default_stagger_delay", with = "humantime_serde")]
    pub stagger_delay: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Events buffered per receiver before slow receivers start lagging
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus exporter port; exporter disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_excluded_dirs() -> Vec<String> {
    vec![".git".to_string(), "node_modules".to_string(), "target".to_string()]
}

fn default_lease() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_stagger_delay() -> Duration {
    Duration::from_millis(10)
}

fn default_bus_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            excluded_dirs: default_excluded_dirs(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease: default_lease(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Default for SwarmDispatchConfig {
    fn default() -> Self {
        Self {
            stagger_delay: default_stagger_delay(),
        }
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_port: None,
        }
    }
}

impl Default for LoomConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "local-workspace".to_string(),
                labels: None,
            },
            spec: LoomConfigSpec::default(),
        }
    }
}

impl LoomConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. LOOM_CONFIG_PATH environment variable
    /// 2. ./loom-config.yaml (working directory)
    /// 3. ~/.loom/config.yaml (user home)
    /// 4. /etc/loom/config.yaml (Unix only)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("LOOM_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./loom-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".loom").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/loom/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must load
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::debug!(
                    "No configuration file found in standard locations, using defaults"
                );
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup("LOOM_WORKSPACE_ROOT") {
            tracing::info!("Environment override: LOOM_WORKSPACE_ROOT={}", root);
            self.spec.workspace.root = PathBuf::from(root);
        }

        if let Some(val) = lookup("LOOM_LOCK_LEASE_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => {
                    tracing::info!("Environment override: LOOM_LOCK_LEASE_SECS={}", secs);
                    self.spec.locks.lease = Duration::from_secs(secs);
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for LOOM_LOCK_LEASE_SECS: '{}'. Expected seconds. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Some(level) = lookup("LOOM_LOG_LEVEL") {
            self.spec.observability.log_level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.trim().is_empty() {
            anyhow::bail!("metadata.name must not be empty");
        }

        let locks = &self.spec.locks;
        if locks.lease.is_zero() {
            anyhow::bail!("spec.locks.lease must be greater than zero");
        }
        if locks.sweep_interval.is_zero() {
            anyhow::bail!("spec.locks.sweep_interval must be greater than zero");
        }
        if locks.sweep_interval > locks.lease {
            tracing::warn!(
                sweep_interval = ?locks.sweep_interval,
                lease = ?locks.lease,
                "Sweep interval exceeds lock lease; expired locks may linger until the next sweep"
            );
        }

        if self.spec.event_bus.capacity == 0 {
            anyhow::bail!("spec.event_bus.capacity must be greater than zero");
        }

        for dir in &self.spec.workspace.excluded_dirs {
            if dir.is_empty()
                || dir.contains('/')
                || dir.contains('\\')
                || dir == "."
                || dir == ".."
            {
                anyhow::bail!(
                    "Invalid excluded directory '{}': must be a single directory name",
                    dir
                );
            }
        }

        Ok(())
    }
}
