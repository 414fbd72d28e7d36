//! Probe configuration (YAML)
//!
//! Path comes from `FLEETPROBE_CONFIG`, default `fleetprobe.yaml`. A missing,
//! empty or broken file means defaults; `validate` is the caller's job.

use crate::dispatch::DispatchStrategy;
use crate::error::ConfigError;
use crate::metrics::{CommandSpec, ParserRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "FLEETPROBE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "fleetprobe.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    pub commands: Vec<CommandSpec>,
    pub dispatch: DispatchConf,
    pub timeouts: TimeoutConf,
    pub discovery: DiscoveryConf,
    pub ssh: SshConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DispatchConf {
    /// Worker pool size, unbounded when absent
    pub max_workers: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct TimeoutConf {
    pub connect_secs: Option<u64>,
    pub command_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DiscoveryConf {
    /// Run after authentication, e.g. "whoami"
    pub probe_command: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SshConf {
    pub inactivity_timeout_secs: Option<u64>,
    pub keepalive_secs: Option<u64>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            commands: CommandSpec::default_set(),
            dispatch: DispatchConf::default(),
            timeouts: TimeoutConf::default(),
            discovery: DiscoveryConf::default(),
            ssh: SshConf::default(),
        }
    }
}

impl ProbeConfig {
    /// Empty text yields the defaults
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self, parsers: &ParserRegistry) -> Result<(), ConfigError> {
        if self.commands.is_empty() {
            return Err(ConfigError::NoCommands);
        }

        let mut seen = HashSet::new();
        for spec in &self.commands {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateMetric(spec.name.clone()));
            }
            if !parsers.contains(&spec.parser) {
                return Err(ConfigError::UnknownParser {
                    metric: spec.name.clone(),
                    parser: spec.parser.clone(),
                });
            }
        }

        if self.dispatch.max_workers == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }

    pub fn strategy(&self) -> DispatchStrategy {
        DispatchStrategy::from_max_workers(self.dispatch.max_workers)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.timeouts.connect_secs.map(Duration::from_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.timeouts.command_secs.map(Duration::from_secs)
    }
}

/// Load from `$FLEETPROBE_CONFIG` or `fleetprobe.yaml`
pub async fn load_config() -> ProbeConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_config_from(&path).await
}

pub async fn load_config_from(path: impl AsRef<Path>) -> ProbeConfig {
    let path = path.as_ref();
    if !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return ProbeConfig::default();
    }

    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Cannot read config {}: {}, using defaults", path.display(), e);
            return ProbeConfig::default();
        }
    };

    ProbeConfig::from_yaml_str(&text).unwrap_or_else(|e| {
        warn!("Invalid config {}: {}, using defaults", path.display(), e);
        ProbeConfig::default()
    })
}
