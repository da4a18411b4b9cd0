use serde::Deserialize;
use serde_json::json;
use stagehand_client::task::Host;
use stagehand_core::config::load_toml;
use stagehand_core::constants::{env, hosts};
use stagehand_core::errors::HostError;
use stagehand_core::model::{Params, SchedulerType};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::CliError;

/// Modules and variables loaded by a job script.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvConfig {
    #[serde(default)]
    pub module_use: Option<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(default)]
    pub prepend: BTreeMap<String, String>,
    #[serde(default)]
    pub append: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    #[serde(default)]
    pub scheduler: SchedulerType,
    #[serde(default)]
    pub module_setup: Option<String>,
    #[serde(default)]
    pub dirs: BTreeMap<String, String>,
    #[serde(default)]
    pub queues: BTreeMap<String, String>,
    #[serde(default)]
    pub envs: BTreeMap<String, EnvConfig>,
}

/// Host definitions of `hosts.toml`, on top of the built-in `local` host.
#[derive(Debug, Clone)]
pub struct HostManager {
    hosts: BTreeMap<String, HostConfig>,
}

impl Default for HostManager {
    fn default() -> Self {
        let mut hosts = BTreeMap::new();
        hosts.insert(hosts::LOCAL.to_string(), HostConfig::default());
        Self { hosts }
    }
}

impl HostManager {
    /// Built-in hosts merged with `path` when it exists.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let mut manager = Self::default();
        if path.exists() {
            let user: BTreeMap<String, HostConfig> = load_toml(path)?;
            tracing::debug!("Loaded {} host(s) from {}", user.len(), path.display());
            manager.hosts.extend(user);
        }
        Ok(manager)
    }

    pub fn names(&self) -> Vec<String> {
        self.hosts.keys().cloned().collect()
    }

    pub fn get_host(&self, name: &str) -> Result<TomlHost, CliError> {
        let config = self
            .hosts
            .get(name)
            .ok_or_else(|| HostError::UnknownHost {
                name: name.to_string(),
                available: self.names(),
            })?
            .clone();
        TomlHost::new(name, config)
    }
}

/// A configured host, with its directories expanded.
#[derive(Debug, Clone)]
pub struct TomlHost {
    name: String,
    config: HostConfig,
    dirs: BTreeMap<String, String>,
}

impl TomlHost {
    pub fn new(name: &str, config: HostConfig) -> Result<Self, CliError> {
        let mut dirs = BTreeMap::new();
        for (key, value) in &config.dirs {
            if value.is_empty() {
                continue;
            }
            let expanded = shellexpand::full(value).map_err(|e| CliError::Expand {
                host: name.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            })?;
            dirs.insert(key.clone(), expanded.into_owned());
        }
        Ok(Self {
            name: name.to_string(),
            config,
            dirs,
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Real queue name of a generic one.
    pub fn queue(&self, name: &str) -> String {
        self.config
            .queues
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Bash lines loading a named environment. No name loads nothing.
    pub fn env_lines(&self, name: Option<&str>) -> Result<Vec<String>, HostError> {
        let Some(name) = name else {
            return Ok(Vec::new());
        };
        let env_config = self
            .config
            .envs
            .get(name)
            .ok_or_else(|| HostError::UnknownEnvironment {
                name: name.to_string(),
                available: self.config.envs.keys().cloned().collect(),
            })?;

        let mut lines = Vec::new();
        if !env_config.modules.is_empty() {
            if let Some(setup) = &self.config.module_setup {
                lines.push(setup.clone());
            }
            if let Some(path) = &env_config.module_use {
                lines.push(format!("module use {}", path));
            }
            lines.push(format!("module load {}", env_config.modules.join(" ")));
        }
        for (key, value) in &self.dirs {
            lines.push(format!(
                "export {}{}_DIR=\"{}\"",
                env::PREFIX,
                key.to_uppercase(),
                value
            ));
        }
        for (key, value) in &env_config.vars {
            lines.push(format!("export {}=\"{}\"", key, value));
        }
        for (key, value) in &env_config.prepend {
            lines.push(format!("export {key}=\"{value}${{{key}:+:${key}}}\""));
        }
        for (key, value) in &env_config.append {
            lines.push(format!("export {key}=\"${{{key}:+${key}:}}{value}\""));
        }
        Ok(lines)
    }
}

impl Host for TomlHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn scheduler(&self) -> SchedulerType {
        self.config.scheduler
    }

    fn params(&self) -> Params {
        self.dirs
            .iter()
            .map(|(key, value)| (format!("{}_dir", key), json!(value)))
            .collect()
    }
}
