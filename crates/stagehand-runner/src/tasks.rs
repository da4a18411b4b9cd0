use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use stagehand_client::error::{Result, WorkflowError};
use stagehand_client::manager::SchedulerOptions;
use stagehand_client::task::{Host, Task, TaskExport, TaskManager};
use stagehand_core::config::load_toml;
use stagehand_core::constants::files;
use stagehand_core::errors::{ConfigError, GraphError};
use stagehand_core::model::{value_to_env_string, EnvVars, Params};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::CliError;
use crate::hosts::TomlHost;

#[allow(clippy::expect_used)]
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex")
});

const CURRENT_DIR: &str = "current";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SubmitConfig {
    pub queue: Option<String>,
    pub memory: Option<String>,
    pub time: Option<String>,
    #[serde(default)]
    pub mail: Vec<String>,
    pub nnodes: Option<u32>,
    pub ncpus: Option<u32>,
    #[serde(default)]
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub inherit: Option<String>,
    #[serde(default)]
    pub commandline: String,
    pub run_dir: Option<String>,
    pub env: Option<String>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default)]
    pub submit: SubmitConfig,
}

/// Substitute `{{ name }}` placeholders. Returns the first undefined name
/// on failure.
pub fn render(template: &str, params: &Params) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = params
            .get(name.as_str())
            .ok_or_else(|| name.as_str().to_string())?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(&value_to_env_string(value));
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn merge(base: &mut toml::Table, overlay: &toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(toml::Value::Table(inner)), toml::Value::Table(other)) => merge(inner, other),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn resolve(
    name: &str,
    raw: &BTreeMap<String, toml::Table>,
    stack: &mut Vec<String>,
) -> std::result::Result<toml::Table, CliError> {
    let table = raw
        .get(name)
        .ok_or_else(|| GraphError::UnknownTask(name.to_string()))?;
    let Some(parent) = table.get("inherit").and_then(toml::Value::as_str) else {
        return Ok(table.clone());
    };
    if !raw.contains_key(parent) {
        return Err(GraphError::UnknownParent {
            task: name.to_string(),
            parent: parent.to_string(),
        }
        .into());
    }
    if stack.iter().any(|s| s == parent) {
        return Err(ConfigError::General(format!(
            "circular inheritance between tasks: {} -> {}",
            stack.join(" -> "),
            parent
        ))
        .into());
    }

    stack.push(parent.to_string());
    let mut merged = resolve(parent, raw, stack)?;
    stack.pop();
    merge(&mut merged, table);
    merged.remove("inherit");
    Ok(merged)
}

/// Task definitions of `tasks.toml`.
#[derive(Debug, Clone)]
pub struct TomlTaskManager {
    tasks: BTreeMap<String, TaskConfig>,
    host: Arc<TomlHost>,
}

impl TomlTaskManager {
    pub fn load(path: &Path, host: Arc<TomlHost>) -> std::result::Result<Self, CliError> {
        let raw: BTreeMap<String, toml::Table> = load_toml(path)?;
        let mut tasks = BTreeMap::new();
        for name in raw.keys() {
            let mut stack = vec![name.clone()];
            let table = resolve(name, &raw, &mut stack)?;
            let config: TaskConfig =
                toml::Value::Table(table)
                    .try_into()
                    .map_err(|source| ConfigError::Toml {
                        path: path.to_path_buf(),
                        source,
                    })?;
            tasks.insert(name.clone(), config);
        }
        tracing::debug!("Loaded {} task(s) from {}", tasks.len(), path.display());
        Ok(Self { tasks, host })
    }

    pub fn from_configs(tasks: BTreeMap<String, TaskConfig>, host: Arc<TomlHost>) -> Self {
        Self { tasks, host }
    }

    pub fn config(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.get(name)
    }

    /// Fail on the first name without a definition.
    pub fn check<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> std::result::Result<(), GraphError> {
        for name in names {
            if !self.tasks.contains_key(name) {
                return Err(GraphError::UnknownTask(name.to_string()));
            }
        }
        Ok(())
    }
}

impl TaskManager for TomlTaskManager {
    fn get_task(&self, name: &str) -> std::result::Result<Arc<dyn Task>, GraphError> {
        let config = self
            .tasks
            .get(name)
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))?;
        Ok(Arc::new(TomlTask {
            name: name.to_string(),
            config: config.clone(),
            host: self.host.clone(),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct TomlTask {
    name: String,
    config: TaskConfig,
    host: Arc<TomlHost>,
}

impl TomlTask {
    fn render(&self, template: &str, params: &Params) -> Result<String> {
        render(template, params).map_err(|missing| WorkflowError::Render {
            task: self.name.clone(),
            reason: format!("undefined parameter '{}'", missing),
        })
    }

    fn scheduler_options(&self) -> SchedulerOptions {
        if !self.host.scheduler().is_batch() {
            return SchedulerOptions::default();
        }
        let submit = &self.config.submit;
        SchedulerOptions {
            queue: submit.queue.as_deref().map(|q| self.host.queue(q)),
            memory: submit.memory.clone(),
            time: submit.time.clone(),
            mail: submit.mail.clone(),
            nnodes: submit.nnodes.map(|n| n.to_string()),
            ncpus: submit.ncpus.map(|n| n.to_string()),
            extra: submit.extra.clone(),
        }
    }

    fn script(
        &self,
        params: &Params,
        env_vars: &EnvVars,
        artifacts: &BTreeMap<String, String>,
    ) -> Result<String> {
        let mut script = String::from("#!/bin/bash\n");
        let _ = writeln!(script, "# Task: {}", self.name);
        if let Some(dir) = params.get("submission_dir").and_then(|v| v.as_str()) {
            let _ = writeln!(
                script,
                "trap 'echo $? > \"{}/{}\"' EXIT",
                dir,
                files::EXIT_STATUS
            );
        }
        script.push_str("set -e\n\n");

        let env_lines = self.host.env_lines(self.config.env.as_deref())?;
        if !env_lines.is_empty() {
            script.push_str("# Environment\n");
            for line in env_lines {
                let _ = writeln!(script, "{}", line);
            }
            script.push('\n');
        }

        script.push_str("# Parameters\n");
        for (key, value) in env_vars {
            let value = value.replace('\\', "\\\\").replace('"', "\\\"");
            let _ = writeln!(script, "export {}=\"{}\"", key, value);
        }
        script.push('\n');

        if let Some(run_dir) = self.run_dir(params)? {
            let _ = writeln!(
                script,
                "mkdir -p \"{0}\" && cd \"{0}\"\n",
                run_dir.display()
            );
        }

        script.push_str("# Commandline\n");
        let _ = writeln!(script, "{}", self.render(&self.config.commandline, params)?.trim_end());

        if !artifacts.is_empty() {
            script.push_str("\n# Artifacts\n");
            for (name, path) in artifacts {
                let _ = writeln!(
                    script,
                    "test -e \"{1}\" || {{ echo \"Missing artifact {0}: {1}\" >&2; exit 1; }}",
                    name, path
                );
            }
        }
        Ok(script)
    }
}

impl Task for TomlTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_dir(&self, params: &Params) -> Result<Option<PathBuf>> {
        let Some(template) = self.config.run_dir.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if template.is_empty() {
            return Ok(None);
        }
        if template == CURRENT_DIR {
            return std::env::current_dir()
                .map(Some)
                .map_err(WorkflowError::io(CURRENT_DIR));
        }
        Ok(Some(PathBuf::from(self.render(template, params)?)))
    }

    fn render_artifacts(&self, params: &Params) -> Result<BTreeMap<String, String>> {
        let mut artifacts = BTreeMap::new();
        if self.config.artifacts.is_empty() {
            return Ok(artifacts);
        }
        let run_dir = self.run_dir(params)?;
        for (name, template) in &self.config.artifacts {
            let rendered = self.render(template.trim(), params)?;
            let path = if Path::new(&rendered).is_absolute() {
                PathBuf::from(rendered)
            } else {
                match &run_dir {
                    Some(dir) => dir.join(rendered),
                    None => {
                        return Err(GraphError::RelativeArtifact {
                            task: self.name.clone(),
                            artifact: name.clone(),
                        }
                        .into())
                    }
                }
            };
            artifacts.insert(name.clone(), path.display().to_string());
        }
        Ok(artifacts)
    }

    fn export(&self, params: &Params, env_vars: &EnvVars) -> Result<TaskExport> {
        let artifacts = self.render_artifacts(params)?;
        Ok(TaskExport {
            script_content: self.script(params, env_vars, &artifacts)?,
            scheduler_options: self.scheduler_options(),
            artifacts,
        })
    }
}
