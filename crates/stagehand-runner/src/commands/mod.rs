use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets, Attribute, Cell, Color, Table};
use stagehand_client::{JobStatusKind, RunContext, WorkflowEngine};
use stagehand_core::config::{Overrides, WorkflowConfig};
use stagehand_core::constants::{config_files, hosts};
use stagehand_core::logging;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::Cli;
use crate::error::CliError;
use crate::hosts::HostManager;
use crate::tasks::TomlTaskManager;

pub mod clean;
pub mod kill;
pub mod list;
pub mod run;
pub mod show;
pub mod status;

/// How a command logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// A new file under `<workflow_dir>/log`, and stderr.
    Workflow,
}

pub struct AppContext {
    pub workflow_dir: PathBuf,
    pub host: String,
    pub overrides: Overrides,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if !cli.workflow_dir.is_dir() {
            return Err(CliError::NoWorkflow(cli.workflow_dir.clone()));
        }
        let workflow_dir = cli
            .workflow_dir
            .canonicalize()
            .unwrap_or_else(|_| cli.workflow_dir.clone());
        Ok(Self {
            workflow_dir,
            host: cli.host.clone().unwrap_or_else(|| hosts::LOCAL.to_string()),
            overrides: Overrides::from(&cli.overrides),
        })
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.workflow_dir.join(name)
    }

    /// Load the configuration files, start logging and build the engine.
    pub fn engine(&self, log: LogTarget, dry: bool, update: bool) -> Result<WorkflowEngine, CliError> {
        let mut config = WorkflowConfig::load(&self.config_path(config_files::WORKFLOW))?;
        config.apply(&self.overrides);

        match log {
            LogTarget::Stderr => logging::init_stderr_logger(),
            LogTarget::Workflow => {
                let path = logging::init_workflow_logger(&self.workflow_dir, &config.logging)?;
                tracing::debug!("Logging to {}", path.display());
            }
        }

        let host_manager = HostManager::load(&self.config_path(config_files::HOSTS))?;
        let host = Arc::new(host_manager.get_host(&self.host)?);
        tracing::debug!("Running on host '{}'", self.host);

        let tasks = TomlTaskManager::load(&self.config_path(config_files::TASKS), host.clone())?;
        tasks.check(config.task_graph().tasks()?)?;

        let ctx = RunContext {
            dry,
            update,
            workflow_dir: self.workflow_dir.clone(),
            ..Default::default()
        };
        let engine = WorkflowEngine::new(config, ctx, Box::new(tasks), Box::new((*host).clone()))?;
        Ok(engine)
    }
}

pub(crate) fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    table
}

pub(crate) fn status_color(kind: JobStatusKind) -> Color {
    match kind {
        JobStatusKind::Success | JobStatusKind::Finished => Color::Green,
        JobStatusKind::Error | JobStatusKind::Failed => Color::Red,
        JobStatusKind::Killed => Color::Magenta,
        JobStatusKind::NotSubmitted | JobStatusKind::Unknown => Color::DarkGrey,
        _ => Color::Yellow,
    }
}

pub(crate) fn optional(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}
