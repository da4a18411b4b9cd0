use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::manager::{JobManager, SchedulerOptions};
use stagehand_core::errors::GraphError;
use stagehand_core::model::{EnvVars, Params, SchedulerType};

/// What a task materializes into for one slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskExport {
    pub script_content: String,
    pub scheduler_options: SchedulerOptions,
    pub artifacts: BTreeMap<String, String>,
}

/// A unit of work declared in the task definitions.
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    /// Directory the commands run in, rendered with the slot parameters.
    /// `None` means the submission directory.
    fn run_dir(&self, params: &Params) -> Result<Option<PathBuf>>;

    /// Declared outputs, rendered and made absolute.
    fn render_artifacts(&self, params: &Params) -> Result<BTreeMap<String, String>>;

    /// Render the job script and the scheduler options.
    fn export(&self, params: &Params, env_vars: &EnvVars) -> Result<TaskExport>;
}

/// Source of task definitions.
pub trait TaskManager: Send + Sync {
    fn get_task(&self, name: &str) -> std::result::Result<Arc<dyn Task>, GraphError>;
}

/// The machine a workflow runs on.
pub trait Host: Send + Sync {
    fn name(&self) -> &str;

    fn scheduler(&self) -> SchedulerType;

    /// Host parameters, such as `<name>_dir` directories.
    fn params(&self) -> Params;

    fn job_manager(&self) -> JobManager {
        JobManager::new(self.scheduler())
    }
}
