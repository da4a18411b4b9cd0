use serde_json::json;
use stagehand_client::error::{JobError, Result};
use stagehand_client::manager::{JobManager, SchedulerOptions};
use stagehand_client::runner::{CommandOutput, CommandRunner};
use stagehand_client::task::{Host, Task, TaskExport, TaskManager};
use stagehand_core::constants::{config_files, hosts};
use stagehand_core::errors::GraphError;
use stagehand_core::model::{EnvVars, Params, SchedulerType};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A temporary workflow directory.
pub struct TestContext {
    pub _temp_dir: tempfile::TempDir,
    pub workflow_dir: PathBuf,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = tempfile::Builder::new()
            .prefix("stagehand-test-")
            .tempdir()
            .expect("Failed to create temp dir");
        let workflow_dir = temp_dir.path().join("workflow");
        fs::create_dir_all(&workflow_dir).expect("Failed to create workflow dir");
        Self {
            _temp_dir: temp_dir,
            workflow_dir,
        }
    }

    pub fn with_workflow(content: &str) -> Self {
        let ctx = Self::new();
        ctx.write_workflow(content);
        ctx
    }

    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.workflow_dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write test file");
        path
    }

    pub fn write_workflow(&self, content: &str) -> PathBuf {
        self.write_file(config_files::WORKFLOW, content)
    }

    pub fn write_tasks(&self, content: &str) -> PathBuf {
        self.write_file(config_files::TASKS, content)
    }

    pub fn write_hosts(&self, content: &str) -> PathBuf {
        self.write_file(config_files::HOSTS, content)
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.workflow_dir.join(rel)
    }

    pub fn scratch(&self) -> &Path {
        self._temp_dir.path()
    }
}

/// A scheduler command runner that records every call.
///
/// Scripted replies are consumed in order. Without one, `sbatch` and `qsub`
/// get a fresh job id and other commands succeed silently.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    replies: Arc<Mutex<Vec<CommandOutput>>>,
    counter: Arc<Mutex<u32>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, stdout: &str) -> &Self {
        self.push(CommandOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    pub fn fail(&self, code: i32, stderr: &str) -> &Self {
        self.push(CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }

    fn push(&self, output: CommandOutput) -> &Self {
        self.replies.lock().expect("poisoned").push(output);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("poisoned").clone()
    }

    /// Calls of one program, e.g. `sbatch`.
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|call| call.first().is_some_and(|p| p == program))
            .collect()
    }

    fn next_id(&self) -> u32 {
        let mut counter = self.counter.lock().expect("poisoned");
        *counter += 1;
        *counter
    }
}

impl CommandRunner for RecordingRunner {
    fn run(
        &self,
        args: &[String],
        _cwd: Option<&Path>,
    ) -> std::result::Result<CommandOutput, JobError> {
        self.calls.lock().expect("poisoned").push(args.to_vec());
        {
            let mut replies = self.replies.lock().expect("poisoned");
            if !replies.is_empty() {
                return Ok(replies.remove(0));
            }
        }
        let stdout = match args.first().map(String::as_str) {
            Some("sbatch") => format!("Submitted batch job {}\n", self.next_id()),
            Some("qsub") => format!("{}.pbs01\n", self.next_id()),
            _ => String::new(),
        };
        Ok(CommandOutput {
            code: Some(0),
            stdout,
            stderr: String::new(),
        })
    }
}

/// The `--dependency=` value of an `sbatch` call, split into job ids.
pub fn slurm_dependencies(call: &[String]) -> Vec<String> {
    call.iter()
        .find_map(|arg| arg.strip_prefix("--dependency="))
        .map(|value| {
            value
                .split(',')
                .filter_map(|dep| dep.strip_prefix("afterok:"))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// The `-J` value of an `sbatch` call.
pub fn slurm_job_name(call: &[String]) -> Option<&str> {
    call.iter()
        .position(|arg| arg == "-J")
        .and_then(|i| call.get(i + 1))
        .map(String::as_str)
}

/// A task with a fixed script body.
#[derive(Debug, Clone)]
pub struct StaticTask {
    pub name: String,
    pub body: String,
    pub run_dir: Option<PathBuf>,
    pub artifacts: BTreeMap<String, String>,
    pub options: SchedulerOptions,
}

impl StaticTask {
    pub fn new(name: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            body: body.to_string(),
            run_dir: None,
            artifacts: BTreeMap::new(),
            options: SchedulerOptions::default(),
        }
    }
}

impl Task for StaticTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_dir(&self, _params: &Params) -> Result<Option<PathBuf>> {
        Ok(self.run_dir.clone())
    }

    fn render_artifacts(&self, _params: &Params) -> Result<BTreeMap<String, String>> {
        Ok(self.artifacts.clone())
    }

    fn export(&self, params: &Params, env_vars: &EnvVars) -> Result<TaskExport> {
        let mut script = String::from("#!/bin/bash\n");
        if let Some(status) = params.get("submission_dir").and_then(|v| v.as_str()) {
            script.push_str(&format!("trap 'echo $? > \"{}/job.status\"' EXIT\n", status));
        }
        for (key, value) in env_vars {
            script.push_str(&format!("export {}=\"{}\"\n", key, value));
        }
        script.push_str(&self.body);
        script.push('\n');
        Ok(TaskExport {
            script_content: script,
            scheduler_options: self.options.clone(),
            artifacts: self.artifacts.clone(),
        })
    }
}

#[derive(Default, Clone)]
pub struct StaticTaskManager {
    tasks: BTreeMap<String, Arc<dyn Task>>,
}

impl StaticTaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, task: StaticTask) -> Self {
        self.tasks.insert(task.name.clone(), Arc::new(task));
        self
    }

    /// One `true` task per name.
    pub fn trivial(names: &[&str]) -> Self {
        names
            .iter()
            .fold(Self::new(), |mgr, name| mgr.with(StaticTask::new(name, "true")))
    }
}

impl TaskManager for StaticTaskManager {
    fn get_task(&self, name: &str) -> std::result::Result<Arc<dyn Task>, GraphError> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))
    }
}

/// A host whose job manager goes through a [`RecordingRunner`].
#[derive(Debug, Clone)]
pub struct FakeHost {
    pub name: String,
    pub scheduler: SchedulerType,
    pub runner: RecordingRunner,
    pub params: Params,
}

impl FakeHost {
    pub fn new(scheduler: SchedulerType, runner: &RecordingRunner) -> Self {
        let mut params = Params::new();
        params.insert("scratch_dir".into(), json!("/scratch"));
        Self {
            name: hosts::LOCAL.to_string(),
            scheduler,
            runner: runner.clone(),
            params,
        }
    }
}

impl Host for FakeHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn scheduler(&self) -> SchedulerType {
        self.scheduler
    }

    fn params(&self) -> Params {
        self.params.clone()
    }

    fn job_manager(&self) -> JobManager {
        JobManager::with_runner(self.scheduler, Box::new(self.runner.clone()))
    }
}
