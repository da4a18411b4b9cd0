use regex::Regex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::backends::{background, has_failure_marker};
use crate::command::shell_join;
use crate::error::{Result, WorkflowError};
use crate::manager::{JobManager, SubmitRequest};
use crate::status::{JobStatus, JobStatusKind};
use crate::task::{Host, Task, TaskManager};
use stagehand_core::config::{scalars, WorkflowConfig};
use stagehand_core::constants::{dirs, env, files};
use stagehand_core::cycles::Cycle;
use stagehand_core::ensemble::Member;
use stagehand_core::graph::TaskGraph;
use stagehand_core::logging::{list_log_files, LOG_LINK, LOG_PREFIX};
use stagehand_core::model::{params_to_env_vars, EnvVars, Params, Stage};

/// Flags and paths threaded through one invocation.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub dry: bool,
    pub update: bool,
    pub workflow_dir: PathBuf,
    pub env_vars: EnvVars,
}

/// One (task, cycle, member) instance. Cycle and member are indices into
/// the engine's generated lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    pub task: String,
    pub cycle: Option<usize>,
    pub member: Option<usize>,
}

/// A submission made by [`WorkflowEngine::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub slot: Slot,
    pub jobid: String,
    pub depend: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub status: JobStatus,
    pub task: String,
    pub cycle: Option<String>,
    pub member: Option<String>,
    pub submission_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub task: String,
    pub name: String,
    pub path: PathBuf,
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirEntry {
    pub task: String,
    pub cycle: Option<String>,
    pub member: Option<String>,
    pub run_dir: Option<PathBuf>,
}

/// Selects slots for `kill` and `artifacts`. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub jobids: Vec<String>,
    pub task: Option<String>,
    pub cycle: Option<String>,
    pub member: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub submission_dirs: bool,
    pub log_files: bool,
    pub run_dirs: bool,
    pub artifacts: bool,
    pub extra: Vec<String>,
    pub dry: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            submission_dirs: true,
            log_files: true,
            run_dirs: false,
            artifacts: false,
            extra: Vec::new(),
            dry: false,
        }
    }
}

pub struct WorkflowEngine {
    config: WorkflowConfig,
    graph: TaskGraph,
    cycles: Vec<Cycle>,
    members: Vec<Member>,
    ctx: RunContext,
    tasks: Box<dyn TaskManager>,
    host: Box<dyn Host>,
    manager: JobManager,
    task_cache: HashMap<String, Arc<dyn Task>>,
    artifact_cache: HashMap<Slot, BTreeMap<String, String>>,
}

impl WorkflowEngine {
    /// Validate the configuration and generate the iteration domain.
    pub fn new(
        config: WorkflowConfig,
        ctx: RunContext,
        tasks: Box<dyn TaskManager>,
        host: Box<dyn Host>,
    ) -> Result<Self> {
        config.validate()?;
        let graph = config.task_graph();
        graph.plan()?;
        let cycles = config.gen_cycles()?;
        let members = config.gen_members()?;
        let manager = host.job_manager();
        tracing::debug!(
            "Workflow with {} cycle(s) and {} member(s) on host '{}' ({} jobs)",
            cycles.len(),
            members.len(),
            host.name(),
            manager.name()
        );

        Ok(Self {
            config,
            graph,
            cycles,
            members,
            ctx,
            tasks,
            host,
            manager,
            task_cache: HashMap::new(),
            artifact_cache: HashMap::new(),
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn job_manager(&self) -> &JobManager {
        &self.manager
    }

    pub fn workflow_dir(&self) -> &Path {
        &self.ctx.workflow_dir
    }

    pub fn set_dry(&mut self, dry: bool) {
        self.ctx.dry = dry;
    }

    pub fn set_update(&mut self, update: bool) {
        self.ctx.update = update;
    }

    /// Ensemble size, skipped members included.
    pub fn nmembers(&self) -> usize {
        self.members.first().map(|m| m.nmembers).unwrap_or(0)
    }

    fn cycle(&self, slot: &Slot) -> Option<&Cycle> {
        slot.cycle.and_then(|i| self.cycles.get(i))
    }

    fn member(&self, slot: &Slot) -> Option<&Member> {
        slot.member.and_then(|i| self.members.get(i))
    }

    fn cycle_indices(&self, stage: Stage) -> Vec<Option<usize>> {
        match stage {
            Stage::Cycles => (0..self.cycles.len()).map(Some).collect(),
            _ => vec![None],
        }
    }

    /// Member indices of a task, or a single pseudo-member.
    pub fn member_indices(&self, task: &str) -> Vec<Option<usize>> {
        if !self.members.is_empty() && self.config.ensemble.tasks.iter().any(|t| t == task) {
            (0..self.members.len()).map(Some).collect()
        } else {
            vec![None]
        }
    }

    /// Every slot, in submission order.
    pub fn slots(&self) -> Result<Vec<Slot>> {
        let plan = self.graph.plan()?;
        let mut slots = Vec::new();
        for stage in Stage::ALL {
            let Some(sequences) = plan.get(&stage) else {
                continue;
            };
            if sequences.is_empty() {
                continue;
            }
            for cycle in self.cycle_indices(stage) {
                for sequence in sequences {
                    for task in sequence.tasks() {
                        for member in self.member_indices(task) {
                            slots.push(Slot {
                                task: task.to_string(),
                                cycle,
                                member,
                            });
                        }
                    }
                }
            }
        }
        Ok(slots)
    }

    fn select(&self, filter: &SlotFilter) -> Result<Vec<Slot>> {
        Ok(self
            .slots()?
            .into_iter()
            .filter(|slot| {
                filter.task.as_deref().is_none_or(|t| t == slot.task)
                    && filter.cycle.as_deref().is_none_or(|c| {
                        self.cycle(slot)
                            .is_some_and(|cycle| cycle.token == c || cycle.label == c)
                    })
                    && filter
                        .member
                        .is_none_or(|id| self.member(slot).is_some_and(|m| m.id == id))
            })
            .collect())
    }

    pub fn app_path(&self) -> PathBuf {
        self.config.app.path_parts().into_iter().collect()
    }

    /// `app/conf/exp/<cycle token>/<task>/<member label>`
    pub fn task_path(&self, slot: &Slot) -> PathBuf {
        let mut path = self.app_path();
        if let Some(cycle) = self.cycle(slot) {
            path.push(&cycle.token);
        }
        path.push(&slot.task);
        if let Some(member) = self.member(slot) {
            path.push(&member.label);
        }
        path
    }

    pub fn submission_dir(&self, slot: &Slot) -> PathBuf {
        self.ctx
            .workflow_dir
            .join(dirs::JOBS)
            .join(self.task_path(slot))
    }

    fn get_task(&mut self, name: &str) -> Result<Arc<dyn Task>> {
        if let Some(task) = self.task_cache.get(name) {
            return Ok(task.clone());
        }
        let task = self.tasks.get_task(name)?;
        self.task_cache.insert(name.to_string(), task.clone());
        Ok(task)
    }

    fn search_paths(&self) -> EnvVars {
        let root = &self.ctx.workflow_dir;
        [
            ("PATH", root.join(dirs::BIN)),
            ("PYTHONPATH", root.join(dirs::LIB).join("python")),
            ("LIBRARY_PATH", root.join(dirs::LIB)),
            ("INCLUDE_PATH", root.join(dirs::INCLUDE)),
        ]
        .into_iter()
        .filter(|(_, dir)| dir.is_dir())
        .map(|(var, dir)| {
            (
                var.to_string(),
                format!("{}${{{var}:+:${var}}}", dir.display()),
            )
        })
        .collect()
    }

    /// Substitution parameters and exported environment of a slot.
    ///
    /// Later sources override earlier ones: `[params]`, `[env_vars]`, app and
    /// cycles settings, paths, host, cycle, member, task and host specific
    /// params, then the workflow paths.
    pub fn task_inputs(&mut self, slot: &Slot) -> Result<(Params, EnvVars)> {
        let task = self.get_task(&slot.task)?;

        let mut params = scalars(&self.config.params.values);
        let mut env_vars = params_to_env_vars(&params, None);
        env_vars.extend(self.config.env_vars.clone());
        env_vars.extend(self.ctx.env_vars.clone());

        let mut sections = self.config.app.params();
        sections.extend(self.config.cycles.params());
        env_vars.extend(params_to_env_vars(&sections, None));
        params.extend(sections);

        params.insert(
            "app_path".into(),
            json!(self.app_path().display().to_string()),
        );
        params.insert(
            "task_path".into(),
            json!(self.task_path(slot).display().to_string()),
        );
        params.insert("task_name".into(), json!(slot.task));
        env_vars.extend(params_to_env_vars(
            &params,
            Some(&["app_path", "task_path", "task_name"]),
        ));

        params.extend(self.host.params());

        match self.cycle(slot) {
            Some(cycle) => {
                let mut cycle_params = cycle.params("");
                for (neighbour, suffix) in [(cycle.prev, "prev"), (cycle.next, "next")] {
                    if let Some(other) = neighbour.and_then(|i| self.cycles.get(i)) {
                        cycle_params.extend(other.params(suffix));
                    }
                }
                env_vars.extend(params_to_env_vars(&cycle_params, None));
                params.extend(cycle_params);
            }
            None => {
                params.insert("cycle".into(), Value::Null);
            }
        }

        match self.member(slot) {
            Some(member) => {
                let member_params = member.params();
                env_vars.extend(params_to_env_vars(&member_params, None));
                params.extend(member_params);
            }
            None => {
                params.insert("member".into(), Value::Null);
                params.insert("nmembers".into(), json!(self.nmembers()));
                env_vars.insert(
                    format!("{}NMEMBERS", env::PREFIX),
                    self.nmembers().to_string(),
                );
            }
        }

        // Task specific params are exported but never substituted.
        if let Some(task_params) = self.config.params.tasks.get(&slot.task) {
            env_vars.extend(params_to_env_vars(&scalars(task_params), None));
        }
        if let Some(host_params) = self.config.params.hosts.get(self.host.name()) {
            let host_params = scalars(host_params);
            env_vars.extend(params_to_env_vars(&host_params, None));
            params.extend(host_params);
        }

        let submission_dir = self.submission_dir(slot);
        let path_value = |p: &Path| json!(p.display().to_string());
        params.insert("workflow_dir".into(), path_value(&self.ctx.workflow_dir));
        params.insert("submission_dir".into(), path_value(&submission_dir));
        params.insert(
            "log_dir".into(),
            path_value(&self.ctx.workflow_dir.join(dirs::LOG)),
        );
        params.insert(
            "script_path".into(),
            path_value(&submission_dir.join(files::SCRIPT)),
        );
        let run_dir = task.run_dir(&params)?;
        params.insert(
            "run_dir".into(),
            run_dir.as_deref().map(path_value).unwrap_or(Value::Null),
        );
        env_vars.extend(params_to_env_vars(
            &params,
            Some(&[
                "workflow_dir",
                "run_dir",
                "submission_dir",
                "log_dir",
                "script_path",
            ]),
        ));

        env_vars.extend(self.search_paths());
        Ok((params, env_vars))
    }

    pub fn run_dir(&mut self, slot: &Slot) -> Result<Option<PathBuf>> {
        let (params, _) = self.task_inputs(slot)?;
        Ok(params
            .get("run_dir")
            .and_then(Value::as_str)
            .map(PathBuf::from))
    }

    pub fn task_artifacts(&mut self, slot: &Slot) -> Result<BTreeMap<String, String>> {
        if let Some(artifacts) = self.artifact_cache.get(slot) {
            return Ok(artifacts.clone());
        }
        let task = self.get_task(&slot.task)?;
        let (params, _) = self.task_inputs(slot)?;
        let artifacts = task.render_artifacts(&params)?;
        self.artifact_cache.insert(slot.clone(), artifacts.clone());
        Ok(artifacts)
    }

    /// Status of a slot, from its files first and the scheduler last.
    pub fn task_status(&mut self, slot: &Slot) -> Result<JobStatus> {
        let dir = self.submission_dir(slot);
        let record = dir.join(files::RECORD);
        if !dir.exists() || !record.exists() {
            return Ok(JobStatus::not_submitted());
        }
        let mut job = self.manager.load_job(&record)?;

        let markers = self.manager.failure_markers();
        for name in [files::STDOUT, files::STDERR] {
            if let Ok(content) = fs_err::read_to_string(dir.join(name)) {
                if has_failure_marker(&content, markers) {
                    return Ok(JobStatus::new(JobStatusKind::Failed, job.jobid));
                }
            }
        }

        if let Some(code) = background::read_exit_status(&dir.join(files::EXIT_STATUS)) {
            let kind = if code == 0 {
                JobStatusKind::Success
            } else {
                JobStatusKind::Error
            };
            return Ok(JobStatus::new(kind, job.jobid));
        }

        Ok(self.manager.get_status(&mut job)?)
    }

    /// Like [`task_status`](Self::task_status), with job errors reported as
    /// an unknown status. Only for listings.
    fn status_or_unknown(&mut self, slot: &Slot) -> Result<JobStatus> {
        match self.task_status(slot) {
            Err(WorkflowError::Job(err)) => {
                tracing::warn!(
                    "Cannot get the status of '{}': {}",
                    self.task_path(slot).display(),
                    err
                );
                Ok(JobStatus::new(JobStatusKind::Unknown, ""))
            }
            other => other,
        }
    }

    /// Remove the per-slot job files. Only logged under dry run.
    pub fn clean_task(&self, slot: &Slot) -> Result<()> {
        let dir = self.submission_dir(slot);
        for name in files::SLOT_FILES {
            let path = dir.join(name);
            if path.exists() {
                if !self.ctx.dry {
                    fs_err::remove_file(&path).map_err(WorkflowError::io(&path))?;
                }
                tracing::debug!("Removed: {}", path.display());
            }
        }
        Ok(())
    }

    fn submission_request(
        &mut self,
        slot: &Slot,
        depend: &[String],
    ) -> Result<(SubmitRequest, String)> {
        let task = self.get_task(&slot.task)?;
        let (params, env_vars) = self.task_inputs(slot)?;
        let export = task.export(&params, &env_vars)?;
        let request = SubmitRequest {
            name: task.name().to_string(),
            script: self.submission_dir(slot).join(files::SCRIPT),
            options: export.scheduler_options,
            depend: depend.to_vec(),
            artifacts: export.artifacts,
        };
        Ok((request, export.script_content))
    }

    fn submit_task(&mut self, slot: &Slot, depend: &[String]) -> Result<Option<String>> {
        let (request, content) = self.submission_request(slot, depend)?;
        if let Some(dir) = request.script.parent() {
            fs_err::create_dir_all(dir).map_err(WorkflowError::io(dir))?;
        }
        fs_err::write(&request.script, content).map_err(WorkflowError::io(&request.script))?;
        tracing::info!("Created batch script: {}", request.script.display());

        Ok(self.manager.submit(&request)?.map(|job| job.jobid))
    }

    fn submit_task_fake(&mut self, slot: &Slot, depend: &[String]) -> Result<String> {
        let (request, content) = self.submission_request(slot, depend)?;
        let cmdline = shell_join(&self.manager.submission_command(&request));
        let jobid = rand::random_range(0..1_000_000u32).to_string();

        let mut report = String::from("Fake submission:\n");
        let _ = writeln!(report, "{:-^50}", " submission command ");
        let _ = writeln!(report, "{}", cmdline);
        let _ = writeln!(report, "{:-^50}", " batch script content ");
        let _ = writeln!(report, "{}", content);
        if !request.artifacts.is_empty() {
            let _ = writeln!(report, "{:-^50}", " artifacts ");
            for (name, path) in &request.artifacts {
                let _ = writeln!(report, "{}: {}", name, path);
            }
        }
        report.push_str(&"-".repeat(50));
        tracing::info!("{}", report);

        Ok(jobid)
    }

    fn submit_slot(&mut self, slot: &Slot, depend: &[String]) -> Result<Option<String>> {
        let label = self.task_path(slot).display().to_string();
        tracing::debug!("Running task: {}", label);

        let status = self.task_status(slot)?;
        if status.is_running() {
            return Err(WorkflowError::AlreadyRunning {
                task: label,
                jobid: status.jobid,
            });
        }

        if self.ctx.update {
            match status.kind {
                JobStatusKind::Success => {
                    tracing::debug!("Skip update of task: {}", label);
                    return Ok(None);
                }
                JobStatusKind::Error => {
                    tracing::warn!("Existing job of task '{}' led to error. Re-running...", label)
                }
                JobStatusKind::Unknown => tracing::warn!(
                    "Unknown status for existing job of task '{}'. Re-running...",
                    label
                ),
                _ => {}
            }
        }

        self.clean_task(slot)?;

        let jobids = depend.join(", ");
        tracing::debug!("Submitting task: {} depending on [{}]", label, jobids);
        let jobid = if self.ctx.dry {
            self.submit_task_fake(slot, depend)?
        } else {
            self.submit_task(slot, depend)?
                .ok_or_else(|| WorkflowError::SubmissionAborted(label.clone()))?
        };

        if depend.is_empty() {
            tracing::info!("Submitted task: {} with job id {}", label, jobid);
        } else {
            tracing::info!(
                "Submitted task: {} with job id {} depending on [{}]",
                label,
                jobid,
                jobids
            );
        }
        Ok(Some(jobid))
    }

    fn log_cycles(&self) {
        let (Some(first), Some(last)) = (self.cycles.first(), self.cycles.last()) else {
            return;
        };
        if self.cycles.len() == 1 {
            tracing::info!("Single cycle: {}", first.label);
            return;
        }
        let indep = if self.config.cycles.indep {
            "independent "
        } else {
            ""
        };
        let (kind, end) = match last.end_date {
            Some(end) => ("intervals", end),
            None => ("dates", last.begin_date),
        };
        tracing::info!(
            "Cycling on {}{} from {} to {} in {} time(s)",
            indep,
            kind,
            first.begin_date,
            end,
            self.cycles.len()
        );
    }

    /// Submit every slot, propagating dependencies between submissions.
    pub fn run(&mut self) -> Result<Vec<Submission>> {
        if self.ctx.dry {
            tracing::debug!("Running the workflow in fake mode");
        }
        if self.ctx.update {
            tracing::debug!("Running the workflow in update mode");
        }

        let plan = self.graph.plan()?.clone();
        let indep = self.config.cycles.indep;
        let mut submissions = Vec::new();
        let mut stage_depend: Vec<String> = Vec::new();

        for stage in Stage::ALL {
            tracing::debug!("Entering stage: {}", stage);
            let sequences = match plan.get(&stage) {
                Some(sequences) if !sequences.is_empty() => sequences,
                _ => {
                    tracing::debug!("No sequence of task. Skipping...");
                    continue;
                }
            };
            if stage == Stage::Cycles {
                self.log_cycles();
            }

            let mut stage_jobs: Vec<String> = Vec::new();
            let mut sequence_depend = stage_depend.clone();
            for cycle in self.cycle_indices(stage) {
                if let Some(c) = cycle.and_then(|i| self.cycles.get(i)) {
                    tracing::debug!("Running cycle: {}", c.label);
                }
                if stage == Stage::Cycles && indep {
                    sequence_depend = stage_depend.clone();
                }

                let mut sequence_jobs: Vec<String> = Vec::new();
                for sequence in sequences {
                    if sequence.groups.is_empty() {
                        continue;
                    }
                    tracing::debug!("Entering sequence: {}", sequence.name);

                    sequence_jobs = Vec::new();
                    for group in &sequence.groups {
                        let mut task_depend = sequence_depend.clone();
                        for task in group {
                            let mut task_jobs = Vec::new();
                            for member in self.member_indices(task) {
                                let slot = Slot {
                                    task: task.clone(),
                                    cycle,
                                    member,
                                };
                                if let Some(jobid) = self.submit_slot(&slot, &task_depend)? {
                                    submissions.push(Submission {
                                        slot,
                                        jobid: jobid.clone(),
                                        depend: task_depend.clone(),
                                    });
                                    task_jobs.push(jobid);
                                }
                            }
                            task_depend = task_jobs;
                        }
                        sequence_jobs.extend(task_depend);
                    }
                    sequence_depend = sequence_jobs.clone();
                }

                if stage == Stage::Cycles && indep {
                    stage_jobs.extend(sequence_jobs);
                } else {
                    stage_jobs = sequence_jobs;
                }
                match cycle.and_then(|i| self.cycles.get(i)) {
                    Some(c) => tracing::info!("Successfully submitted cycle: {}", c.label),
                    None => tracing::info!("Successfully submitted stage: {}", stage),
                }
            }
            stage_depend = stage_jobs;
        }
        Ok(submissions)
    }

    /// Status of every slot, optionally only the running ones.
    pub fn statuses(&mut self, running: bool) -> Result<Vec<SlotStatus>> {
        let mut rows = Vec::new();
        for slot in self.slots()? {
            let status = self.status_or_unknown(&slot)?;
            if running && !status.is_running() {
                continue;
            }
            let submission_dir = self.submission_dir(&slot);
            rows.push(SlotStatus {
                status,
                cycle: self.cycle(&slot).map(|c| c.token.clone()),
                member: self.member(&slot).map(|m| m.rank.clone()),
                submission_dir: submission_dir
                    .strip_prefix(&self.ctx.workflow_dir)
                    .map(Path::to_path_buf)
                    .unwrap_or(submission_dir),
                task: slot.task,
            });
        }
        Ok(rows)
    }

    /// Kill the running jobs of the selected slots. Returns the killed job
    /// ids with their task paths.
    pub fn kill(&mut self, filter: &SlotFilter) -> Result<Vec<(String, PathBuf)>> {
        let mut killed = Vec::new();
        for slot in self.select(filter)? {
            let record = self.submission_dir(&slot).join(files::RECORD);
            if !record.exists() {
                continue;
            }
            let mut job = self.manager.load_job(&record)?;
            if !filter.jobids.is_empty() && !filter.jobids.contains(&job.jobid) {
                continue;
            }
            if !self.task_status(&slot)?.is_running() {
                continue;
            }
            let task_path = self.task_path(&slot);
            tracing::debug!("Killing jobid: {} ({})", job.jobid, task_path.display());
            self.manager.kill(&mut job)?;
            tracing::info!("Killed jobid: {} ({})", job.jobid, task_path.display());
            killed.push((job.jobid, task_path));
        }
        if killed.is_empty() {
            tracing::info!("No job to kill");
        }
        Ok(killed)
    }

    pub fn artifacts(&mut self, filter: &SlotFilter) -> Result<Vec<ArtifactEntry>> {
        let mut entries = Vec::new();
        for slot in self.select(filter)? {
            for (name, path) in self.task_artifacts(&slot)? {
                let path = PathBuf::from(path);
                entries.push(ArtifactEntry {
                    task: slot.task.clone(),
                    name,
                    exists: path.exists(),
                    path,
                });
            }
        }
        Ok(entries)
    }

    pub fn run_dirs(&mut self) -> Result<Vec<RunDirEntry>> {
        let mut entries = Vec::new();
        for slot in self.slots()? {
            let run_dir = self.run_dir(&slot)?;
            entries.push(RunDirEntry {
                cycle: self.cycle(&slot).map(|c| c.token.clone()),
                member: self.member(&slot).map(|m| m.rank.clone()),
                task: slot.task,
                run_dir,
            });
        }
        Ok(entries)
    }

    /// Remove working files. Returns how many files or directories were
    /// (or under dry run, would be) removed.
    pub fn clean(&mut self, options: &CleanOptions) -> Result<usize> {
        tracing::debug!("Starting to clean...");
        let mut count = 0;

        for slot in self.slots()? {
            if options.submission_dirs {
                let dir = self.submission_dir(&slot);
                if dir.exists() {
                    remove_path(&dir, options.dry)?;
                    tracing::info!("Removed submission directory: {}", dir.display());
                    count += 1;
                }
            }
            if options.run_dirs {
                if let Some(dir) = self.run_dir(&slot)? {
                    if dir.exists() {
                        remove_path(&dir, options.dry)?;
                        tracing::info!("Removed run directory: {}", dir.display());
                        count += 1;
                    }
                }
            }
            if options.artifacts {
                for (name, path) in self.task_artifacts(&slot)? {
                    let path = PathBuf::from(path);
                    if path.symlink_metadata().is_ok() {
                        remove_path(&path, options.dry)?;
                        tracing::info!("Removed '{}' artifact: {}", name, path.display());
                        count += 1;
                    }
                }
            }
        }

        if options.log_files {
            let log_dir = self.ctx.workflow_dir.join(dirs::LOG);
            let mut logs = list_log_files(&log_dir, LOG_PREFIX)?;
            let link = log_dir.join(LOG_LINK);
            if link.symlink_metadata().is_ok() {
                logs.push(link);
            }
            for log in logs {
                remove_path(&log, options.dry)?;
                tracing::info!("Removed log file: {}", log.display());
                count += 1;
            }
        }

        for pattern in &options.extra {
            for path in expand_pattern(&self.ctx.workflow_dir, pattern)? {
                remove_path(&path, options.dry)?;
                tracing::info!("Removed extra path: {}", path.display());
                count += 1;
            }
        }

        if count > 0 {
            tracing::debug!("Removed {} individual file(s) or directories", count);
        } else {
            tracing::debug!("Nothing to remove");
        }
        Ok(count)
    }

    /// Text overview: app, task tree, cycles and ensemble.
    pub fn overview(&self) -> String {
        let mut out = String::new();
        let app = &self.config.app;
        if !app.path_parts().is_empty() {
            let _ = writeln!(out, "{:#^80}", " APP ");
            for (key, value) in [("name", &app.name), ("conf", &app.conf), ("exp", &app.exp)] {
                if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                    let _ = writeln!(out, "{}: {}", key, value);
                }
            }
        }

        let _ = writeln!(out, "{:#^80}", " TASK TREE ");
        let _ = writeln!(out, "{}", self.graph);

        let _ = writeln!(out, "{:#^80}", " CYCLES ");
        if self.cycles.is_empty() {
            let _ = writeln!(out, "No cycle");
        }
        for cycle in &self.cycles {
            let _ = writeln!(out, "{}", cycle.label);
        }

        let _ = writeln!(out, "{:#^80}", " ENSEMBLE ");
        if self.members.is_empty() {
            let _ = writeln!(out, "No member");
        } else {
            let ensemble = &self.config.ensemble;
            let _ = writeln!(out, "size: {}", self.nmembers());
            if let Some(skip) = &ensemble.skip {
                let _ = writeln!(out, "skip: {}", skip);
            }
            let _ = writeln!(out, "tasks: {}", ensemble.tasks.join(", "));
            for (name, values) in &ensemble.iters {
                let values: Vec<String> = values
                    .iter()
                    .map(stagehand_core::model::value_to_env_string)
                    .collect();
                let _ = writeln!(out, "{}: {}", name, values.join(", "));
            }
        }
        out
    }
}

fn remove_path(path: &Path, dry: bool) -> Result<()> {
    tracing::debug!("Removing: {}", path.display());
    if dry {
        return Ok(());
    }
    let is_dir = path
        .symlink_metadata()
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if is_dir {
        fs_err::remove_dir_all(path).map_err(WorkflowError::io(path))
    } else {
        fs_err::remove_file(path).map_err(WorkflowError::io(path))
    }
}

fn is_magic(text: &str) -> bool {
    text.contains(|c: char| matches!(c, '*' | '?' | '['))
}

/// Translate a shell glob into an anchored regex. Wildcards never cross `/`.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '[' => {
                re.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    re.push('^');
                }
                for c in chars.by_ref() {
                    match c {
                        ']' => {
                            re.push(']');
                            break;
                        }
                        '\\' => re.push_str("\\\\"),
                        c => re.push(c),
                    }
                }
            }
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|source| WorkflowError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Paths matching a glob, relative patterns being taken from `root`.
pub fn expand_pattern(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = if Path::new(pattern).is_absolute() {
        PathBuf::from(pattern)
    } else {
        root.join(pattern)
    };
    if !is_magic(pattern) {
        return Ok(if full.symlink_metadata().is_ok() {
            vec![full]
        } else {
            Vec::new()
        });
    }

    let mut base = PathBuf::new();
    let mut depth = 0;
    for component in full.components() {
        if depth == 0 && !is_magic(&component.as_os_str().to_string_lossy()) {
            base.push(component);
        } else {
            depth += 1;
        }
    }
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let regex = glob_to_regex(&full.to_string_lossy())?;
    let mut matches = Vec::new();
    for entry in WalkDir::new(&base).min_depth(depth).max_depth(depth) {
        let entry = entry?;
        if regex.is_match(&entry.path().to_string_lossy()) {
            matches.push(entry.into_path());
        }
    }
    matches.sort();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("/w/out/*.nc").unwrap();
        assert!(re.is_match("/w/out/a.nc"));
        assert!(!re.is_match("/w/out/sub/a.nc"));
        assert!(!re.is_match("/w/out/a.nc4"));

        let re = glob_to_regex("run_?.[!t]xt").unwrap();
        assert!(re.is_match("run_1.sxt"));
        assert!(!re.is_match("run_1.txt"));

        assert!(glob_to_regex("bad[").is_err());
    }

    #[test]
    fn test_expand_pattern() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("out/sub")).unwrap();
        std::fs::write(dir.path().join("out/a.nc"), "").unwrap();
        std::fs::write(dir.path().join("out/b.nc"), "").unwrap();
        std::fs::write(dir.path().join("out/c.txt"), "").unwrap();
        std::fs::write(dir.path().join("out/sub/d.nc"), "").unwrap();

        let found = expand_pattern(dir.path(), "out/*.nc").unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("out/a.nc"), dir.path().join("out/b.nc")]
        );

        let found = expand_pattern(dir.path(), "*/sub").unwrap();
        assert_eq!(found, vec![dir.path().join("out/sub")]);

        let found = expand_pattern(dir.path(), "out/c.txt").unwrap();
        assert_eq!(found, vec![dir.path().join("out/c.txt")]);

        assert!(expand_pattern(dir.path(), "missing/*").unwrap().is_empty());
    }

    #[test]
    fn test_remove_path_dry() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, "").unwrap();
        remove_path(&file, true).unwrap();
        assert!(file.exists());
        remove_path(&file, false).unwrap();
        assert!(!file.exists());
        remove_path(dir.path(), false).unwrap();
        assert!(!dir.path().exists());
    }
}
