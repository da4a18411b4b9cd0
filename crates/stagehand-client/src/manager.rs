use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Child;

use crate::backends::{background, pbspro, slurm};
use crate::command::{CommandOptions, OptionValue};
use crate::error::JobError;
use crate::job::Job;
use crate::runner::{run_checked, CommandRunner, SystemRunner};
use crate::status::{JobStatus, JobStatusKind, StatusObservation};
use stagehand_core::model::SchedulerType;

/// Abstract scheduler options of one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub queue: Option<String>,
    pub memory: Option<String>,
    pub time: Option<String>,
    pub mail: Vec<String>,
    pub nnodes: Option<String>,
    pub ncpus: Option<String>,
    pub extra: Vec<String>,
}

/// Everything needed to submit one script.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub name: String,
    pub script: PathBuf,
    pub options: SchedulerOptions,
    pub depend: Vec<String>,
    pub artifacts: BTreeMap<String, String>,
}

/// Submits, tracks and deletes jobs on one scheduler backend.
pub struct JobManager {
    scheduler: SchedulerType,
    runner: Box<dyn CommandRunner>,
    jobs: Vec<Job>,
    children: HashMap<String, Child>,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("scheduler", &self.scheduler)
            .field("jobs", &self.jobs.len())
            .finish()
    }
}

impl JobManager {
    pub fn new(scheduler: SchedulerType) -> Self {
        Self::with_runner(scheduler, Box::new(SystemRunner))
    }

    pub fn with_runner(scheduler: SchedulerType, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            scheduler,
            runner,
            jobs: Vec::new(),
            children: HashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.scheduler.as_str()
    }

    pub fn scheduler(&self) -> SchedulerType {
        self.scheduler
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get_job(&self, jobid: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.jobid == jobid)
    }

    /// Marker groups that flag a job killed by the scheduler in its logs.
    pub fn failure_markers(&self) -> &'static [&'static [&'static str]] {
        match self.scheduler {
            SchedulerType::Background => &[],
            SchedulerType::Slurm => slurm::FAILURE_MARKERS,
            SchedulerType::Pbspro => pbspro::FAILURE_MARKERS,
        }
    }

    fn register(&mut self, job: Job) {
        match self.jobs.iter_mut().find(|known| known.jobid == job.jobid) {
            Some(known) => *known = job,
            None => self.jobs.push(job),
        }
    }

    /// Load a job record written by this backend.
    pub fn load_job(&mut self, path: &std::path::Path) -> Result<Job, JobError> {
        let job = Job::load(path)?;
        if job.manager != self.name() {
            return Err(JobError::ManagerMismatch {
                expected: self.name().to_string(),
                found: job.manager,
                path: path.to_path_buf(),
            });
        }
        self.register(job.clone());
        Ok(job)
    }

    /// The command line `submit` would run for this request.
    pub fn submission_command(&self, request: &SubmitRequest) -> Vec<String> {
        let script = request.script.display().to_string();
        let mut opts = CommandOptions::new();
        opts.insert("script", script.into());

        let table = match self.scheduler {
            SchedulerType::Background => return background::SUBMIT.build(&opts),
            SchedulerType::Slurm => slurm::SUBMIT,
            SchedulerType::Pbspro => pbspro::SUBMIT,
        };

        let options = &request.options;
        opts.insert("name", request.name.as_str().into());
        let optional = [
            ("queue", &options.queue),
            ("memory", &options.memory),
            ("time", &options.time),
            ("nnodes", &options.nnodes),
            ("ncpus", &options.ncpus),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                opts.insert(key, value.as_str().into());
            }
        }
        if !options.mail.is_empty() {
            opts.insert("mail", OptionValue::List(options.mail.clone()));
        }
        if !options.extra.is_empty() {
            opts.insert("extra", OptionValue::List(options.extra.clone()));
        }
        if !request.depend.is_empty() {
            let depend = match self.scheduler {
                SchedulerType::Pbspro => pbspro::depend_value(&request.depend),
                _ => slurm::depend_value(&request.depend),
            };
            opts.insert("depend", depend.into());
        }
        opts.insert(
            "log_out",
            request.script.with_extension("out").display().to_string().into(),
        );
        opts.insert(
            "log_err",
            request.script.with_extension("err").display().to_string().into(),
        );

        table.build(&opts)
    }

    /// Submit a script and persist the new job record.
    ///
    /// Returns `None` when a background dependency failed, in which case
    /// nothing was started.
    pub fn submit(&mut self, request: &SubmitRequest) -> Result<Option<Job>, JobError> {
        let args = self.submission_command(request);

        let (jobid, status) = match self.scheduler {
            SchedulerType::Background => {
                for dependency in &request.depend {
                    if let Some(code) = self.wait(dependency)? {
                        if code != 0 {
                            tracing::warn!(
                                "Dependency {} of '{}' exited with code {}",
                                dependency,
                                request.name,
                                code
                            );
                            return Ok(None);
                        }
                    }
                }
                let child = background::spawn(&args, &request.script)?;
                let jobid = child.id().to_string();
                self.children.insert(jobid.clone(), child);
                (jobid, JobStatusKind::Running)
            }
            SchedulerType::Slurm => {
                let output = run_checked(self.runner.as_ref(), &args, request.script.parent())?;
                (slurm::parse_submit(&output.stdout)?, JobStatusKind::Pending)
            }
            SchedulerType::Pbspro => {
                let output = run_checked(self.runner.as_ref(), &args, request.script.parent())?;
                (pbspro::parse_submit(&output.stdout)?, JobStatusKind::Pending)
            }
        };

        let mut job = Job::new(self.name(), &request.name, &request.script, args, jobid, status);
        job.queue = request.options.queue.clone();
        job.artifacts = request.artifacts.clone();
        job.dump()?;
        tracing::info!("Submitted '{}' as job {}", job.name, job.jobid);

        self.register(job.clone());
        Ok(Some(job))
    }

    fn status_command(&self, jobid: &str) -> Vec<String> {
        let mut opts = CommandOptions::new();
        opts.insert("jobid", jobid.into());
        match self.scheduler {
            SchedulerType::Background => vec![],
            SchedulerType::Slurm => {
                opts.insert("noheader", "".into());
                slurm::STATUS.build(&opts)
            }
            SchedulerType::Pbspro => {
                if let Some(user) = current_user() {
                    opts.insert("user", user.into());
                }
                opts.insert("history", "".into());
                pbspro::STATUS.build(&opts)
            }
        }
    }

    /// Probe the live status of a job without touching its record.
    pub fn query_status(&mut self, job: &Job) -> Result<StatusObservation, JobError> {
        let unknown = StatusObservation {
            jobid: job.jobid.clone(),
            queue: None,
            name: None,
            time: None,
            status: JobStatusKind::Unknown,
        };

        let observations = match self.scheduler {
            SchedulerType::Background => {
                let running = match self.children.get_mut(&job.jobid) {
                    Some(child) => matches!(child.try_wait(), Ok(None)),
                    None => background::is_alive(&job.jobid),
                };
                let status = if running {
                    JobStatusKind::Running
                } else {
                    JobStatusKind::Unknown
                };
                return Ok(StatusObservation { status, ..unknown });
            }
            SchedulerType::Slurm => {
                let args = self.status_command(&job.jobid);
                let output = run_checked(self.runner.as_ref(), &args, None)?;
                slurm::parse_status(&output.stdout)?
            }
            SchedulerType::Pbspro => {
                let args = self.status_command(&job.jobid);
                let output = run_checked(self.runner.as_ref(), &args, None)?;
                pbspro::parse_status(&output.stdout)?
            }
        };

        Ok(observations
            .into_iter()
            .find(|obs| obs.jobid == job.jobid)
            .unwrap_or(unknown))
    }

    /// Query and record the status of a job. Killed jobs are not queried.
    pub fn get_status(&mut self, job: &mut Job) -> Result<JobStatus, JobError> {
        if job.is_killed() {
            return Ok(job.status());
        }
        let observation = self.query_status(job)?;
        let status = job.set_status(observation)?;
        self.register(job.clone());
        Ok(status)
    }

    pub fn is_running(&mut self, job: &mut Job) -> Result<bool, JobError> {
        Ok(self.get_status(job)?.is_running())
    }

    /// Delete jobs from the scheduler and mark them killed.
    pub fn delete(&mut self, jobs: &mut [Job]) -> Result<(), JobError> {
        if jobs.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = jobs.iter().map(|job| job.jobid.clone()).collect();

        match self.scheduler {
            SchedulerType::Background => {
                for id in &ids {
                    background::terminate(id)?;
                    if let Some(mut child) = self.children.remove(id) {
                        let _ = child.wait();
                    }
                }
            }
            SchedulerType::Slurm => {
                let mut opts = CommandOptions::new();
                opts.insert("jobid", ids.join(",").into());
                run_checked(self.runner.as_ref(), &slurm::DELETE.build(&opts), None)?;
            }
            SchedulerType::Pbspro => {
                let mut opts = CommandOptions::new();
                opts.insert("force", "".into());
                opts.insert("jobid", OptionValue::List(ids.clone()));
                run_checked(self.runner.as_ref(), &pbspro::DELETE.build(&opts), None)?;
            }
        }

        for job in jobs.iter_mut() {
            job.set_status(JobStatusKind::Killed)?;
            tracing::info!("Killed job {} ('{}')", job.jobid, job.name);
            self.register(job.clone());
        }
        Ok(())
    }

    pub fn kill(&mut self, job: &mut Job) -> Result<bool, JobError> {
        self.delete(std::slice::from_mut(job))?;
        Ok(job.is_killed())
    }

    /// Block until a background job exits and return its exit code.
    ///
    /// Batch schedulers and unknown jobs return `None` immediately.
    pub fn wait(&mut self, jobid: &str) -> Result<Option<i32>, JobError> {
        if self.scheduler.is_batch() {
            return Ok(None);
        }
        if let Some(child) = self.children.get_mut(jobid) {
            let status = child.wait().map_err(|source| JobError::Spawn {
                command: format!("wait {}", jobid),
                source,
            })?;
            return Ok(Some(background::exit_code(status)));
        }
        let Some(job) = self.get_job(jobid) else {
            tracing::debug!("Not waiting on unknown job {}", jobid);
            return Ok(None);
        };
        let status_file = job.script.with_extension("status");
        background::wait_foreign(jobid);
        Ok(background::read_exit_status(&status_file))
    }
}

fn current_user() -> Option<String> {
    ["LOGNAME", "USER"]
        .into_iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Default, Clone)]
    struct Scripted {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        replies: Arc<Mutex<Vec<CommandOutput>>>,
    }

    impl Scripted {
        fn reply(self, stdout: &str) -> Self {
            self.replies.lock().unwrap().push(CommandOutput {
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            });
            self
        }

        fn fail(self, stderr: &str) -> Self {
            self.replies.lock().unwrap().push(CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
            });
            self
        }
    }

    impl CommandRunner for Scripted {
        fn run(&self, args: &[String], _cwd: Option<&Path>) -> Result<CommandOutput, JobError> {
            self.calls.lock().unwrap().push(args.to_vec());
            let mut replies = self.replies.lock().unwrap();
            Ok(if replies.is_empty() {
                CommandOutput {
                    code: Some(0),
                    ..Default::default()
                }
            } else {
                replies.remove(0)
            })
        }
    }

    fn request(dir: &Path) -> SubmitRequest {
        let script = dir.join("job.sh");
        std::fs::write(&script, "true\n").unwrap();
        SubmitRequest {
            name: "forecast".into(),
            script,
            options: SchedulerOptions {
                queue: Some("normal".into()),
                time: Some("01:00:00".into()),
                ..Default::default()
            },
            depend: vec!["11".into(), "12".into()],
            artifacts: BTreeMap::from([("out".into(), "/data/out.nc".into())]),
        }
    }

    #[test]
    fn test_slurm_submit() {
        let dir = tempdir().unwrap();
        let runner = Scripted::default().reply("Submitted batch job 4242\n");
        let mut manager = JobManager::with_runner(SchedulerType::Slurm, Box::new(runner.clone()));

        let job = manager.submit(&request(dir.path())).unwrap().unwrap();
        assert_eq!(job.jobid, "4242");
        assert_eq!(job.status, JobStatusKind::Pending);
        assert_eq!(job.queue.as_deref(), Some("normal"));
        assert!(dir.path().join("job.json").exists());
        assert_eq!(manager.jobs().len(), 1);

        let calls = runner.calls.lock().unwrap();
        let args = &calls[0];
        assert_eq!(args[0], "sbatch");
        assert!(args.contains(&"--dependency=afterok:11,afterok:12".to_string()));
        assert!(args.contains(&"--time=01:00:00".to_string()));
        assert_eq!(args.last().unwrap(), &dir.path().join("job.sh").display().to_string());
    }

    #[test]
    fn test_pbspro_submit_command() {
        let dir = tempdir().unwrap();
        let manager = JobManager::with_runner(SchedulerType::Pbspro, Box::new(Scripted::default()));
        let args = manager.submission_command(&request(dir.path()));
        assert_eq!(&args[..3], &["qsub", "-N", "forecast"]);
        let joined = args.join(" ");
        assert!(joined.contains("-V -q normal"));
        assert!(joined.contains("-l walltime=01:00:00"));
        assert!(joined.contains("-W depend=afterok:11:12"));
    }

    #[test]
    fn test_submit_failure_carries_stderr() {
        let dir = tempdir().unwrap();
        let runner = Scripted::default().fail("sbatch: error: invalid partition");
        let mut manager = JobManager::with_runner(SchedulerType::Slurm, Box::new(runner));
        match manager.submit(&request(dir.path())) {
            Err(JobError::CommandFailed { stderr, .. }) => {
                assert_eq!(stderr, "sbatch: error: invalid partition")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_slurm_running_status() {
        let dir = tempdir().unwrap();
        let runner = Scripted::default()
            .reply("Submitted batch job 77\n")
            .reply("77 normal forecast alice R 1:05 1 node01\n");
        let mut manager = JobManager::with_runner(SchedulerType::Slurm, Box::new(runner.clone()));
        let mut job = manager.submit(&request(dir.path())).unwrap().unwrap();

        let status = manager.get_status(&mut job).unwrap();
        assert_eq!(status, JobStatus::new(JobStatusKind::Running, "77"));
        assert_eq!(job.realqueue.as_deref(), Some("normal"));
        assert_eq!(
            runner.calls.lock().unwrap()[1],
            vec!["squeue", "--jobs=77", "--noheader"]
        );
    }

    #[test]
    fn test_missing_from_queue_keeps_status() {
        let dir = tempdir().unwrap();
        let runner = Scripted::default().reply("Submitted batch job 77\n").reply("");
        let mut manager = JobManager::with_runner(SchedulerType::Slurm, Box::new(runner));
        let mut job = manager.submit(&request(dir.path())).unwrap().unwrap();
        let status = manager.get_status(&mut job).unwrap();
        assert_eq!(status.kind, JobStatusKind::Pending);
    }

    #[test]
    fn test_delete_marks_killed() {
        let dir = tempdir().unwrap();
        let runner = Scripted::default().reply("1.pbs01\n");
        let mut manager = JobManager::with_runner(SchedulerType::Pbspro, Box::new(runner.clone()));
        let mut job = manager.submit(&request(dir.path())).unwrap().unwrap();
        assert_eq!(job.jobid, "1");

        assert!(manager.kill(&mut job).unwrap());
        assert_eq!(
            Job::load(&job.record_path()).unwrap().status,
            JobStatusKind::Killed
        );
        assert_eq!(runner.calls.lock().unwrap()[1], vec!["qdel", "-W", "force", "1"]);

        // killed jobs are not queried again
        manager.get_status(&mut job).unwrap();
        assert_eq!(runner.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_load_job_checks_manager() {
        let dir = tempdir().unwrap();
        let job = Job::new(
            "slurm",
            "forecast",
            &dir.path().join("job.sh"),
            vec![],
            "1".into(),
            JobStatusKind::Pending,
        );
        let path = job.dump().unwrap();

        let mut pbs = JobManager::new(SchedulerType::Pbspro);
        assert!(matches!(
            pbs.load_job(&path),
            Err(JobError::ManagerMismatch { .. })
        ));
        let mut slurm = JobManager::new(SchedulerType::Slurm);
        assert_eq!(slurm.load_job(&path).unwrap().jobid, "1");
        assert!(slurm.get_job("1").is_some());
    }

    #[test]
    fn test_background_lifecycle() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("job.sh");
        std::fs::write(&script, "echo hello\nexit 3\n").unwrap();
        let mut manager = JobManager::new(SchedulerType::Background);
        let job = manager
            .submit(&SubmitRequest {
                name: "hello".into(),
                script: script.clone(),
                ..Default::default()
            })
            .unwrap()
            .unwrap();
        assert_eq!(job.args, vec!["bash".to_string(), script.display().to_string()]);
        assert_eq!(manager.wait(&job.jobid).unwrap(), Some(3));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("job.out")).unwrap(),
            "hello\n"
        );
    }

    #[test]
    fn test_background_failed_dependency_aborts() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.sh");
        std::fs::write(&first, "exit 1\n").unwrap();
        let mut manager = JobManager::new(SchedulerType::Background);
        let upstream = manager
            .submit(&SubmitRequest {
                name: "a".into(),
                script: first,
                ..Default::default()
            })
            .unwrap()
            .unwrap();

        let second = dir.path().join("b.sh");
        std::fs::write(&second, "touch ran\n").unwrap();
        let downstream = manager
            .submit(&SubmitRequest {
                name: "b".into(),
                script: second,
                depend: vec![upstream.jobid],
                ..Default::default()
            })
            .unwrap();
        assert!(downstream.is_none());
        assert!(!dir.path().join("ran").exists());
    }
}
