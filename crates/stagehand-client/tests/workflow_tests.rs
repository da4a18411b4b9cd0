use stagehand_client::workflow::{CleanOptions, SlotFilter};
use stagehand_client::{Job, JobStatusKind, RunContext, Slot, WorkflowEngine, WorkflowError};
use stagehand_core::config::WorkflowConfig;
use stagehand_core::model::SchedulerType;
use stagehand_test_utils::{
    slurm_dependencies, slurm_job_name, FakeHost, RecordingRunner, StaticTask, StaticTaskManager,
    TestContext,
};
use std::fs;
use std::time::{Duration, Instant};

const CYCLING: &str = r#"
[cycles]
begin_date = "2025-01-01"
end_date = "2025-01-03"
freq = "1D"

[[stages.prolog]]
name = "init"
tasks = ["A"]

[[stages.cycles]]
name = "run"
tasks = ["B"]

[[stages.epilog]]
name = "post"
tasks = ["C"]
"#;

const C1: &str = "2025-01-01-2025-01-02";
const C2: &str = "2025-01-02-2025-01-03";

fn engine_with(
    ctx: &TestContext,
    scheduler: SchedulerType,
    runner: &RecordingRunner,
    tasks: StaticTaskManager,
    dry: bool,
) -> WorkflowEngine {
    let config = WorkflowConfig::load(&ctx.path("workflow.toml")).unwrap();
    let run_ctx = RunContext {
        dry,
        workflow_dir: ctx.workflow_dir.clone(),
        ..Default::default()
    };
    WorkflowEngine::new(
        config,
        run_ctx,
        Box::new(tasks),
        Box::new(FakeHost::new(scheduler, runner)),
    )
    .unwrap()
}

fn slurm_engine(ctx: &TestContext, runner: &RecordingRunner) -> WorkflowEngine {
    engine_with(
        ctx,
        SchedulerType::Slurm,
        runner,
        StaticTaskManager::trivial(&["A", "B", "C", "W", "X", "Y", "M"]),
        false,
    )
}

#[test]
fn test_dependent_cycles_chain() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    let mut engine = slurm_engine(&ctx, &runner);

    let submitted = engine.run().unwrap();
    let ids: Vec<&str> = submitted.iter().map(|s| s.jobid.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);

    assert!(submitted[0].depend.is_empty());
    assert_eq!(submitted[1].depend, vec!["1"]);
    // cycle 2 starts from cycle 1's B, not from A
    assert_eq!(submitted[2].depend, vec!["2"]);
    // the epilog follows the last cycle only
    assert_eq!(submitted[3].depend, vec!["3"]);

    let sbatch = runner.calls_to("sbatch");
    assert_eq!(sbatch.len(), 4);
    assert_eq!(slurm_job_name(&sbatch[2]), Some("B"));
    assert_eq!(slurm_dependencies(&sbatch[2]), vec!["2"]);

    let record = ctx.path(&format!("jobs/{}/B/job.json", C2));
    let job = Job::load(&record).unwrap();
    assert_eq!(job.jobid, "3");
    assert_eq!(job.manager, "slurm");
    assert_eq!(job.status, JobStatusKind::Pending);
}

#[test]
fn test_independent_cycles_fan_out() {
    let ctx = TestContext::with_workflow(&CYCLING.replace("freq = \"1D\"", "freq = \"1D\"\nindep = true"));
    let runner = RecordingRunner::new();
    let mut engine = slurm_engine(&ctx, &runner);

    let submitted = engine.run().unwrap();
    assert_eq!(submitted.len(), 4);
    assert_eq!(submitted[1].depend, vec!["1"]);
    assert_eq!(submitted[2].depend, vec!["1"]);
    assert_eq!(submitted[3].slot.task, "C");
    assert_eq!(submitted[3].depend, vec!["2", "3"]);

    let sbatch = runner.calls_to("sbatch");
    assert_eq!(slurm_dependencies(&sbatch[3]), vec!["2", "3"]);
}

#[test]
fn test_groups_and_members() {
    let ctx = TestContext::with_workflow(
        r#"
[ensemble]
size = 3
skip = "2"
tasks = ["M"]

[groups]
g = ["X", "Y"]

[[stages.prolog]]
name = "first"
tasks = ["g", "M"]

[[stages.prolog]]
name = "second"
tasks = ["W"]
"#,
    );
    let runner = RecordingRunner::new();
    let mut engine = slurm_engine(&ctx, &runner);

    let submitted = engine.run().unwrap();
    let tasks: Vec<&str> = submitted.iter().map(|s| s.slot.task.as_str()).collect();
    assert_eq!(tasks, vec!["X", "Y", "M", "M", "W"]);

    assert!(submitted[0].depend.is_empty());
    assert_eq!(submitted[1].depend, vec!["1"]);
    assert!(submitted[2].depend.is_empty());
    assert!(submitted[3].depend.is_empty());
    assert_eq!(submitted[4].depend, vec!["2", "3", "4"]);

    assert!(ctx.path("jobs/M/member1/job.sh").exists());
    assert!(ctx.path("jobs/M/member3/job.sh").exists());
    assert!(!ctx.path("jobs/M/member2").exists());

    let script = fs::read_to_string(ctx.path("jobs/M/member3/job.sh")).unwrap();
    assert!(script.contains("export STAGEHAND_MEMBER=\"3\""));
    assert!(script.contains("export STAGEHAND_NMEMBERS=\"3\""));
}

#[test]
fn test_script_environment() {
    let ctx = TestContext::with_workflow(
        &CYCLING.replace("[cycles]", "[app]\nname = \"mars\"\n\n[params]\nresolution = 4\n\n[cycles]"),
    );
    let runner = RecordingRunner::new();
    let mut engine = slurm_engine(&ctx, &runner);
    engine.run().unwrap();

    let first = fs::read_to_string(ctx.path(&format!("jobs/mars/{}/B/job.sh", C1))).unwrap();
    assert!(first.contains("export STAGEHAND_TASK_NAME=\"B\""));
    assert!(first.contains(&format!("export STAGEHAND_TASK_PATH=\"mars/{}/B\"", C1)));
    assert!(first.contains("export STAGEHAND_APP_NAME=\"mars\""));
    assert!(first.contains("export STAGEHAND_RESOLUTION=\"4\""));
    assert!(first.contains("export STAGEHAND_CYCLE_IS_FIRST=\"1\""));
    assert!(first.contains("export STAGEHAND_CYCLE_BEGIN_DATE_NEXT="));
    assert!(!first.contains("_PREV="));

    let second = fs::read_to_string(ctx.path(&format!("jobs/mars/{}/B/job.sh", C2))).unwrap();
    assert!(second.contains("export STAGEHAND_CYCLE_IS_LAST=\"1\""));
    assert!(second.contains("export STAGEHAND_CYCLE_BEGIN_DATE_PREV="));
}

#[test]
fn test_already_running_aborts() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    slurm_engine(&ctx, &runner).run().unwrap();

    runner.reply("1 normal A alice R 0:05 1 node01\n");
    let err = slurm_engine(&ctx, &runner).run().unwrap_err();
    match err {
        WorkflowError::AlreadyRunning { task, jobid } => {
            assert_eq!(task, "A");
            assert_eq!(jobid, "1");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runner.calls_to("sbatch").len(), 4);
    assert_eq!(
        runner.calls_to("squeue")[0],
        vec!["squeue", "--jobs=1", "--noheader"]
    );
}

#[test]
fn test_update_skips_success() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    slurm_engine(&ctx, &runner).run().unwrap();

    fs::write(ctx.path("jobs/A/job.status"), "0\n").unwrap();
    fs::write(ctx.path(&format!("jobs/{}/B/job.status", C1)), "1\n").unwrap();
    fs::write(ctx.path(&format!("jobs/{}/B/job.status", C2)), "0\n").unwrap();
    fs::write(ctx.path("jobs/C/job.status"), "0\n").unwrap();

    let mut engine = slurm_engine(&ctx, &runner);
    engine.set_update(true);
    let submitted = engine.run().unwrap();

    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].slot.cycle, Some(0));
    // skipped slots contribute no dependency
    assert!(submitted[0].depend.is_empty());

    assert!(ctx.path("jobs/A/job.status").exists());
    assert!(!ctx.path(&format!("jobs/{}/B/job.status", C1)).exists());
}

#[test]
fn test_dry_run_has_no_side_effects() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    let mut engine = engine_with(
        &ctx,
        SchedulerType::Slurm,
        &runner,
        StaticTaskManager::trivial(&["A", "B", "C"]),
        true,
    );

    let submitted = engine.run().unwrap();
    assert_eq!(submitted.len(), 4);
    assert_eq!(submitted[1].depend, vec![submitted[0].jobid.clone()]);
    assert_eq!(submitted[2].depend, vec![submitted[1].jobid.clone()]);
    assert!(submitted.iter().all(|s| s.jobid.parse::<u32>().is_ok()));

    assert!(runner.calls().is_empty());
    assert!(!ctx.path("jobs").exists());
}

#[test]
fn test_clean_task_respects_dry_run() {
    let ctx = TestContext::with_workflow(CYCLING);
    for name in ["job.sh", "job.out", "job.err", "job.json", "job.status"] {
        ctx.write_file(&format!("jobs/A/{}", name), "x");
    }
    ctx.write_file("jobs/A/keep.txt", "x");

    let runner = RecordingRunner::new();
    let mut engine = engine_with(
        &ctx,
        SchedulerType::Slurm,
        &runner,
        StaticTaskManager::trivial(&["A", "B", "C"]),
        true,
    );
    let slot = Slot {
        task: "A".into(),
        cycle: None,
        member: None,
    };

    engine.clean_task(&slot).unwrap();
    assert!(ctx.path("jobs/A/job.sh").exists());
    assert!(ctx.path("jobs/A/job.status").exists());

    engine.set_dry(false);
    engine.clean_task(&slot).unwrap();
    for name in ["job.sh", "job.out", "job.err", "job.json", "job.status"] {
        assert!(!ctx.path(&format!("jobs/A/{}", name)).exists(), "{}", name);
    }
    assert!(ctx.path("jobs/A/keep.txt").exists());
}

#[test]
fn test_statuses() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    let mut engine = slurm_engine(&ctx, &runner);
    engine.run().unwrap();

    fs::write(ctx.path("jobs/A/job.status"), "0").unwrap();
    fs::write(
        ctx.path(&format!("jobs/{}/B/job.err", C1)),
        "slurmstepd: error: *** JOB 2 CANCELLED AT 2025-01-01T10:00:00 DUE TO TIME LIMIT ***\n",
    )
    .unwrap();
    runner.reply("3 normal B alice R 12:01 1 node01\n");
    runner.reply("4 normal C alice PD 0:00 1 (Dependency)\n");

    let rows = engine.statuses(false).unwrap();
    let kinds: Vec<JobStatusKind> = rows.iter().map(|r| r.status.kind).collect();
    assert_eq!(
        kinds,
        vec![
            JobStatusKind::Success,
            JobStatusKind::Failed,
            JobStatusKind::Running,
            JobStatusKind::Pending,
        ]
    );
    assert_eq!(rows[2].status.jobid, "3");
    assert_eq!(rows[2].cycle.as_deref(), Some(C2));
    assert_eq!(
        rows[2].submission_dir,
        std::path::PathBuf::from(format!("jobs/{}/B", C2))
    );

    let job = Job::load(&ctx.path(&format!("jobs/{}/B/job.json", C2))).unwrap();
    assert_eq!(job.status, JobStatusKind::Running);
    assert_eq!(job.realqueue.as_deref(), Some("normal"));
    assert_eq!(job.elapsed(), "00h12");

    runner.reply("3 normal B alice R 12:30 1 node01\n");
    runner.reply("4 normal C alice PD 0:00 1 (Dependency)\n");
    let running = engine.statuses(true).unwrap();
    assert_eq!(running.len(), 2);
    assert_eq!(running[0].task, "B");
}

#[test]
fn test_status_errors_degrade_to_unknown() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    let mut engine = slurm_engine(&ctx, &runner);
    engine.run().unwrap();

    runner.fail(1, "slurm_load_jobs error: Invalid job id specified");
    let rows = engine.statuses(false).unwrap();
    assert_eq!(rows[0].status.kind, JobStatusKind::Unknown);
}

#[test]
fn test_run_aborts_when_status_query_fails() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    slurm_engine(&ctx, &runner).run().unwrap();

    runner.fail(1, "slurm_load_jobs error: Socket timed out on send/recv operation");
    let err = slurm_engine(&ctx, &runner).run().unwrap_err();
    assert!(matches!(err, WorkflowError::Job(_)), "unexpected error: {err}");

    assert_eq!(runner.calls_to("sbatch").len(), 4);
    assert!(ctx.path("jobs/A/job.sh").exists());
    let job = Job::load(&ctx.path("jobs/A/job.json")).unwrap();
    assert_eq!(job.jobid, "1");
}

#[test]
fn test_run_aborts_on_record_of_another_manager() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    slurm_engine(&ctx, &runner).run().unwrap();

    let mut engine = engine_with(
        &ctx,
        SchedulerType::Pbspro,
        &runner,
        StaticTaskManager::trivial(&["A", "B", "C"]),
        false,
    );
    let err = engine.run().unwrap_err();
    assert!(
        err.to_string().contains("Cannot load this job in a pbspro manager"),
        "unexpected error: {err}"
    );

    assert!(runner.calls_to("qsub").is_empty());
    let job = Job::load(&ctx.path("jobs/A/job.json")).unwrap();
    assert_eq!(job.manager, "slurm");
    assert_eq!(job.jobid, "1");
}

#[test]
fn test_member_properties_reach_script() {
    let ctx = TestContext::with_workflow(
        r#"
[ensemble]
size = 2
tasks = ["M"]

[ensemble.iters]
seed = [7, 9]

[[stages.prolog]]
name = "members"
tasks = ["M"]
"#,
    );
    let runner = RecordingRunner::new();
    slurm_engine(&ctx, &runner).run().unwrap();

    let script = fs::read_to_string(ctx.path("jobs/M/member2/job.sh")).unwrap();
    assert!(script.contains("export STAGEHAND_SEED=\"9\""), "{script}");
}

#[test]
fn test_kill_running_job() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    let mut engine = slurm_engine(&ctx, &runner);
    engine.run().unwrap();

    runner.reply("1 normal A alice R 0:05 1 node01\n");
    let killed = engine
        .kill(&SlotFilter {
            task: Some("A".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(killed.len(), 1);
    assert_eq!(killed[0].0, "1");
    assert_eq!(runner.calls_to("scancel"), vec![vec!["scancel", "1"]]);
    assert_eq!(
        Job::load(&ctx.path("jobs/A/job.json")).unwrap().status,
        JobStatusKind::Killed
    );

    // already killed, nothing left to do
    let killed = engine
        .kill(&SlotFilter {
            task: Some("A".into()),
            ..Default::default()
        })
        .unwrap();
    assert!(killed.is_empty());
}

#[test]
fn test_kill_filters_by_jobid() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    let mut engine = slurm_engine(&ctx, &runner);
    engine.run().unwrap();

    runner.reply("3 normal B alice R 0:05 1 node01\n");
    let killed = engine
        .kill(&SlotFilter {
            jobids: vec!["3".into()],
            cycle: Some(C2.into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(killed.len(), 1);
    assert_eq!(killed[0].1, std::path::PathBuf::from(format!("{}/B", C2)));
}

#[test]
fn test_clean_workflow() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    let mut engine = slurm_engine(&ctx, &runner);
    engine.run().unwrap();

    ctx.write_file("log/stagehand_20250101T000000_42.log", "log");
    ctx.write_file("tmp/a.nc", "");
    ctx.write_file("tmp/b.txt", "");

    let options = CleanOptions {
        extra: vec!["tmp/*.nc".into()],
        dry: true,
        ..Default::default()
    };
    assert_eq!(engine.clean(&options).unwrap(), 4 + 1 + 1);
    assert!(ctx.path("jobs/A").exists());
    assert!(ctx.path("tmp/a.nc").exists());

    let options = CleanOptions {
        dry: false,
        ..options
    };
    assert_eq!(engine.clean(&options).unwrap(), 6);
    assert!(!ctx.path("jobs/A").exists());
    assert!(!ctx.path(&format!("jobs/{}/B", C1)).exists());
    assert!(!ctx.path("log/stagehand_20250101T000000_42.log").exists());
    assert!(!ctx.path("tmp/a.nc").exists());
    assert!(ctx.path("tmp/b.txt").exists());

    assert_eq!(engine.clean(&options).unwrap(), 0);
}

#[test]
fn test_artifacts_listing() {
    let ctx = TestContext::with_workflow(CYCLING);
    let out = ctx.scratch().join("a.out");
    fs::write(&out, "").unwrap();
    let mut task = StaticTask::new("A", "true");
    task.artifacts
        .insert("result".into(), out.display().to_string());
    task.artifacts
        .insert("missing".into(), "/nonexistent/file".into());
    let tasks = StaticTaskManager::trivial(&["B", "C"]).with(task);

    let runner = RecordingRunner::new();
    let mut engine = engine_with(&ctx, SchedulerType::Slurm, &runner, tasks, false);
    let entries = engine
        .artifacts(&SlotFilter {
            task: Some("A".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "missing");
    assert!(!entries[0].exists);
    assert_eq!(entries[1].path, out);
    assert!(entries[1].exists);

    engine.run().unwrap();
    let job = Job::load(&ctx.path("jobs/A/job.json")).unwrap();
    assert_eq!(job.artifacts.get("result"), Some(&out.display().to_string()));
}

#[test]
fn test_unknown_task_fails_submission() {
    let ctx = TestContext::with_workflow(CYCLING);
    let runner = RecordingRunner::new();
    let mut engine = engine_with(
        &ctx,
        SchedulerType::Slurm,
        &runner,
        StaticTaskManager::trivial(&["A"]),
        false,
    );
    let err = engine.run().unwrap_err();
    assert!(matches!(err, WorkflowError::Graph(_)), "{err}");
    assert_eq!(runner.calls_to("sbatch").len(), 1);
}

#[test]
fn test_duplicate_task_rejected() {
    let ctx = TestContext::with_workflow(&CYCLING.replace("tasks = [\"C\"]", "tasks = [\"A\"]"));
    let config = WorkflowConfig::load(&ctx.path("workflow.toml")).unwrap();
    let runner = RecordingRunner::new();
    let result = WorkflowEngine::new(
        config,
        RunContext {
            workflow_dir: ctx.workflow_dir.clone(),
            ..Default::default()
        },
        Box::new(StaticTaskManager::trivial(&["A", "B"])),
        Box::new(FakeHost::new(SchedulerType::Slurm, &runner)),
    );
    assert!(matches!(result, Err(WorkflowError::Graph(_))));
}

#[test]
fn test_background_end_to_end() {
    let ctx = TestContext::with_workflow(
        r#"
[[stages.prolog]]
name = "first"
tasks = ["A"]

[[stages.prolog]]
name = "second"
tasks = ["B"]
"#,
    );
    let tasks = StaticTaskManager::new()
        .with(StaticTask::new("A", "echo hello > a.txt"))
        .with(StaticTask::new("B", "cat ../A/a.txt > b.txt"));
    let runner = RecordingRunner::new();
    let mut engine = engine_with(&ctx, SchedulerType::Background, &runner, tasks, false);

    let submitted = engine.run().unwrap();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[1].depend, vec![submitted[0].jobid.clone()]);

    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let rows = engine.statuses(false).unwrap();
        if rows.iter().all(|r| r.status.kind == JobStatusKind::Success) {
            break;
        }
        assert!(Instant::now() < deadline, "jobs did not finish: {rows:?}");
        std::thread::sleep(Duration::from_millis(100));
    }

    assert_eq!(
        fs::read_to_string(ctx.path("jobs/B/b.txt")).unwrap(),
        "hello\n"
    );
    assert!(runner.calls().is_empty());
}
