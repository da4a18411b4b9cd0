use clap::{Args, Parser, Subcommand};
use stagehand_core::config::Overrides;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stagehand",
    author,
    version,
    about = "Submit staged, cycling and ensemble workflows to batch schedulers.",
    long_about = "This tool reads a workflow directory (workflow.toml, tasks.toml and hosts.toml) and submits its tasks as dependent jobs to the background, Slurm or PBS Pro scheduler."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, default_value = ".")]
    pub workflow_dir: PathBuf,

    #[arg(
        long,
        global = true,
        help = "The host to run on (must be defined in hosts.toml). Defaults to 'local'."
    )]
    pub host: Option<String>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity level (-v for debug, -vv for trace)")]
    pub verbose: u8,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args, Default)]
pub struct OverrideArgs {
    #[arg(long, global = true, help = "Override the application name")]
    pub app_name: Option<String>,

    #[arg(long, global = true, help = "Override the application configuration")]
    pub app_conf: Option<String>,

    #[arg(long, global = true, help = "Override the application experiment")]
    pub app_exp: Option<String>,

    #[arg(long, global = true, help = "Override the first cycle date")]
    pub begin_date: Option<String>,

    #[arg(long, global = true, help = "Override the last cycle date")]
    pub end_date: Option<String>,

    #[arg(long, global = true, help = "Override the cycling frequency, like '1D' or '6h'")]
    pub freq: Option<String>,

    #[arg(long, global = true, help = "Override the number of cycles")]
    pub ncycles: Option<u32>,
}

impl From<&OverrideArgs> for Overrides {
    fn from(args: &OverrideArgs) -> Self {
        Overrides {
            app_name: args.app_name.clone(),
            app_conf: args.app_conf.clone(),
            app_exp: args.app_exp.clone(),
            begin_date: args.begin_date.clone(),
            end_date: args.end_date.clone(),
            freq: args.freq.clone(),
            ncycles: args.ncycles,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Show the task tree, cycles and ensemble")]
    Show,

    #[command(about = "Submit the workflow")]
    Run(RunArgs),

    #[command(about = "Show the status of every task")]
    Status(StatusArgs),

    #[command(about = "Kill running jobs")]
    Kill(KillArgs),

    #[command(about = "Remove submission directories, logs and other working files")]
    Clean(CleanArgs),

    #[command(about = "List the declared artifacts of every task")]
    Artifacts(SelectArgs),

    #[command(about = "List the run directory of every task")]
    RunDirs,
}

#[derive(Args)]
pub struct RunArgs {
    #[arg(
        long,
        help = "Print what would be submitted without submitting anything"
    )]
    pub dry_run: bool,

    #[arg(long, help = "Skip tasks that already succeeded")]
    pub update: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    #[arg(long, help = "Only show pending and running jobs")]
    pub running: bool,
}

#[derive(Args, Default)]
pub struct SelectArgs {
    #[arg(long, help = "Select by task name")]
    pub task: Option<String>,

    #[arg(long, help = "Select by cycle token or label")]
    pub cycle: Option<String>,

    #[arg(long, help = "Select by ensemble member id")]
    pub member: Option<usize>,
}

#[derive(Args)]
pub struct KillArgs {
    #[arg(long = "jobid", help = "Job id to kill. Can be repeated.")]
    pub jobids: Vec<String>,

    #[command(flatten)]
    pub select: SelectArgs,
}

#[derive(Args)]
pub struct CleanArgs {
    #[arg(long, help = "Only show what would be removed")]
    pub dry_run: bool,

    #[arg(long, help = "Also remove task run directories")]
    pub run_dirs: bool,

    #[arg(long, help = "Also remove task artifacts")]
    pub artifacts: bool,

    #[arg(long, help = "Keep the job submission directories")]
    pub no_submission_dirs: bool,

    #[arg(long, help = "Keep the workflow log files")]
    pub no_log_files: bool,

    #[arg(
        long,
        value_name = "PATTERN",
        help = "Extra glob patterns to remove, relative to the workflow directory. Can be repeated."
    )]
    pub extra: Vec<String>,
}
