use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Cannot load this job in a {expected} manager: {path}")]
    ManagerMismatch {
        expected: String,
        found: String,
        path: PathBuf,
    },

    #[error("Command '{command}' failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to parse {what} from scheduler output: '{output}'")]
    Parse { what: String, output: String },

    #[error("Unknown job status '{0}'")]
    UnknownStatus(String),

    #[error("I/O error on path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid job record '{path}': {source}")]
    Record {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] stagehand_core::errors::ConfigError),

    #[error(transparent)]
    Graph(#[from] stagehand_core::errors::GraphError),

    #[error(transparent)]
    Host(#[from] stagehand_core::errors::HostError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Can't run task '{task}' that is already running. Aborting...\nRun 'stagehand kill --jobid {jobid}' to kill the associated job before re-running.")]
    AlreadyRunning { task: String, jobid: String },

    #[error("Task submission aborted: {0}. Stopping workflow...")]
    SubmissionAborted(String),

    #[error("Failed to render task '{task}': {reason}")]
    Render { task: String, reason: String },

    #[error("I/O error on path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
}

impl WorkflowError {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| WorkflowError::Io { path, source }
    }
}

impl JobError {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| JobError::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
