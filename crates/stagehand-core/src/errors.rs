use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path '{path}': {source}")]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse configuration file '{path}':\n{source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    General(String),

    #[error("Configuration file not found: '{0}'.")]
    NotFound(PathBuf),

    #[error("Invalid date '{0}'. Expected 'YYYY-MM-DD', 'YYYY-MM-DDTHH:MM[:SS]', RFC 3339, 'now' or 'today'.")]
    InvalidDate(String),

    #[error("Invalid frequency '{0}'. Expected '<n><unit>' with unit one of s, min, h, d, w, MS.")]
    InvalidFrequency(String),

    #[error("Invalid page selection '{0}'. Expected comma separated ids and ranges like '3,5-7,9-'.")]
    InvalidPages(String),

    #[error("Cannot generate cycles: {0}")]
    Cycles(String),

    #[error("Ensemble iterator '{name}' must have a length of {expected}, not {found}.")]
    EnsembleLength {
        name: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate tasks not allowed: {0}")]
    DuplicateTask(String),

    #[error("Invalid task name: {0}")]
    UnknownTask(String),

    #[error("Task '{task}' inherits from unknown task '{parent}'.")]
    UnknownParent { task: String, parent: String },

    #[error("Rendered artifact '{artifact}' of task '{task}' is not absolute and the task run_dir is not defined.")]
    RelativeArtifact { task: String, artifact: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Unknown host '{name}'.\nAvailable hosts: {}", available.join(", "))]
    UnknownHost {
        name: String,
        available: Vec<String>,
    },

    #[error("Invalid environment: {name}. Please choose one of: {}", available.join(", "))]
    UnknownEnvironment {
        name: String,
        available: Vec<String>,
    },
}
