use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] stagehand_core::errors::ConfigError),

    #[error(transparent)]
    Graph(#[from] stagehand_core::errors::GraphError),

    #[error(transparent)]
    Host(#[from] stagehand_core::errors::HostError),

    #[error(transparent)]
    Workflow(#[from] stagehand_client::error::WorkflowError),

    #[error(transparent)]
    Job(#[from] stagehand_client::error::JobError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Cannot expand '{value}' of host '{host}': {reason}")]
    Expand {
        host: String,
        value: String,
        reason: String,
    },

    #[error("Workflow directory not found: '{0}'")]
    NoWorkflow(std::path::PathBuf),
}
