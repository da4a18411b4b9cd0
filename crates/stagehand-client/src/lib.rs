pub mod backends;
pub mod command;
pub mod error;
pub mod job;
pub mod manager;
pub mod runner;
pub mod status;
pub mod task;
pub mod workflow;

pub use error::{JobError, Result, WorkflowError};
pub use job::Job;
pub use manager::{JobManager, SchedulerOptions, SubmitRequest};
pub use status::{JobStatus, JobStatusKind};
pub use workflow::{RunContext, Slot, WorkflowEngine};
