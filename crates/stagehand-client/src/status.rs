use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::JobError;

/// Lifecycle state of a job.
///
/// Negative values are not running, zero is unknown and positive values
/// are in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatusKind {
    Failed = -6,
    Error = -5,
    Success = -4,
    Killed = -3,
    NotSubmitted = -2,
    Finished = -1,
    Unknown = 0,
    Pending = 1,
    Running = 2,
    InQueue = 3,
    Exiting = 4,
    Completing = 5,
}

impl JobStatusKind {
    pub const ALL: [JobStatusKind; 12] = [
        JobStatusKind::Failed,
        JobStatusKind::Error,
        JobStatusKind::Success,
        JobStatusKind::Killed,
        JobStatusKind::NotSubmitted,
        JobStatusKind::Finished,
        JobStatusKind::Unknown,
        JobStatusKind::Pending,
        JobStatusKind::Running,
        JobStatusKind::InQueue,
        JobStatusKind::Exiting,
        JobStatusKind::Completing,
    ];

    pub fn value(&self) -> i8 {
        *self as i8
    }

    pub fn is_running(&self) -> bool {
        self.value() > 0
    }

    pub fn is_not_running(&self) -> bool {
        self.value() < 0
    }

    pub fn is_unknown(&self) -> bool {
        self.value() == 0
    }

    pub fn is_killed(&self) -> bool {
        *self == JobStatusKind::Killed
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatusKind::Failed => "FAILED",
            JobStatusKind::Error => "ERROR",
            JobStatusKind::Success => "SUCCESS",
            JobStatusKind::Killed => "KILLED",
            JobStatusKind::NotSubmitted => "NOTSUBMITTED",
            JobStatusKind::Finished => "FINISHED",
            JobStatusKind::Unknown => "UNKNOWN",
            JobStatusKind::Pending => "PENDING",
            JobStatusKind::Running => "RUNNING",
            JobStatusKind::InQueue => "INQUEUE",
            JobStatusKind::Exiting => "EXITING",
            JobStatusKind::Completing => "COMPLETING",
        }
    }
}

impl fmt::Display for JobStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatusKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        JobStatusKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == upper)
            .ok_or_else(|| JobError::UnknownStatus(s.to_string()))
    }
}

/// A status observation bound to a job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub kind: JobStatusKind,
    pub jobid: String,
}

impl JobStatus {
    pub fn new(kind: JobStatusKind, jobid: impl Into<String>) -> Self {
        Self {
            kind,
            jobid: jobid.into(),
        }
    }

    pub fn not_submitted() -> Self {
        Self::new(JobStatusKind::NotSubmitted, "")
    }

    pub fn is_running(&self) -> bool {
        self.kind.is_running()
    }

    pub fn is_not_running(&self) -> bool {
        self.kind.is_not_running()
    }

    pub fn is_unknown(&self) -> bool {
        self.kind.is_unknown()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())
    }
}

/// One row of scheduler status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusObservation {
    pub jobid: String,
    pub queue: Option<String>,
    pub name: Option<String>,
    pub time: Option<Duration>,
    pub status: JobStatusKind,
}

/// What can be handed to `Job::set_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Kind(JobStatusKind),
    Observation(StatusObservation),
}

impl From<JobStatusKind> for StatusUpdate {
    fn from(kind: JobStatusKind) -> Self {
        StatusUpdate::Kind(kind)
    }
}

impl From<StatusObservation> for StatusUpdate {
    fn from(observation: StatusObservation) -> Self {
        StatusUpdate::Observation(observation)
    }
}

impl TryFrom<&str> for StatusUpdate {
    type Error = JobError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Ok(StatusUpdate::Kind(name.parse()?))
    }
}
