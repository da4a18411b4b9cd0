use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::JobError;
use crate::status::{JobStatus, JobStatusKind, StatusUpdate};
use stagehand_core::constants::NO_TIME;

mod elapsed {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn format(time: &Option<Duration>) -> String {
        match time {
            Some(d) => {
                let minutes = d.num_minutes();
                format!("{:02}h{:02}", minutes / 60, minutes % 60)
            }
            None => NO_TIME.to_string(),
        }
    }

    pub fn parse(text: &str) -> Option<Duration> {
        let (hours, minutes) = text.split_once('h')?;
        let hours: i64 = hours.parse().ok()?;
        let minutes: i64 = minutes.parse().ok()?;
        Some(Duration::hours(hours) + Duration::minutes(minutes))
    }

    pub fn serialize<S: Serializer>(time: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let text = Option::<String>::deserialize(d)?;
        Ok(text.as_deref().and_then(parse))
    }
}

pub use elapsed::format as format_elapsed;

/// A persisted record of one submitted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub manager: String,
    pub name: String,
    pub jobid: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub realqueue: Option<String>,
    pub script: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    pub status: JobStatusKind,
    #[serde(default, with = "elapsed")]
    pub time: Option<Duration>,
    pub submission_date: String,
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
}

impl Job {
    pub fn new(
        manager: &str,
        name: &str,
        script: &Path,
        args: Vec<String>,
        jobid: String,
        status: JobStatusKind,
    ) -> Self {
        Self {
            manager: manager.to_string(),
            name: name.to_string(),
            jobid,
            queue: None,
            realqueue: None,
            script: script.to_path_buf(),
            args,
            status,
            time: None,
            submission_date: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            artifacts: BTreeMap::new(),
        }
    }

    /// `job.sh` -> `job.json`.
    pub fn record_path(&self) -> PathBuf {
        self.script.with_extension("json")
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::new(self.status, self.jobid.clone())
    }

    pub fn is_killed(&self) -> bool {
        self.status.is_killed()
    }

    pub fn elapsed(&self) -> String {
        elapsed::format(&self.time)
    }

    pub fn load(path: &Path) -> Result<Self, JobError> {
        let content = fs_err::read_to_string(path).map_err(JobError::io(path))?;
        serde_json::from_str(&content).map_err(|source| JobError::Record {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the record next to the script, atomically.
    pub fn dump(&self) -> Result<PathBuf, JobError> {
        let path = self.record_path();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let content = serde_json::to_string_pretty(self).map_err(|source| JobError::Record {
            path: path.clone(),
            source,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(JobError::io(&dir))?;
        tmp.write_all(content.as_bytes())
            .map_err(JobError::io(tmp.path()))?;
        tmp.persist(&path)
            .map_err(|e| JobError::io(&path)(e.error))?;
        Ok(path)
    }

    /// Record a new status and persist the record.
    ///
    /// An unknown observation never replaces a known status.
    pub fn set_status(&mut self, update: impl Into<StatusUpdate>) -> Result<JobStatus, JobError> {
        let kind = match update.into() {
            StatusUpdate::Kind(kind) => kind,
            StatusUpdate::Observation(observation) => {
                if observation.jobid != self.jobid {
                    tracing::warn!(
                        "Status observation for job {} applied to job {}",
                        observation.jobid,
                        self.jobid
                    );
                }
                if observation.queue.is_some() {
                    self.realqueue = observation.queue;
                }
                if observation.time.is_some() {
                    self.time = observation.time;
                }
                observation.status
            }
        };

        if kind.is_unknown() && !self.status.is_unknown() {
            return Ok(self.status());
        }

        self.status = kind;
        self.dump()?;
        Ok(self.status())
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.jobid)
    }
}
