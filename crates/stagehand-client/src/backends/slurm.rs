use crate::command::CommandTable;
use crate::error::JobError;
use crate::status::{JobStatusKind, StatusObservation};

use super::{parse_elapsed, ClockPair};

pub const SUBMIT: CommandTable = CommandTable {
    program: "sbatch",
    fragments: &[
        ("name", &["-J", "{}"]),
        ("queue", &["-p", "{}"]),
        ("nnodes", &["-N", "{}"]),
        ("ncpus", &["-c", "{}"]),
        ("memory", &["--mem={}"]),
        ("time", &["--time={}"]),
        ("depend", &["--dependency={}"]),
        ("log_out", &["-o", "{}"]),
        ("log_err", &["-e", "{}"]),
        ("mail", &["--mail-type=ALL", "--mail-user={}"]),
        ("extra", &["{}"]),
        ("script", &["{}"]),
    ],
};

pub const STATUS: CommandTable = CommandTable {
    program: "squeue",
    fragments: &[
        ("jobid", &["--jobs={}"]),
        ("queue", &["--partition={}"]),
        ("name", &["--name={}"]),
        ("users", &["--users={}"]),
        ("noheader", &["--noheader"]),
    ],
};

pub const DELETE: CommandTable = CommandTable {
    program: "scancel",
    fragments: &[("jobid", &["{}"])],
};

pub const FAILURE_MARKERS: &[&[&str]] = &[&["DUE TO TIME LIMIT"]];

pub fn status_kind(code: &str) -> JobStatusKind {
    match code {
        "R" => JobStatusKind::Running,
        "PD" => JobStatusKind::Pending,
        "CD" => JobStatusKind::Finished,
        "CG" => JobStatusKind::Completing,
        _ => JobStatusKind::Unknown,
    }
}

/// `afterok:1,afterok:2`
pub fn depend_value(jobids: &[String]) -> String {
    jobids
        .iter()
        .map(|id| format!("afterok:{}", id))
        .collect::<Vec<_>>()
        .join(",")
}

/// The job id is the last word of `Submitted batch job 1234`.
pub fn parse_submit(stdout: &str) -> Result<String, JobError> {
    stdout
        .split_whitespace()
        .last()
        .map(str::to_string)
        .ok_or_else(|| JobError::Parse {
            what: "job id".to_string(),
            output: stdout.to_string(),
        })
}

/// Parse `squeue --noheader` lines:
/// `JOBID PARTITION NAME USER ST TIME NODES NODELIST(REASON)`.
pub fn parse_status(stdout: &str) -> Result<Vec<StatusObservation>, JobError> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 6 {
                return Err(JobError::Parse {
                    what: "squeue line".to_string(),
                    output: line.to_string(),
                });
            }
            Ok(StatusObservation {
                jobid: cols[0].to_string(),
                queue: Some(cols[1].to_string()),
                name: Some(cols[2].to_string()),
                time: parse_elapsed(cols[5], ClockPair::MinutesSeconds),
                status: status_kind(cols[4]),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOptions;
    use chrono::Duration;

    #[test]
    fn test_submit_command() {
        let mut opts = CommandOptions::new();
        opts.insert("script", "/w/jobs/run/job.sh".into());
        opts.insert("name", "run".into());
        opts.insert("memory", "4G".into());
        opts.insert("depend", depend_value(&["11".into(), "12".into()]).into());
        opts.insert("mail", "me@x.org".into());
        assert_eq!(
            SUBMIT.build(&opts),
            vec![
                "sbatch",
                "-J",
                "run",
                "--mem=4G",
                "--dependency=afterok:11,afterok:12",
                "--mail-type=ALL",
                "--mail-user=me@x.org",
                "/w/jobs/run/job.sh"
            ]
        );
    }

    #[test]
    fn test_status_command() {
        let mut opts = CommandOptions::new();
        opts.insert("noheader", "".into());
        opts.insert("users", "alice".into());
        opts.insert("queue", "normal".into());
        opts.insert("jobid", "11,12".into());
        assert_eq!(
            STATUS.build(&opts),
            vec![
                "squeue",
                "--jobs=11,12",
                "--partition=normal",
                "--users=alice",
                "--noheader"
            ]
        );

        opts.remove("users");
        opts.remove("queue");
        opts.insert("name", "forecast".into());
        assert_eq!(
            STATUS.build(&opts),
            vec!["squeue", "--jobs=11,12", "--name=forecast", "--noheader"]
        );
    }

    #[test]
    fn test_parse_submit() {
        assert_eq!(parse_submit("Submitted batch job 4242\n").unwrap(), "4242");
        assert!(parse_submit("   ").is_err());
    }

    #[test]
    fn test_running_line() {
        let obs = parse_status("  4242   normal  forecast  alice  R  1:02:03  1 node01\n").unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].jobid, "4242");
        assert_eq!(obs[0].status, JobStatusKind::Running);
        assert_eq!(obs[0].queue.as_deref(), Some("normal"));
        assert_eq!(obs[0].time, Some(Duration::seconds(3723)));
    }

    #[test]
    fn test_codes() {
        assert_eq!(status_kind("PD"), JobStatusKind::Pending);
        assert_eq!(status_kind("CD"), JobStatusKind::Finished);
        assert_eq!(status_kind("CG"), JobStatusKind::Completing);
        assert_eq!(status_kind("ZZ"), JobStatusKind::Unknown);
    }

    #[test]
    fn test_short_line_is_error() {
        assert!(parse_status("4242 normal\n").is_err());
        assert!(parse_status("").unwrap().is_empty());
    }
}
