use crate::command::CommandTable;
use crate::error::JobError;
use crate::status::{JobStatusKind, StatusObservation};

use super::{parse_elapsed, ClockPair};

pub const SUBMIT: CommandTable = CommandTable {
    program: "qsub",
    fragments: &[
        ("name", &["-N", "{}"]),
        ("queue", &["-V", "-q", "{}"]),
        ("time", &["-l", "walltime={}"]),
        ("memory", &["-l", "mem={}"]),
        ("log_out", &["-o", "{}"]),
        ("log_err", &["-e", "{}"]),
        ("depend", &["-W", "depend=afterok:{}"]),
        ("mail", &["-M", "{}"]),
        ("extra", &["{}"]),
        ("script", &["{}"]),
    ],
};

pub const STATUS: CommandTable = CommandTable {
    program: "qstat",
    fragments: &[
        ("user", &["-u", "{}"]),
        ("history", &["-x"]),
        ("jobid", &["{}"]),
    ],
};

pub const DELETE: CommandTable = CommandTable {
    program: "qdel",
    fragments: &[("force", &["-W", "force"]), ("jobid", &["{}"])],
};

pub const FAILURE_MARKERS: &[&[&str]] = &[&["PBS: job killed: walltime", "Terminated"]];

const HEADER_LINES: usize = 5;

pub fn status_kind(code: &str) -> JobStatusKind {
    match code {
        "R" => JobStatusKind::Running,
        "Q" => JobStatusKind::InQueue,
        "H" => JobStatusKind::Pending,
        "E" => JobStatusKind::Exiting,
        "F" => JobStatusKind::Finished,
        _ => JobStatusKind::Unknown,
    }
}

/// `11:12`
pub fn depend_value(jobids: &[String]) -> String {
    jobids.join(":")
}

/// The job id is what precedes the server name in `1234.server`.
pub fn parse_submit(stdout: &str) -> Result<String, JobError> {
    let jobid = stdout.trim().split('.').next().unwrap_or_default().trim();
    if jobid.is_empty() {
        return Err(JobError::Parse {
            what: "job id".to_string(),
            output: stdout.to_string(),
        });
    }
    Ok(jobid.to_string())
}

/// Parse `qstat -u <user> -x` output: five header lines, then
/// `JOBID USER QUEUE NAME SESSID NDS TSK MEM REQTIME S ELAPTIME`.
pub fn parse_status(stdout: &str) -> Result<Vec<StatusObservation>, JobError> {
    stdout
        .lines()
        .skip(HEADER_LINES)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 11 {
                return Err(JobError::Parse {
                    what: "qstat line".to_string(),
                    output: line.to_string(),
                });
            }
            Ok(StatusObservation {
                jobid: cols[0].split('.').next().unwrap_or(cols[0]).to_string(),
                queue: Some(cols[2].to_string()),
                name: Some(cols[3].to_string()),
                time: parse_elapsed(cols[10], ClockPair::HoursMinutes),
                status: status_kind(cols[9]),
            })
        })
        .collect()
}
