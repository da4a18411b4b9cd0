use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use crate::command::CommandTable;
use crate::error::JobError;

pub const SUBMIT: CommandTable = CommandTable {
    program: "bash",
    fragments: &[("script", &["{}"])],
};

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn pid(jobid: &str) -> Option<Pid> {
    jobid.trim().parse::<i32>().ok().filter(|p| *p > 0).map(Pid::from_raw)
}

/// Launch `bash <script>` from the script directory, with output captured
/// next to the script.
pub fn spawn(args: &[String], script: &Path) -> Result<Child, JobError> {
    let stdout_path = script.with_extension("out");
    let stderr_path = script.with_extension("err");
    let stdout = File::create(&stdout_path).map_err(JobError::io(&stdout_path))?;
    let stderr = File::create(&stderr_path).map_err(JobError::io(&stderr_path))?;

    let (program, rest) = args.split_first().ok_or_else(|| JobError::Spawn {
        command: String::new(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
    })?;

    let mut cmd = Command::new(program);
    cmd.args(rest)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .process_group(0);
    if let Some(dir) = script.parent() {
        cmd.current_dir(dir);
    }

    stagehand_core::logging::log_and_print_command(&cmd);

    cmd.spawn().map_err(|source| JobError::Spawn {
        command: args.join(" "),
        source,
    })
}

/// Whether a process with this id exists.
pub fn is_alive(jobid: &str) -> bool {
    match pid(jobid) {
        Some(pid) => !matches!(kill(pid, None), Err(Errno::ESRCH)),
        None => false,
    }
}

/// Send SIGTERM to the job's process group, or to the process alone.
pub fn terminate(jobid: &str) -> Result<(), JobError> {
    let Some(pid) = pid(jobid) else {
        return Ok(());
    };
    let sent = match killpg(pid, Signal::SIGTERM) {
        Err(Errno::ESRCH) => kill(pid, Signal::SIGTERM),
        other => other,
    };
    match sent {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(JobError::CommandFailed {
            command: format!("kill -TERM {}", jobid),
            code: Some(errno as i32),
            stderr: errno.desc().to_string(),
        }),
    }
}

/// Exit code, with signals reported the way shells do.
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

/// Block until a process that is not our child disappears.
pub fn wait_foreign(jobid: &str) {
    while is_alive(jobid) {
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Read an exit status file: a plain integer.
pub fn read_exit_status(path: &Path) -> Option<i32> {
    fs_err::read_to_string(path).ok()?.trim().parse().ok()
}
