use std::path::Path;
use std::process::Command;

use crate::error::JobError;

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs scheduler commands. Tests substitute a recording fake.
pub trait CommandRunner: Send + Sync {
    fn run(&self, args: &[String], cwd: Option<&Path>) -> Result<CommandOutput, JobError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, args: &[String], cwd: Option<&Path>) -> Result<CommandOutput, JobError> {
        let (program, rest) = args.split_first().ok_or_else(|| JobError::Spawn {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;
        let mut cmd = Command::new(program);
        cmd.args(rest);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        stagehand_core::logging::log_and_print_command(&cmd);

        let output = cmd.output().map_err(|source| JobError::Spawn {
            command: program.clone(),
            source,
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        if !result.stdout.is_empty() {
            tracing::debug!("{} stdout: {}", program, result.stdout.trim_end());
        }
        if !result.stderr.is_empty() {
            tracing::debug!("{} stderr: {}", program, result.stderr.trim_end());
        }
        Ok(result)
    }
}

/// Run and turn a non-zero exit into a [`JobError::CommandFailed`].
pub fn run_checked(
    runner: &dyn CommandRunner,
    args: &[String],
    cwd: Option<&Path>,
) -> Result<CommandOutput, JobError> {
    let output = runner.run(args, cwd)?;
    if !output.success() {
        return Err(JobError::CommandFailed {
            command: args.join(" "),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}
