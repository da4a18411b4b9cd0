use crate::config::LoggingConfig;
use crate::constants::{dirs, env as env_names};
use crate::errors::ConfigError;
use chrono::{Local, NaiveDate};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_PREFIX: &str = "stagehand_";
pub const LOG_LINK: &str = "stagehand.log";

const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// Level for a number of `-v` flags, starting from `Info`.
    pub fn from_verbosity(verbose: u8) -> Self {
        Self::from_index(verbose.saturating_add(LogLevel::Info as u8))
    }

    fn from_index(index: u8) -> Self {
        match index {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ]
        .into_iter()
        .find(|level| level.directive().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

pub fn set_log_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Read the level from `STAGEHAND_LOG_LEVEL`; unset or unparsable values keep the current one.
pub fn set_log_level_from_env() {
    if let Some(level) = std::env::var(env_names::LOG_LEVEL)
        .ok()
        .and_then(|v| v.parse::<LogLevel>().ok())
    {
        set_log_level(level);
    }
}

fn current_level() -> LogLevel {
    LogLevel::from_index(LEVEL.load(Ordering::Relaxed))
}

/// `RUST_LOG` wins over the configured level.
fn build_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(current_level().directive()))
}

struct Stamp;

impl FormatTime for Stamp {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Local::now().format(STAMP_FORMAT))
    }
}

/// Plain-text line format of the workflow log file:
/// `[stamp] [LEVEL] target: message`.
struct FileLine;

impl<S, N> FormatEvent<S, N> for FileLine
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "[{}] [{:<5}] {}: ",
            Local::now().format(STAMP_FORMAT),
            meta.level(),
            meta.target()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn is_log_file(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(prefix) && n.ends_with(".log"))
}

/// Day a log file was opened, taken from its name.
fn opened_on(path: &Path, prefix: &str) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let day = name.strip_prefix(prefix)?.split('_').next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Log files of a directory, oldest first.
pub fn list_log_files(log_dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, ConfigError> {
    if !log_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        if is_log_file(&path, prefix) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Files to drop so that at most `max_files` remain and none is older than
/// `max_age_days`. A zero limit disables that rule.
fn stale_logs(files: &[PathBuf], prefix: &str, config: &LoggingConfig, today: NaiveDate) -> Vec<PathBuf> {
    let surplus = if config.max_files > 0 {
        files.len().saturating_sub(config.max_files)
    } else {
        0
    };
    files
        .iter()
        .enumerate()
        .filter(|(i, path)| {
            *i < surplus
                || (config.max_age_days > 0
                    && opened_on(path, prefix).is_some_and(|day| {
                        (today - day).num_days() > config.max_age_days as i64
                    }))
        })
        .map(|(_, path)| path.clone())
        .collect()
}

fn prune_logs(log_dir: &Path, prefix: &str, config: &LoggingConfig) -> Result<(), ConfigError> {
    fs::create_dir_all(log_dir)?;
    let files = list_log_files(log_dir, prefix)?;
    for path in stale_logs(&files, prefix, config, Local::now().date_naive()) {
        if let Err(e) = fs::remove_file(&path) {
            eprintln!("cannot remove old log {}: {}", path.display(), e);
        }
    }
    Ok(())
}

/// Log to a new file under `<workflow_dir>/log` and to stderr.
///
/// Old files are pruned first and `log/stagehand.log` is pointed at the
/// new file.
pub fn init_workflow_logger(
    workflow_dir: &Path,
    config: &LoggingConfig,
) -> Result<PathBuf, ConfigError> {
    let log_dir = workflow_dir.join(dirs::LOG);
    prune_logs(&log_dir, LOG_PREFIX, config)?;

    let name = format!(
        "{}{}_{}.log",
        LOG_PREFIX,
        Local::now().format("%Y-%m-%d_%H-%M-%S"),
        std::process::id()
    );
    let log_path = log_dir.join(&name);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|source| ConfigError::PathIo {
            path: log_path.clone(),
            source,
        })?;

    tracing_subscriber::registry()
        .with(build_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .event_format(FileLine),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(Stamp)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| ConfigError::General(format!("failed to initialize logging: {}", e)))?;

    let link = log_dir.join(LOG_LINK);
    let _ = fs::remove_file(&link);
    #[cfg(unix)]
    {
        if let Err(e) = std::os::unix::fs::symlink(&name, &link) {
            tracing::warn!("Cannot link {}: {}", link.display(), e);
        }
    }

    tracing::debug!("Log file: {}", log_path.display());
    Ok(log_path)
}

/// Log to stderr only. A second call is a no-op.
pub fn init_stderr_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter())
        .with_writer(std::io::stderr)
        .with_timer(Stamp)
        .with_target(false)
        .try_init();
}

/// Shell-like rendering of a command, quoting empty or blank arguments.
pub fn format_command_for_display(command: &Command) -> String {
    let mut line = command.get_program().to_string_lossy().into_owned();
    for arg in command.get_args() {
        let arg = arg.to_string_lossy();
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('\'');
            line.push_str(&arg);
            line.push('\'');
        } else {
            line.push_str(&arg);
        }
    }
    line
}

pub fn log_and_print_command(command: &Command) {
    tracing::debug!("[CMD] {}", format_command_for_display(command));
}
