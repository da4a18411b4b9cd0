pub mod files {
    pub const SCRIPT: &str = "job.sh";
    pub const RECORD: &str = "job.json";
    pub const STDOUT: &str = "job.out";
    pub const STDERR: &str = "job.err";
    pub const EXIT_STATUS: &str = "job.status";

    /// Every per-slot file removed before a resubmission.
    pub const SLOT_FILES: &[&str] = &[SCRIPT, STDERR, STDOUT, RECORD, EXIT_STATUS];
}

pub mod dirs {
    pub const JOBS: &str = "jobs";
    pub const LOG: &str = "log";
    pub const BIN: &str = "bin";
    pub const LIB: &str = "lib";
    pub const INCLUDE: &str = "include";
}

pub mod config_files {
    pub const WORKFLOW: &str = "workflow.toml";
    pub const TASKS: &str = "tasks.toml";
    pub const HOSTS: &str = "hosts.toml";
}

pub mod env {
    pub const PREFIX: &str = "STAGEHAND_";
    pub const LOG_LEVEL: &str = "STAGEHAND_LOG_LEVEL";
}

pub mod hosts {
    pub const LOCAL: &str = "local";
}

pub const NO_TIME: &str = "--h--";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_files_cover_record_and_logs() {
        assert!(files::SLOT_FILES.contains(&files::RECORD));
        assert!(files::SLOT_FILES.contains(&files::STDOUT));
        assert!(files::SLOT_FILES.contains(&files::STDERR));
        assert!(files::SLOT_FILES.contains(&files::EXIT_STATUS));
        assert_eq!(files::SLOT_FILES.len(), 5);
    }

    #[test]
    fn test_env_prefix() {
        assert!(env::LOG_LEVEL.starts_with(env::PREFIX));
    }
}
