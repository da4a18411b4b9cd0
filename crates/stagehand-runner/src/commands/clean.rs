use colored::Colorize;
use stagehand_client::workflow::CleanOptions;

use super::{AppContext, LogTarget};
use crate::cli::CleanArgs;
use crate::error::CliError;

impl From<&CleanArgs> for CleanOptions {
    fn from(args: &CleanArgs) -> Self {
        CleanOptions {
            submission_dirs: !args.no_submission_dirs,
            log_files: !args.no_log_files,
            run_dirs: args.run_dirs,
            artifacts: args.artifacts,
            extra: args.extra.clone(),
            dry: args.dry_run,
        }
    }
}

pub fn handle_clean(args: CleanArgs, app: &AppContext) -> Result<(), CliError> {
    let mut engine = app.engine(LogTarget::Stderr, args.dry_run, false)?;
    let count = engine.clean(&CleanOptions::from(&args))?;

    let message = match (count, args.dry_run) {
        (0, _) => "Nothing to remove".to_string(),
        (n, true) => format!("Would remove {} file(s) or directories", n),
        (n, false) => format!("Removed {} file(s) or directories", n),
    };
    if count == 0 || args.dry_run {
        println!("{}", message.yellow());
    } else {
        println!("{}", message.green());
    }
    Ok(())
}
