use colored::Colorize;

use super::{AppContext, LogTarget};
use crate::cli::RunArgs;
use crate::error::CliError;

pub fn handle_run(args: RunArgs, app: &AppContext) -> Result<(), CliError> {
    let mut engine = app.engine(LogTarget::Workflow, args.dry_run, args.update)?;
    let submissions = engine.run()?;

    if submissions.is_empty() {
        println!("{}", "Nothing to submit: every task is up to date.".yellow());
        return Ok(());
    }
    for submission in &submissions {
        let path = engine.task_path(&submission.slot);
        if submission.depend.is_empty() {
            println!("{} {}", submission.jobid.bold(), path.display());
        } else {
            println!(
                "{} {} (after {})",
                submission.jobid.bold(),
                path.display(),
                submission.depend.join(", ")
            );
        }
    }
    let summary = format!("Submitted {} job(s)", submissions.len());
    if args.dry_run {
        println!("{}", format!("{} [dry run]", summary).yellow());
    } else {
        println!("{}", summary.green());
    }
    Ok(())
}
