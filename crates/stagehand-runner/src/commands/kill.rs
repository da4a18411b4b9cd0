use colored::Colorize;
use stagehand_client::workflow::SlotFilter;

use super::{AppContext, LogTarget};
use crate::cli::{KillArgs, SelectArgs};
use crate::error::CliError;

impl SelectArgs {
    pub fn filter(&self) -> SlotFilter {
        SlotFilter {
            jobids: Vec::new(),
            task: self.task.clone(),
            cycle: self.cycle.clone(),
            member: self.member,
        }
    }
}

pub fn handle_kill(args: KillArgs, app: &AppContext) -> Result<(), CliError> {
    let mut engine = app.engine(LogTarget::Workflow, false, false)?;
    let filter = SlotFilter {
        jobids: args.jobids,
        ..args.select.filter()
    };

    let killed = engine.kill(&filter)?;
    if killed.is_empty() {
        println!("{}", "No running job matched".yellow());
        return Ok(());
    }
    for (jobid, path) in &killed {
        println!("{} {} {}", "Killed".red(), jobid.bold(), path.display());
    }
    Ok(())
}
