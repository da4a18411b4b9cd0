use comfy_table::Cell;

use super::{new_table, optional, status_color, AppContext, LogTarget};
use crate::cli::StatusArgs;
use crate::error::CliError;

pub fn handle_status(args: StatusArgs, app: &AppContext) -> Result<(), CliError> {
    let mut engine = app.engine(LogTarget::Stderr, false, false)?;
    let rows = engine.statuses(args.running)?;
    if rows.is_empty() {
        println!("No job to show");
        return Ok(());
    }

    let mut table = new_table(&["Status", "Job ID", "Task", "Cycle", "Member", "Submission dir"]);
    for row in &rows {
        table.add_row(vec![
            Cell::new(row.status.kind.as_str()).fg(status_color(row.status.kind)),
            Cell::new(if row.status.jobid.is_empty() {
                "-"
            } else {
                row.status.jobid.as_str()
            }),
            Cell::new(&row.task),
            Cell::new(optional(row.cycle.as_deref())),
            Cell::new(optional(row.member.as_deref())),
            Cell::new(row.submission_dir.display()),
        ]);
    }
    println!("{table}");
    Ok(())
}
