use comfy_table::{Cell, Color};

use super::{new_table, optional, AppContext, LogTarget};
use crate::cli::SelectArgs;
use crate::error::CliError;

pub fn handle_artifacts(args: SelectArgs, app: &AppContext) -> Result<(), CliError> {
    let mut engine = app.engine(LogTarget::Stderr, false, false)?;
    let entries = engine.artifacts(&args.filter())?;
    if entries.is_empty() {
        println!("No artifact declared");
        return Ok(());
    }

    let mut table = new_table(&["Task", "Artifact", "Path", "Exists"]);
    for entry in &entries {
        let (exists, color) = if entry.exists {
            ("yes", Color::Green)
        } else {
            ("no", Color::Red)
        };
        table.add_row(vec![
            Cell::new(&entry.task),
            Cell::new(&entry.name).fg(Color::Yellow),
            Cell::new(entry.path.display()),
            Cell::new(exists).fg(color),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn handle_run_dirs(app: &AppContext) -> Result<(), CliError> {
    let mut engine = app.engine(LogTarget::Stderr, false, false)?;
    let entries = engine.run_dirs()?;

    let mut table = new_table(&["Task", "Cycle", "Member", "Run dir"]);
    for entry in &entries {
        let run_dir = entry
            .run_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(submission dir)".to_string());
        table.add_row(vec![
            Cell::new(&entry.task),
            Cell::new(optional(entry.cycle.as_deref())),
            Cell::new(optional(entry.member.as_deref())),
            Cell::new(run_dir),
        ]);
    }
    println!("{table}");
    Ok(())
}
