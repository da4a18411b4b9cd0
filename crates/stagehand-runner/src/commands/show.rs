use super::{AppContext, LogTarget};
use crate::error::CliError;

pub fn handle_show(app: &AppContext) -> Result<(), CliError> {
    let engine = app.engine(LogTarget::Stderr, false, false)?;
    println!("{:#^80}", " HOST ");
    println!("{}", app.host);
    print!("{}", engine.overview());
    Ok(())
}
