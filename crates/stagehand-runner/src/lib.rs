pub mod cli;
pub mod commands;
pub mod error;
pub mod hosts;
pub mod tasks;

use cli::{Cli, Commands};
use commands::AppContext;
use error::CliError;
use stagehand_core::logging::{self, LogLevel};

pub fn run(cli: Cli) -> Result<(), CliError> {
    if cli.verbose > 0 {
        logging::set_log_level(LogLevel::from_verbosity(cli.verbose));
    } else {
        logging::set_log_level_from_env();
    }

    let app = AppContext::from_cli(&cli)?;
    match cli.command {
        Commands::Show => commands::show::handle_show(&app),
        Commands::Run(args) => commands::run::handle_run(args, &app),
        Commands::Status(args) => commands::status::handle_status(args, &app),
        Commands::Kill(args) => commands::kill::handle_kill(args, &app),
        Commands::Clean(args) => commands::clean::handle_clean(args, &app),
        Commands::Artifacts(args) => commands::list::handle_artifacts(args, &app),
        Commands::RunDirs => commands::list::handle_run_dirs(&app),
    }
}
