use clap::Parser;
use colored::Colorize;
use stagehand_runner::cli::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = stagehand_runner::run(cli) {
        eprintln!("{}", format!("[ERROR] {}", e).red());
        std::process::exit(1);
    }
}
