pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tablebell_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "tablebell",
    about = "Tablebell operator CLI",
    long_about = "Prepare the database, load the demo restaurant, inspect configuration and \
                  check readiness of the phone ordering and booking service.",
    after_help = "Examples:\n  tablebell migrate\n  tablebell seed\n  tablebell doctor --json"
)]
pub struct Cli {
    /// Config file to read instead of `tablebell.toml` / `config/tablebell.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the deterministic demo restaurant with its menu and tables")]
    Seed,
    #[command(about = "Show effective configuration with source attribution and redaction")]
    Config,
    #[command(about = "Check config validity, NLU readiness and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Doctor { json } => commands::doctor::run(&options, json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
