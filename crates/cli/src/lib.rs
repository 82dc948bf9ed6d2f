pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "frontdesk",
    about = "Frontdesk operator CLI",
    long_about = "Operate Frontdesk migrations, config inspection, readiness checks, demo \
                  seeding, and manual sweep runs.",
    after_help = "Examples:\n  frontdesk doctor --json\n  frontdesk config\n  frontdesk sweep --kind recall"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the idempotent demo tenant dataset")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, model endpoint shape, and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one sweep pass across all active tenants")]
    Sweep {
        #[arg(long, value_enum, help = "Which sweep to run")]
        kind: SweepKindArg,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SweepKindArg {
    Recall,
    Confirmations,
    DueInvoices,
    Overdue,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Sweep { kind } => commands::sweep::run(kind),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
