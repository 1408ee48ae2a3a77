pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "outpass",
    about = "Outpass operator CLI",
    long_about = "Operate the outpass service: migrations, config inspection, readiness checks, maintenance sweeps, and test tokens.",
    after_help = "Examples:\n  outpass doctor --json\n  outpass config\n  outpass sweep\n  outpass issue-token --id m-1 --name Meera --role mentor --branch CSE --section A"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, signing secret, DB connectivity, and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Purge expired credentials and run due cleanup jobs once")]
    Sweep,
    #[command(about = "Issue a signed bearer token for a principal")]
    IssueToken {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, help = "student, mentor, hod, watchman, or dev")]
        role: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        section: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Sweep => commands::sweep::run(),
        Command::IssueToken { id, name, role, branch, section } => {
            commands::token::run(commands::token::TokenRequest { id, name, role, branch, section })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
