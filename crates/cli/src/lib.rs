pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "bogbot",
    about = "Bogbot operator CLI",
    long_about = "Apply migrations, inspect configuration, check readiness, and assign roles directly in the store.",
    after_help = "Examples:\n  bogbot doctor --json\n  bogbot config\n  bogbot role U024BE7LH exec"
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
    #[command(about = "Validate config, Slack token readiness, DB connectivity and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Assign a role to a user without going through Slack")]
    Role {
        #[arg(help = "Slack user id, e.g. U024BE7LH or <@U024BE7LH>")]
        user_id: String,
        #[arg(help = "One of exec, leader, member")]
        role: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Role { user_id, role } => commands::role::run(&user_id, &role),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
