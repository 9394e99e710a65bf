pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "quill",
    about = "Quill research-paper chat CLI",
    long_about = "Chat with a research-paper assistant: search scholarly works, ask for \
                  explanations and comparisons, and open full papers from the terminal.",
    after_help = "Examples:\n  quill chat\n  quill config\n  quill doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Path to a TOML config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive chat session on stdin/stdout")]
    Chat,
    #[command(about = "Inspect effective configuration values with secrets redacted")]
    Config,
    #[command(about = "Validate config and provider credential readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat => commands::chat::run(cli.config.clone()),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(cli.config.clone()) }
        }
        Command::Doctor { json } => commands::doctor::run(cli.config.clone(), json),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
