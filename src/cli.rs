use crate::import::{self, ImportCommand, RunOutcome};
use crate::users::{self, UserImportCommand, UserImportOutcome};
use anyhow::{Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "backblast-import", version)]
#[command(
    about = "Validated, reversible import of backblast attendance into the F3 database",
    long_about = "backblast-import loads event and attendance rows from a CSV file, checks them before any write, imports them in a single transaction, and writes a backout SQL script that reverses the import."
)]
#[command(arg_required_else_help = true)]
#[command(after_long_help = "Examples:
  backblast-import import --input-csv backblasts.csv
  backblast-import import --input-csv backblasts.csv --environment prod --commit
  backblast-import import-users --input-csv users.csv --commit
  backblast-import completion zsh > ~/.zsh/completions/_backblast-import
  backblast-import man > backblast-import.1")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Import backblasts and attendance from a CSV file",
        long_about = "Validate a backblast CSV, then create event instances, attendance and Q/Co-Q assignments in one transaction. Without --commit the transaction is rolled back after a full run."
    )]
    #[command(arg_required_else_help = true)]
    #[command(after_long_help = "Examples:
  backblast-import import --input-csv backblasts.csv
  backblast-import import --input-csv backblasts.csv --environment prod --commit --log-file prod.log")]
    Import {
        #[arg(long, value_name = "PATH", help = "Path to the input CSV file")]
        input_csv: PathBuf,
        #[arg(
            long,
            default_value = "staging",
            value_name = "ENV",
            value_parser = ["staging", "prod"],
            help = "Target environment"
        )]
        environment: String,
        #[arg(long, help = "Commit changes (default is dry-run/rollback)")]
        commit: bool,
        #[arg(
            long,
            default_value = "import_backblasts.log",
            value_name = "PATH",
            help = "Path to log file"
        )]
        log_file: PathBuf,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to import config (default: ./backblast-import.toml)"
        )]
        config: Option<PathBuf>,
        #[arg(
            long,
            value_name = "DIR",
            help = "Directory for the backout SQL script (default: config or current dir)"
        )]
        backout_dir: Option<PathBuf>,
        #[arg(long, value_name = "PATH", help = "Write NDJSON state log to file")]
        events_log: Option<PathBuf>,
    },
    #[command(about = "Create or update users from a CSV file")]
    #[command(arg_required_else_help = true)]
    #[command(after_long_help = "Example:
  backblast-import import-users --input-csv users.csv --environment prod --commit")]
    ImportUsers {
        #[arg(long, value_name = "PATH", help = "Path to the input CSV file")]
        input_csv: PathBuf,
        #[arg(
            long,
            default_value = "staging",
            value_name = "ENV",
            value_parser = ["staging", "prod"],
            help = "Target environment"
        )]
        environment: String,
        #[arg(long, help = "Commit changes (default is dry-run/rollback)")]
        commit: bool,
        #[arg(
            long,
            default_value = "import_users.log",
            value_name = "PATH",
            help = "Path to log file"
        )]
        log_file: PathBuf,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to import config (default: ./backblast-import.toml)"
        )]
        config: Option<PathBuf>,
    },
    #[command(
        about = "Generate shell completion script",
        long_about = "Generate shell completion script for your shell. Redirect output to your shell completion directory."
    )]
    #[command(arg_required_else_help = true)]
    Completion {
        #[arg(value_enum, value_name = "SHELL", help = "Target shell")]
        shell: Shell,
    },
    #[command(
        about = "Generate a man page",
        long_about = "Generate a roff man page for backblast-import."
    )]
    Man {
        #[arg(
            long,
            value_name = "PATH",
            help = "Write man page to file (stdout when omitted)"
        )]
        output: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Import {
            input_csv,
            environment,
            commit,
            log_file,
            config,
            backout_dir,
            events_log,
        } => {
            let report = import::execute_import(ImportCommand {
                input_csv,
                environment,
                commit,
                log_file,
                config,
                backout_dir,
                events_log,
            })?;
            match report.outcome {
                RunOutcome::Aborted(reason) => bail!("import aborted: {reason}"),
                RunOutcome::Committed(_) | RunOutcome::RolledBack(_) => Ok(()),
            }
        }
        Commands::ImportUsers {
            input_csv,
            environment,
            commit,
            log_file,
            config,
        } => {
            let outcome = users::execute_user_import(UserImportCommand {
                input_csv,
                environment,
                commit,
                log_file,
                config,
            })?;
            match outcome {
                UserImportOutcome::Aborted(errors) => {
                    bail!("user import aborted: {}", errors.join("; "))
                }
                UserImportOutcome::Committed { .. } | UserImportOutcome::RolledBack { .. } => {
                    Ok(())
                }
            }
        }
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Man { output } => {
            let man = clap_mangen::Man::new(Cli::command());
            match output {
                Some(path) => {
                    let mut bytes = Vec::new();
                    man.render(&mut bytes)?;
                    fs::write(path, bytes)?;
                }
                None => {
                    man.render(&mut io::stdout())?;
                }
            }
            Ok(())
        }
    }
}
