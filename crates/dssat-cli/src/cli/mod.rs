mod commands;
mod helpers;

use clap::Parser;
use dssat_core::domain::DssatError;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().collect();
    match parse_and_dispatch(args) {
        Ok(code) => code,
        Err(error) => {
            let diagnostic = error.as_dssat_error();
            eprintln!("{}", diagnostic.diagnostic_line());
            if let Some(summary_line) = diagnostic.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            diagnostic.exit_code()
        }
    }
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "dssat-glue",
    version,
    about = "Compile DSSAT experiment files and drive GLUE cultivar calibration"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Build experiment files from a CSV treatment summary
    Compile(commands::CompileArgs),
    /// Print the cultivar and treatment structure of an experiment file as JSON
    Inspect(commands::InspectArgs),
    /// Merge one genotype record line into a genotype database file
    Reconcile(commands::ReconcileArgs),
    /// Compile, calibrate every cultivar, and simulate each experiment
    Run(commands::RunArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Compile(args) => commands::run_compile_command(args),
        CliCommand::Inspect(args) => commands::run_inspect_command(args),
        CliCommand::Reconcile(args) => commands::run_reconcile_command(args),
        CliCommand::Run(args) => commands::run_run_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(DssatError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<DssatError> for CliError {
    fn from(error: DssatError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_dssat_error(&self) -> DssatError {
        match self {
            Self::Usage(message) => DssatError::input_validation("INPUT.CLI_USAGE", message.clone()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => DssatError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
