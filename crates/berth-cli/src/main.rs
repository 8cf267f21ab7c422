//! Berth CLI - deploy charts by reconciling releases against a cluster

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::credentials::CredentialsCommand;
use commands::deploy::DeployArgs;
use commands::status::StatusArgs;
use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "berth")]
#[command(author = "Berth Contributors")]
#[command(version)]
#[command(about = "Deploy charts by reconciling releases against a cluster", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Credential store file (default: <config dir>/berth/credentials.yaml)
    #[arg(long, global = true, env = "BERTH_CREDENTIALS_FILE")]
    credentials_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a release, or update it if it already exists
    Deploy(DeployArgs),

    /// Show the status of a release
    Status(StatusArgs),

    /// Manage stored kubeconfig credentials
    Credentials {
        #[command(subcommand)]
        command: CredentialsCommand,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    let credentials_file = cli.credentials_file.as_deref();
    match cli.command {
        Commands::Deploy(args) => commands::deploy::run(&args, credentials_file).await,
        Commands::Status(args) => commands::status::run(&args, credentials_file).await,
        Commands::Credentials { command } => commands::credentials::run(&command, credentials_file),
    }
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            let _ = err.print();
            std::process::exit(exit_codes::USAGE_ERROR);
        }
    };
    init_tracing(cli.debug);

    let result = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::internal(format!("failed to start runtime: {}", e)))
        .and_then(|runtime| runtime.block_on(dispatch(cli)));

    let code = match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            if !matches!(err, CliError::Reported { .. }) {
                eprintln!("{:?}", miette::Report::new(err));
            }
            code
        }
    };
    std::process::exit(code);
}
