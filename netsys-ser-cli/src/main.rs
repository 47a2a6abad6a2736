//! NetSys SER CLI - Command-line interface
//!
//! Drives the frame engine recovery controller against a simulated engine
//! and manages its configuration file.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use commands::trigger::TriggerArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "netsys-ser")]
#[command(version = netsys_ser::VERSION)]
#[command(about = "Frame engine hang detection and recovery controller", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.netsys-ser/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Mirror log output on stdout
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller against a simulated engine and inject a hang
    Simulate(SimulateArgs),

    /// Apply an operator control level to a simulated controller
    Trigger(TriggerArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(netsys_ser::config::config_file_path);

    let result: Result<(), CliError> = match cli.command {
        Commands::Simulate(args) => commands::simulate::run(&config_path, cli.verbose, args).await,
        Commands::Trigger(args) => commands::trigger::run(&config_path, cli.verbose, args).await,
        Commands::Config { command } => commands::config::run(&config_path, command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
