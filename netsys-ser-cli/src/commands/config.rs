//! Configuration management CLI commands.
//!
//! Provides `config init`, `config show` and `config path`.

use std::path::Path;

use clap::Subcommand;
use netsys_ser::config::ConfigFile;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(config_path: &Path, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init { force } => run_init(config_path, force),
        ConfigCommands::Show => run_show(config_path),
        ConfigCommands::Path => run_path(config_path),
    }
}

fn run_init(config_path: &Path, force: bool) -> Result<(), CliError> {
    if force {
        ConfigFile::default().save_to(config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    if ConfigFile::ensure_exists_at(config_path)? {
        println!("Wrote default configuration to {}", config_path.display());
    } else {
        println!(
            "Configuration already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }
    Ok(())
}

/// Print the configuration as loaded, defaults filled in.
fn run_show(config_path: &Path) -> Result<(), CliError> {
    let config = ConfigFile::load_from(config_path)?;
    if !config_path.exists() {
        println!("; {} not found, showing defaults", config_path.display());
    }
    print!("{}", config.to_ini_string());
    Ok(())
}

fn run_path(config_path: &Path) -> Result<(), CliError> {
    println!("{}", config_path.display());
    Ok(())
}
