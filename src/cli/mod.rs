//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod inspect;
pub mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "artifactd")]
#[command(version)]
#[command(about = "Deploys module packages dropped into watched directories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the registry, bootstrap scanner, deployer and deployment scanner
    Run,
    /// Show a package's manifest and how each built-in engine scores it
    Inspect {
        /// Package file to inspect
        file: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Check configuration for errors and warnings
    Check {
        /// Config file to check (defaults to ~/.artifactd/config.json)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON
    Show,
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    // Fall back to default logging if the config file is missing or unreadable;
    // `run` reports the actual load error.
    let logging_cfg = artifactd::config::Config::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    artifactd::utils::logging::init_logging(&logging_cfg);

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Run) => {
            run::cmd_run().await?;
        }
        Some(Commands::Inspect { file }) => {
            inspect::cmd_inspect(file).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action).await?;
        }
    }

    Ok(())
}

/// Display version information
fn cmd_version() {
    println!("artifactd {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Module deployment daemon");
}
