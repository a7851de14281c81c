//! strm-mirror: mirror media libraries as `.strm` pointer trees.
//!
//! # Usage
//!
//! ```text
//! strm-mirror [--config <path>] run
//! strm-mirror [--config <path>] reconcile [--mapping <n>] [--json]
//! strm-mirror [--config <path>] diff [--mapping <n>] [--json]
//! strm-mirror [--config <path>] check
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, diff::DiffArgs, reconcile::ReconcileArgs, run::RunArgs};
use strm_core::config::{self, CONFIG_ENV};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "strm-mirror",
    version,
    about = "Mirror media libraries as pointer files and metadata sidecars",
    long_about = None,
)]
struct Cli {
    /// Configuration file (defaults to `<config dir>/strm-mirror/config.yaml`).
    #[arg(long, short, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon in the foreground: watchers, cron passes, log rotation.
    Run(RunArgs),

    /// Run one full reconciliation pass and exit.
    Reconcile(ReconcileArgs),

    /// Show what a full pass would write and remove, without touching disk.
    Diff(DiffArgs),

    /// Validate the configuration file and print the resolved mappings.
    Check(CheckArgs),
}

impl Cli {
    fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config::default_config_path().context("no --config given"),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path()?;
    match cli.command {
        Commands::Run(args) => args.run(&config_path),
        Commands::Reconcile(args) => args.run(&config_path),
        Commands::Diff(args) => args.run(&config_path),
        Commands::Check(args) => args.run(&config_path),
    }
}
