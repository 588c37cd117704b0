use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod dispatch;
mod render;


#[derive(Parser, Debug)]
#[command(name = "modsync")]
#[command(about = "Content-package reconciler for a target directory tree", long_about = None)]
struct Cli {
    /// Profile to operate on; defaults to ./modsync.toml
    #[arg(long)]
    profile: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the target directory against the profile's package list
    Sync {
        /// Report the plan without touching the filesystem
        #[arg(long)]
        dry_run: bool,
    },
    /// List installed packages from persisted state
    List,
    /// Per-package detail, including transitive dependencies
    Status,
    /// Show resolved paths and state health
    Doctor,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> Result<()> {
    dispatch::run_cli(Cli::parse())
}
