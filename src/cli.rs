use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Dependency-aware personal task manager.
/// Storage defaults to ~/.taskflow/tasks.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "tf", version, about = "Personal task manager with dependencies")]
pub struct Cli {
    /// Path to the JSON task store.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to the config file (default: ~/.taskflow/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}
