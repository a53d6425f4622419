//! # taskflow - dependency-aware personal task manager
//!
//! Tasks live in one JSON store and are presented two ways: a list ordered by
//! readiness (tasks with nothing left to wait on come first) and a node canvas where
//! each task has a grid-snapped position.
//!
//! ## Key Features
//!
//! - **Dependencies**: any task may wait on any other; edges that would close a cycle
//!   are rejected, and a task is blocked while one of its dependencies is still todo.
//! - **Checklists and deadlines**: per-task subtasks with progress, due dates
//!   classified as overdue, urgent, soon or normal.
//! - **Node canvas**: tasks fan out over a grid and moved nodes slide into the
//!   nearest free slot.
//! - **Versioned storage**: stores written by older releases are migrated on load
//!   and a copy of the old file is kept.
//!
//! ## Quick Start
//!
//! ```bash
//! tf add "Design schema"
//! tf add "Write migration" --after "design schema" --due "in 2d"
//! tf list
//! tf dep add 1 3
//! tf ui
//! ```
//!
//! Data is stored in `~/.taskflow/tasks.json`; `~/.taskflow/config.toml` can move the
//! store and tune the canvas grid. Set `RUST_LOG=debug` to trace repository activity.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod cli;
pub mod cmd;
pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod fields;
pub mod graph;
pub mod layout;
pub mod schema;
pub mod selectors;
pub mod session;
pub mod task;
pub mod tui {
    pub mod app;
    pub mod canvas;
    pub mod colors;
    pub mod enums;
    pub mod input;
    pub mod run;
    pub mod utils;
}

use cli::Cli;
use cmd::*;
use config::{Config, CONFIG_FILE};
use error::Result;
use session::{Deferred, Session};

fn main() {
    // Tracing is opt-in via RUST_LOG; ignore invalid filters.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("off"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(err.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    // Handle commands that don't need the store first
    if let Commands::Completions { shell } = &cli.command {
        cmd_completions(*shell);
        return Ok(());
    }

    let data_dir = config::data_dir();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE));
    let config = Config::load(&config_path)?;
    let db_path = config.store_path(&data_dir, cli.db.as_deref());
    tracing::debug!(store = %db_path.display(), "opening task store");

    let mut session = Session::open(&db_path, config.layout.clone());
    session.schedule(Deferred::CleanupPositions);

    match cli.command {
        Commands::Completions { .. } => unreachable!("completions handled above"),
        Commands::Ui => return cmd_ui(session),
        Commands::Add { title, desc, due, after } => cmd_add(&mut session, title, desc, due, after)?,
        Commands::List { all, blocked, json, limit } => cmd_list(&session, all, blocked, json, limit)?,
        Commands::View { id } => cmd_view(&session, id)?,
        Commands::Update { id, title, desc, due, clear_due } => {
            cmd_update(&mut session, id, title, desc, due, clear_due)?
        }
        Commands::Toggle { id } => cmd_toggle(&mut session, id)?,
        Commands::Delete { id } => cmd_delete(&mut session, id)?,
        Commands::Dep { action } => cmd_dep(&mut session, action)?,
        Commands::Sub { action } => cmd_sub(&mut session, action)?,
        Commands::Move { id, x, y, avoid_overlap } => cmd_move(&mut session, id, x, y, avoid_overlap)?,
        Commands::Cleanup => cmd_cleanup(&mut session)?,
        Commands::Backup => cmd_backup(&session)?,
    }

    // Deferred work runs once the command itself is done.
    session.run_deferred();
    session.ensure_saved()
}
