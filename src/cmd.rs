//! Command implementations for the CLI interface.
//!
//! Each handler resolves its arguments against the current store, applies one
//! repository mutation through the session and reports the outcome. Handlers return
//! `Result` and leave printing of errors and exit codes to `main`.

use chrono::{Local, TimeZone, Utc};
use clap::Subcommand;
use clap_complete::{generate, Shell};
use serde::Serialize;

use crate::display::*;
use crate::error::{Error, Result};
use crate::fields::*;
use crate::graph::dependents_of;
use crate::selectors::*;
use crate::session::Session;
use crate::task::{TaskId, TaskPatch};
use crate::tui::run::run_tui;

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the interactive UI.
    Ui,

    /// Add a new task.
    Add {
        /// Short title for the task.
        title: String,
        /// Optional longer description.
        #[arg(long)]
        desc: Option<String>,
        /// Due: YYYY-MM-DD, "today", "tomorrow", "in 3h", "in 2d", "in 1w" or RFC 3339.
        #[arg(long)]
        due: Option<String>,
        /// Task ID or title this task depends on. May be repeated.
        #[arg(long = "after")]
        after: Vec<String>,
    },

    /// List tasks, ready work first.
    List {
        /// Include completed tasks.
        #[arg(long)]
        all: bool,
        /// Only show blocked tasks.
        #[arg(long)]
        blocked: bool,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
        /// Limit number of rows printed.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// View a single task by ID or title.
    View {
        /// Task ID or title to view
        id: String,
    },

    /// Update fields on a task.
    Update {
        /// Task ID or title to update
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        due: Option<String>,
        /// Clear the due date.
        #[arg(long, conflicts_with = "due")]
        clear_due: bool,
    },

    /// Toggle a task between todo and done.
    Toggle {
        /// Task ID or title to toggle
        id: String,
    },

    /// Delete a task and remove it from every dependency list.
    Delete {
        /// Task ID or title to delete
        id: String,
    },

    /// Manage dependencies between tasks.
    Dep {
        #[command(subcommand)]
        action: DepAction,
    },

    /// Manage a task's checklist.
    Sub {
        #[command(subcommand)]
        action: SubAction,
    },

    /// Place a task on the canvas (snapped to the grid).
    #[command(allow_negative_numbers = true)]
    Move {
        /// Task ID or title to move
        id: String,
        x: f64,
        y: f64,
        /// Nudge the task into the nearest free slot.
        #[arg(long)]
        avoid_overlap: bool,
    },

    /// Lay out tasks without a position and snap every position to the grid.
    Cleanup,

    /// Create a timestamped backup of the task store.
    Backup,

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum DepAction {
    /// Make TARGET depend on SOURCE.
    Add {
        /// The task that must be done first
        source: String,
        /// The task that waits
        target: String,
    },
    /// Remove the dependency of TARGET on SOURCE.
    Rm { source: String, target: String },
}

#[derive(Subcommand)]
pub enum SubAction {
    /// Add a checklist item.
    Add { task: String, title: String },
    /// Toggle a checklist item.
    Toggle { task: String, subtask: u64 },
    /// Delete a checklist item.
    Rm { task: String, subtask: u64 },
}

/// Launch the terminal user interface.
pub fn cmd_ui(session: Session) -> Result<()> {
    run_tui(session)?;
    Ok(())
}

fn parse_due(input: &str) -> Result<chrono::DateTime<Utc>> {
    parse_due_input(input, Utc::now()).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "Unrecognised due date '{input}'. Use YYYY-MM-DD, 'today', 'tomorrow', 'in 3h', 'in 2d' or 'in 1w'."
        ))
    })
}

/// Add a new task, optionally with a deadline and predecessors.
pub fn cmd_add(
    session: &mut Session,
    title: String,
    desc: Option<String>,
    due: Option<String>,
    after: Vec<String>,
) -> Result<()> {
    let title = title.trim().to_string();
    if title.is_empty() {
        return Err(Error::InvalidArgument("Title cannot be empty".into()));
    }
    let due = due.as_deref().map(parse_due).transpose()?;
    let mut predecessors = after
        .iter()
        .map(|p| resolve_task_identifier(p, session.db()))
        .collect::<Result<Vec<_>>>()?;
    let mut seen = std::collections::HashSet::new();
    predecessors.retain(|id| seen.insert(*id));

    let id = session.apply(|db| {
        let id = db.add_task(title);
        db.update_task(id, TaskPatch { description: desc, due_date: due.map(Some), ..Default::default() });
        id
    });
    for source in predecessors {
        session.apply(|db| db.add_dependency(source, id))?;
    }
    session.ensure_saved()?;
    println!("Added task {id}");
    Ok(())
}

#[derive(Serialize)]
struct TaskRow<'a> {
    #[serde(flatten)]
    task: &'a crate::task::Task,
    blocked: bool,
    due_status: Option<DueStatus>,
    progress: SubtaskProgress,
}

/// List tasks in readiness order.
pub fn cmd_list(session: &Session, all: bool, blocked: bool, json: bool, limit: Option<usize>) -> Result<()> {
    let tasks = session.db().tasks();
    let mut rows: Vec<_> = get_sorted_tasks(tasks)
        .into_iter()
        .filter(|t| all || t.status != Status::Done)
        .filter(|t| !blocked || is_task_blocked(t, tasks))
        .collect();
    if let Some(limit) = limit {
        rows.truncate(limit);
    }

    if json {
        let now = Utc::now();
        let out: Vec<TaskRow> = rows
            .iter()
            .map(|t| TaskRow {
                task: t,
                blocked: is_task_blocked(t, tasks),
                due_status: get_due_date_status(t.due_date, now),
                progress: get_subtask_progress(t),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if rows.is_empty() {
        println!("No tasks.");
    } else {
        print_table(&rows, tasks);
    }
    Ok(())
}

/// Show every field of one task along with its graph neighbours.
pub fn cmd_view(session: &Session, id: String) -> Result<()> {
    let db = session.db();
    let task_id = resolve_task_identifier(&id, db)?;
    let task = db
        .get(task_id)
        .ok_or_else(|| Error::TaskNotFound(format!("Task {task_id} not found.")))?;
    let now = Utc::now();
    let created = Local
        .timestamp_millis_opt(task.created_at)
        .single()
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| "-".into());

    println!("ID:           {}", task.id);
    println!("Title:        {}", task.title);
    println!("Status:       {}", format_status(task.status));
    println!("Blocked:      {}", if is_task_blocked(task, db.tasks()) { "yes" } else { "no" });
    println!(
        "Due:          {}",
        match task.due_date {
            Some(d) => format!(
                "{} ({}, {})",
                d.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                format_due_relative(Some(d), now),
                format_due_status(get_due_date_status(Some(d), now))
            ),
            None => "-".into(),
        }
    );
    println!(
        "Position:     {}",
        task.position.map(|p| format!("({}, {})", p.x, p.y)).unwrap_or_else(|| "-".into())
    );
    println!("Created:      {created}");
    println!("Depends on:   {}", format_ids(&task.dependencies));
    println!("Needed by:    {}", format_ids(&dependents_of(db.tasks(), task.id)));
    println!("Description:\n{}\n", if task.description.is_empty() { "-" } else { task.description.as_str() });

    let progress = get_subtask_progress(task);
    println!("Checklist ({}):", format_progress(progress));
    if task.subtasks.is_empty() {
        println!("  -");
    }
    for sub in &task.subtasks {
        println!("  [{}] {} (#{})", if sub.done { "x" } else { " " }, sub.title, sub.id);
    }
    Ok(())
}

/// Update an existing task's fields.
pub fn cmd_update(
    session: &mut Session,
    id: String,
    title: Option<String>,
    desc: Option<String>,
    due: Option<String>,
    clear_due: bool,
) -> Result<()> {
    let task_id = resolve_task_identifier(&id, session.db())?;
    if let Some(t) = &title {
        if t.trim().is_empty() {
            return Err(Error::InvalidArgument("Title cannot be empty".into()));
        }
    }
    let due_date = if clear_due {
        Some(None)
    } else {
        due.as_deref().map(parse_due).transpose()?.map(Some)
    };
    let patch = TaskPatch {
        title: title.map(|t| t.trim().to_string()),
        description: desc,
        due_date,
        ..Default::default()
    };
    if patch.is_empty() {
        println!("Nothing to update.");
        return Ok(());
    }
    session.apply(|db| db.update_task(task_id, patch));
    session.ensure_saved()?;
    println!("Updated task {task_id}");
    Ok(())
}

pub fn cmd_toggle(session: &mut Session, id: String) -> Result<()> {
    let task_id = resolve_task_identifier(&id, session.db())?;
    session.apply(|db| db.toggle_task(task_id));
    session.ensure_saved()?;
    let status = session.db().get(task_id).map(|t| t.status).unwrap_or_default();
    println!("Task {task_id} is now {}", format_status(status));
    Ok(())
}

pub fn cmd_delete(session: &mut Session, id: String) -> Result<()> {
    let task_id = resolve_task_identifier(&id, session.db())?;
    let dependents = dependents_of(session.db().tasks(), task_id);
    session.apply(|db| db.delete_task(task_id));
    session.ensure_saved()?;
    if dependents.is_empty() {
        println!("Deleted task {task_id}");
    } else {
        println!("Deleted task {task_id} (unlinked from {})", format_ids(&dependents));
    }
    Ok(())
}

pub fn cmd_dep(session: &mut Session, action: DepAction) -> Result<()> {
    match action {
        DepAction::Add { source, target } => {
            let (source, target) = resolve_pair(session, &source, &target)?;
            session.apply(|db| db.add_dependency(source, target))?;
            session.ensure_saved()?;
            println!("Task {target} now depends on task {source}");
        }
        DepAction::Rm { source, target } => {
            let (source, target) = resolve_pair(session, &source, &target)?;
            if session.apply(|db| db.remove_dependency(source, target)) {
                session.ensure_saved()?;
                println!("Task {target} no longer depends on task {source}");
            } else {
                println!("Task {target} does not depend on task {source}");
            }
        }
    }
    Ok(())
}

fn resolve_pair(session: &Session, source: &str, target: &str) -> Result<(TaskId, TaskId)> {
    Ok((
        resolve_task_identifier(source, session.db())?,
        resolve_task_identifier(target, session.db())?,
    ))
}

pub fn cmd_sub(session: &mut Session, action: SubAction) -> Result<()> {
    match action {
        SubAction::Add { task, title } => {
            let task_id = resolve_task_identifier(&task, session.db())?;
            if title.trim().is_empty() {
                return Err(Error::InvalidArgument("Title cannot be empty".into()));
            }
            let sub = session.apply(|db| db.add_subtask(task_id, title.trim()));
            session.ensure_saved()?;
            if let Some(sub) = sub {
                println!("Added checklist item {sub} to task {task_id}");
            }
        }
        SubAction::Toggle { task, subtask } => {
            let task_id = resolve_task_identifier(&task, session.db())?;
            if !session.apply(|db| db.toggle_subtask(task_id, subtask)) {
                return Err(Error::TaskNotFound(format!("Task {task_id} has no checklist item {subtask}")));
            }
            session.ensure_saved()?;
            println!("Toggled checklist item {subtask}");
        }
        SubAction::Rm { task, subtask } => {
            let task_id = resolve_task_identifier(&task, session.db())?;
            if !session.apply(|db| db.delete_subtask(task_id, subtask)) {
                return Err(Error::TaskNotFound(format!("Task {task_id} has no checklist item {subtask}")));
            }
            session.ensure_saved()?;
            println!("Deleted checklist item {subtask}");
        }
    }
    Ok(())
}

pub fn cmd_move(session: &mut Session, id: String, x: f64, y: f64, avoid_overlap: bool) -> Result<()> {
    if !x.is_finite() || !y.is_finite() {
        return Err(Error::InvalidArgument("Coordinates must be finite numbers".into()));
    }
    let task_id = resolve_task_identifier(&id, session.db())?;
    let target = Position::new(x, y);
    session.apply(|db| {
        if avoid_overlap {
            db.place_task(task_id, target);
        } else {
            db.update_task_position(task_id, target);
        }
    });
    session.ensure_saved()?;
    if let Some(p) = session.db().get(task_id).and_then(|t| t.position) {
        println!("Task {task_id} placed at ({}, {})", p.x, p.y);
    }
    Ok(())
}

pub fn cmd_cleanup(session: &mut Session) -> Result<()> {
    let moved = session.apply(|db| db.cleanup_positions());
    session.ensure_saved()?;
    println!("Repositioned {moved} task(s)");
    Ok(())
}

pub fn cmd_backup(session: &Session) -> Result<()> {
    let backup = crate::db::create_backup(session.path())?;
    println!("Backup created: {}", backup.display());
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Grid;

    fn session() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(&dir.path().join("tasks.json"), Grid::default());
        (dir, session)
    }

    #[test]
    fn test_add_with_dependencies_and_due() {
        let (_dir, mut s) = session();
        cmd_add(&mut s, "Design".into(), None, None, vec![]).unwrap();
        cmd_add(&mut s, "Build".into(), Some("after design".into()), Some("in 2d".into()), vec!["design".into()])
            .unwrap();

        let build = s.db().tasks().iter().find(|t| t.title == "Build").unwrap();
        let design = s.db().tasks().iter().find(|t| t.title == "Design").unwrap();
        assert_eq!(build.dependencies, vec![design.id]);
        assert_eq!(build.description, "after design");
        assert_eq!(
            get_due_date_status(build.due_date, Utc::now()),
            Some(DueStatus::Soon)
        );
    }

    #[test]
    fn test_add_rejects_empty_title_and_bad_due() {
        let (_dir, mut s) = session();
        assert!(matches!(cmd_add(&mut s, "  ".into(), None, None, vec![]), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            cmd_add(&mut s, "x".into(), None, Some("whenever".into()), vec![]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(s.db().is_empty());
    }

    #[test]
    fn test_dep_cycle_surfaces_as_user_error() {
        let (_dir, mut s) = session();
        cmd_add(&mut s, "A".into(), None, None, vec![]).unwrap();
        cmd_add(&mut s, "B".into(), None, None, vec!["A".into()]).unwrap();
        let err = cmd_dep(&mut s, DepAction::Add { source: "B".into(), target: "A".into() }).unwrap_err();
        assert!(matches!(err, Error::Dependency(crate::graph::DependencyError::Cycle { .. })));
        assert_eq!(err.exit_code(), crate::error::exit_codes::USER_ERROR);
    }

    #[test]
    fn test_update_clears_due() {
        let (_dir, mut s) = session();
        cmd_add(&mut s, "A".into(), None, Some("tomorrow".into()), vec![]).unwrap();
        cmd_update(&mut s, "A".into(), None, None, None, true).unwrap();
        assert_eq!(s.db().tasks()[0].due_date, None);
    }

    #[test]
    fn test_move_snaps_and_avoids_overlap() {
        let (_dir, mut s) = session();
        cmd_add(&mut s, "A".into(), None, None, vec![]).unwrap();
        cmd_add(&mut s, "B".into(), None, None, vec![]).unwrap();
        cmd_move(&mut s, "A".into(), 1001.0, 999.0, false).unwrap();
        assert_eq!(s.db().tasks()[1].position, Some(Position::new(1000.0, 1000.0)));

        cmd_move(&mut s, "B".into(), 1000.0, 1000.0, true).unwrap();
        let b = s.db().tasks()[0].position.unwrap();
        let grid = Grid::default();
        assert!(!grid.is_overlapping(b, Position::new(1000.0, 1000.0), grid.padding));
    }

    #[test]
    fn test_sub_toggle_unknown_is_error() {
        let (_dir, mut s) = session();
        cmd_add(&mut s, "A".into(), None, None, vec![]).unwrap();
        cmd_sub(&mut s, SubAction::Add { task: "A".into(), title: "step".into() }).unwrap();
        assert!(cmd_sub(&mut s, SubAction::Toggle { task: "A".into(), subtask: 999 }).is_err());
        assert_eq!(get_subtask_progress(&s.db().tasks()[0]).total, 1);
    }
}
