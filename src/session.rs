//! The single-writer session that owns the repository.
//!
//! Views never hold the `Database` directly: they call [`Session::apply`] with a
//! mutation, and the session drains the recorded changes, keeps the selection valid
//! and writes the store back to disk. Saving is fire-and-forget; a failed write is
//! logged and the in-memory state stays authoritative.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::db::{create_backup, Change, Database, LoadReport};
use crate::error::Result;
use crate::layout::Grid;
use crate::task::{Task, TaskId};

/// Work queued to run after the current update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// Lay out tasks without a position and snap the rest.
    CleanupPositions,
}

pub struct Session {
    db: Database,
    path: PathBuf,
    selected: Option<TaskId>,
    pending: VecDeque<Deferred>,
    backup_before_save: bool,
    saved_revision: u64,
}

impl Session {
    /// Load the store at `path`.
    pub fn open(path: &Path, grid: Grid) -> Self {
        let (db, report) = Database::load(path, grid);
        Session::with_database(db, path, report)
    }

    pub fn with_database(db: Database, path: &Path, report: LoadReport) -> Self {
        let saved_revision = db.revision();
        Session {
            db,
            path: path.to_path_buf(),
            selected: None,
            pending: VecDeque::new(),
            backup_before_save: report.needs_backup(),
            saved_revision,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn selected(&self) -> Option<TaskId> {
        self.selected
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.selected.and_then(|id| self.db.get(id))
    }

    /// Select a task; unknown ids clear the selection.
    pub fn select(&mut self, id: Option<TaskId>) {
        self.selected = id.filter(|id| self.db.get(*id).is_some());
    }

    /// Run a mutation, then publish its changes.
    pub fn apply<R>(&mut self, mutation: impl FnOnce(&mut Database) -> R) -> R {
        let result = mutation(&mut self.db);
        self.sync();
        result
    }

    /// Drain pending changes, clear a deleted selection and persist.
    pub fn sync(&mut self) -> Vec<Change> {
        let changes = self.db.drain_changes();
        if changes
            .iter()
            .any(|c| matches!(c, Change::Removed(id) if Some(*id) == self.selected))
        {
            self.selected = None;
        }
        if !changes.is_empty() {
            if let Err(e) = self.save() {
                warn!(path = %self.path.display(), "failed to save task store: {e}");
            }
        }
        changes
    }

    /// Whether the in-memory state has changes that are not on disk yet.
    pub fn is_dirty(&self) -> bool {
        self.db.revision() != self.saved_revision
    }

    /// Save if anything is unsaved, reporting failure to the caller.
    pub fn ensure_saved(&mut self) -> Result<()> {
        if self.is_dirty() {
            self.save()?;
        }
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        if self.backup_before_save && self.path.exists() {
            let backup = create_backup(&self.path)?;
            info!(backup = %backup.display(), "kept a copy of the previous task store");
        }
        self.backup_before_save = false;
        self.db.save(&self.path)?;
        self.saved_revision = self.db.revision();
        Ok(())
    }

    /// Queue work for the next tick.
    pub fn schedule(&mut self, work: Deferred) {
        if !self.pending.contains(&work) {
            self.pending.push_back(work);
        }
    }

    pub fn has_deferred(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Run everything queued by [`Session::schedule`]. Returns the number of jobs run.
    pub fn run_deferred(&mut self) -> usize {
        let mut ran = 0;
        while let Some(work) = self.pending.pop_front() {
            match work {
                Deferred::CleanupPositions => {
                    let moved = self.apply(|db| db.cleanup_positions());
                    if moved > 0 {
                        info!(moved, "repaired task positions");
                    }
                }
            }
            ran += 1;
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Position;
    use crate::schema::PersistedState;

    fn temp_session() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(&dir.path().join("tasks.json"), Grid::default());
        (dir, session)
    }

    #[test]
    fn test_apply_persists_immediately() {
        let (dir, mut session) = temp_session();
        let a = session.apply(|db| db.add_task("A"));
        assert!(!session.is_dirty());

        let reopened = Session::open(&dir.path().join("tasks.json"), Grid::default());
        assert_eq!(reopened.db().get(a).unwrap().title, "A");
    }

    #[test]
    fn test_deleting_selected_task_clears_selection() {
        let (_dir, mut session) = temp_session();
        let a = session.apply(|db| db.add_task("A"));
        let b = session.apply(|db| db.add_task("B"));

        session.select(Some(a));
        session.apply(|db| db.delete_task(b));
        assert_eq!(session.selected(), Some(a));

        session.apply(|db| db.delete_task(a));
        assert_eq!(session.selected(), None);
    }

    #[test]
    fn test_select_unknown_clears() {
        let (_dir, mut session) = temp_session();
        let a = session.apply(|db| db.add_task("A"));
        session.select(Some(a));
        session.select(Some(TaskId(999)));
        assert_eq!(session.selected(), None);
    }

    #[test]
    fn test_deferred_cleanup_runs_on_next_tick() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let mut record = PersistedState::default();
        let mut a = Task::new(TaskId(1), "A", 1);
        a.position = Some(Position::new(7.0, 7.0));
        record.tasks = vec![a, Task::new(TaskId(2), "B", 2)];
        record.next_id = 3;
        let db = Database::from_record(record, Grid::default());
        let mut session = Session::with_database(db, &path, LoadReport::default());

        session.schedule(Deferred::CleanupPositions);
        session.schedule(Deferred::CleanupPositions);
        assert!(session.has_deferred());
        assert_eq!(session.db().get(TaskId(2)).unwrap().position, None);

        assert_eq!(session.run_deferred(), 1);
        assert!(!session.has_deferred());
        assert_eq!(session.db().get(TaskId(1)).unwrap().position, Some(Position::new(0.0, 0.0)));
        assert!(session.db().get(TaskId(2)).unwrap().position.is_some());
        assert!(path.exists());
    }

    #[test]
    fn test_migrated_store_is_backed_up_before_first_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, r#"[{"id": 1, "title": "Old", "completed": false, "createdAt": 1}]"#).unwrap();

        let mut session = Session::open(&path, Grid::default());
        session.apply(|db| db.add_task("New"));

        let backups: Vec<_> = std::fs::read_dir(dir.path().join("backup")).unwrap().collect();
        assert_eq!(backups.len(), 1);
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("\"version\": 3"));
    }

    #[test]
    fn test_newer_store_is_backed_up_before_first_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let original = r#"{"version": 7, "nextId": 2, "tasks": [{"id": 1, "title": "Future", "status": "todo", "createdAt": 1, "tags": ["x"]}]}"#;
        std::fs::write(&path, original).unwrap();

        let mut session = Session::open(&path, Grid::default());
        session.apply(|db| db.add_task("New"));

        let backups: Vec<_> = std::fs::read_dir(dir.path().join("backup"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), original);
    }
}
