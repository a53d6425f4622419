//! The task repository and its file persistence.
//!
//! `Database` holds the authoritative, newest-first collection of tasks and exposes
//! every mutation the views issue. Mutations are synchronous; each successful one
//! bumps `revision` and records a `Change` that collaborators drain after the call.
//! Missing ids are silent no-ops so stale UI events never fail.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::fields::*;
use crate::layout::Grid;
use crate::schema::{self, PersistedState, CURRENT_VERSION};
use crate::task::{Subtask, Task, TaskId, TaskPatch};

/// A change recorded by a repository mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Added(TaskId),
    Updated(TaskId),
    Moved(TaskId),
    Removed(TaskId),
}

impl Change {
    pub fn task_id(&self) -> TaskId {
        match *self {
            Change::Added(id) | Change::Updated(id) | Change::Moved(id) | Change::Removed(id) => id,
        }
    }
}

/// What happened while reading the store from disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Stored schema version when it was older than the current one.
    pub migrated_from: Option<u32>,
    /// Stored schema version when it was newer than the current one.
    pub newer_version: Option<u32>,
    /// The file existed but could not be read or parsed.
    pub recovered: bool,
}

impl LoadReport {
    /// Whether the file on disk should be copied aside before it is overwritten.
    pub fn needs_backup(&self) -> bool {
        self.migrated_from.is_some() || self.newer_version.is_some() || self.recovered
    }
}

/// In-memory task repository.
#[derive(Debug, Clone)]
pub struct Database {
    tasks: Vec<Task>,
    next_id: u64,
    last_created_at: i64,
    grid: Grid,
    revision: u64,
    changes: Vec<Change>,
}

impl Default for Database {
    fn default() -> Self {
        Database::new(Grid::default())
    }
}

impl Database {
    pub fn new(grid: Grid) -> Self {
        Database {
            tasks: Vec::new(),
            next_id: 1,
            last_created_at: 0,
            grid,
            revision: 0,
            changes: Vec::new(),
        }
    }

    /// Build a repository from a migrated and normalised record.
    pub fn from_record(record: PersistedState, grid: Grid) -> Self {
        let last_created_at = record.tasks.iter().map(|t| t.created_at).max().unwrap_or(0);
        Database {
            tasks: record.tasks,
            next_id: record.next_id,
            last_created_at,
            grid,
            revision: 0,
            changes: Vec::new(),
        }
    }

    pub fn to_record(&self) -> PersistedState {
        PersistedState {
            version: CURRENT_VERSION,
            next_id: self.next_id,
            tasks: self.tasks.clone(),
        }
    }

    /// Load the store from a JSON file.
    ///
    /// A missing file yields an empty repository. Older schema versions are migrated,
    /// and an unreadable file is logged and replaced by an empty repository; the
    /// report tells the caller to keep a copy of the original before saving.
    pub fn load(path: &Path, grid: Grid) -> (Self, LoadReport) {
        let mut report = LoadReport::default();
        if !path.exists() {
            return (Database::new(grid), report);
        }
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                error!(path = %path.display(), "error reading task store, starting fresh: {e}");
                report.recovered = true;
                return (Database::new(grid), report);
            }
        };
        match schema::decode(&raw, &grid) {
            Ok((record, stored_version)) => {
                if stored_version < CURRENT_VERSION {
                    info!(from = stored_version, to = CURRENT_VERSION, "migrated task store");
                    report.migrated_from = Some(stored_version);
                } else if stored_version > CURRENT_VERSION {
                    report.newer_version = Some(stored_version);
                }
                (Database::from_record(record, grid), report)
            }
            Err(e) => {
                error!(path = %path.display(), "error parsing task store, starting fresh: {e}");
                report.recovered = true;
                (Database::new(grid), report)
            }
        }
    }

    /// Save the store to a JSON file using an atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(&self.to_record())?;
        let mut f = File::create(&tmp)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Monotonic counter bumped by every successful mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Take the changes recorded since the last drain.
    pub fn drain_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn record(&mut self, change: Change) {
        self.revision += 1;
        self.changes.push(change);
    }

    fn allocate_id(&mut self) -> u64 {
        let used: HashSet<u64> = if self.next_id == schema::RESERVED_ID {
            warn!("id counter exhausted, reusing a free id");
            self.tasks
                .iter()
                .flat_map(|t| std::iter::once(t.id.0).chain(t.subtasks.iter().map(|s| s.id)))
                .collect()
        } else {
            HashSet::new()
        };
        schema::claim_id(&mut self.next_id, &used)
    }

    fn next_created_at(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_created_at = now.max(self.last_created_at + 1);
        self.last_created_at
    }

    /// Create a task and put it at the front of the collection.
    pub fn add_task(&mut self, title: impl Into<String>) -> TaskId {
        let id = TaskId(self.allocate_id());
        let created_at = self.next_created_at();
        let mut task = Task::new(id, title, created_at);
        task.position = Some(self.grid.initial_position(self.tasks.len()));
        debug!(%id, title = %task.title, "task added");
        self.tasks.insert(0, task);
        self.record(Change::Added(id));
        id
    }

    /// Flip a task between todo and done.
    pub fn toggle_task(&mut self, id: TaskId) -> bool {
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        task.status = task.status.toggled();
        debug!(%id, status = ?task.status, "task toggled");
        self.record(Change::Updated(id));
        true
    }

    /// Remove a task and strip it from every other task's dependencies.
    pub fn delete_task(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        if self.tasks.len() == before {
            return false;
        }
        for task in self.tasks.iter_mut() {
            task.dependencies.retain(|&d| d != id);
        }
        debug!(%id, "task deleted");
        self.record(Change::Removed(id));
        true
    }

    pub fn update_task(&mut self, id: TaskId, patch: TaskPatch) -> bool {
        if patch.is_empty() {
            return self.get(id).is_some();
        }
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        patch.apply(task);
        self.record(Change::Updated(id));
        true
    }

    /// Store a snapped canvas position.
    pub fn update_task_position(&mut self, id: TaskId, position: Position) -> bool {
        let snapped = self.grid.snap(position);
        let Some(task) = self.get_mut(id) else {
            return false;
        };
        task.position = Some(snapped);
        self.record(Change::Moved(id));
        true
    }

    /// Move a task to the first free slot near `position`.
    pub fn place_task(&mut self, id: TaskId, position: Position) -> Option<Position> {
        self.get(id)?;
        let slot = self.grid.get_non_overlapping_position(id, position, &self.tasks);
        self.update_task_position(id, slot);
        Some(slot)
    }

    pub fn add_subtask(&mut self, task_id: TaskId, title: impl Into<String>) -> Option<u64> {
        self.get(task_id)?;
        let id = self.allocate_id();
        let task = self.get_mut(task_id)?;
        task.subtasks.push(Subtask { id, title: title.into(), done: false });
        self.record(Change::Updated(task_id));
        Some(id)
    }

    pub fn toggle_subtask(&mut self, task_id: TaskId, subtask_id: u64) -> bool {
        let Some(subtask) = self
            .get_mut(task_id)
            .and_then(|t| t.subtasks.iter_mut().find(|s| s.id == subtask_id))
        else {
            return false;
        };
        subtask.done = !subtask.done;
        self.record(Change::Updated(task_id));
        true
    }

    pub fn delete_subtask(&mut self, task_id: TaskId, subtask_id: u64) -> bool {
        let Some(task) = self.get_mut(task_id) else {
            return false;
        };
        let before = task.subtasks.len();
        task.subtasks.retain(|s| s.id != subtask_id);
        if task.subtasks.len() == before {
            return false;
        }
        self.record(Change::Updated(task_id));
        true
    }

    /// Give every task a snapped position, laying out the ones that have none.
    ///
    /// Returns the number of tasks whose position changed.
    pub fn cleanup_positions(&mut self) -> usize {
        let mut moved = Vec::new();
        for (index, task) in self.tasks.iter_mut().enumerate() {
            let next = match task.position {
                Some(p) if self.grid.is_snapped(p) => continue,
                Some(p) => self.grid.snap(p),
                None => self.grid.initial_position(index),
            };
            task.position = Some(next);
            moved.push(task.id);
        }
        for &id in &moved {
            self.record(Change::Moved(id));
        }
        if !moved.is_empty() {
            debug!(count = moved.len(), "positions cleaned up");
        }
        moved.len()
    }
}

/// Copy the store file into a sibling `backup/` directory with a timestamped name.
pub fn create_backup(db_path: &Path) -> Result<PathBuf> {
    if !db_path.exists() {
        return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "task store does not exist").into());
    }

    let parent_dir = db_path.parent().unwrap_or_else(|| Path::new("."));
    let backup_dir = parent_dir.join("backup");
    fs::create_dir_all(&backup_dir)?;

    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let db_filename = db_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("tasks.json");
    let backup_path = backup_dir.join(format!("{timestamp}_{db_filename}"));

    fs::copy(db_path, &backup_path)?;
    Ok(backup_path)
}
