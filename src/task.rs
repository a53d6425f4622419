//! Task data structure and related functionality.
//!
//! This module defines the `Task` entity, its owned `Subtask` checklist items, and the
//! `TaskPatch` used for field-by-field updates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fields::*;

/// Opaque task identifier. Assigned once and never reused within a store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A work item that may depend on other tasks.
///
/// `dependencies` lists the predecessors of this task: every id in it must be done
/// before this task is unblocked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: Status,
    /// Unix milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

impl Task {
    /// Create a task with every optional field defaulted.
    pub fn new(id: TaskId, title: impl Into<String>, created_at: i64) -> Self {
        Task {
            id,
            title: title.into(),
            status: Status::Todo,
            created_at,
            position: None,
            dependencies: Vec::new(),
            due_date: None,
            description: String::new(),
            subtasks: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == Status::Done
    }

    pub fn depends_on(&self, id: TaskId) -> bool {
        self.dependencies.contains(&id)
    }
}

/// A checklist item owned by exactly one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

/// Field-by-field overwrite for `Database::update_task`.
///
/// `None` leaves a field untouched. `due_date: Some(None)` clears the deadline, and
/// `subtasks` replaces the whole checklist.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub subtasks: Option<Vec<Subtask>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
            && self.subtasks.is_none()
    }

    /// Merge the provided fields into `task`.
    pub fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(due) = self.due_date {
            task.due_date = due;
        }
        if let Some(subtasks) = self.subtasks {
            task.subtasks = subtasks;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_overwrites_only_provided_fields() {
        let mut task = Task::new(TaskId(1), "Write report", 10);
        task.description = "draft".into();
        task.due_date = Some(Utc::now());

        TaskPatch {
            title: Some("Write final report".into()),
            due_date: Some(None),
            ..Default::default()
        }
        .apply(&mut task);

        assert_eq!(task.title, "Write final report");
        assert_eq!(task.description, "draft");
        assert_eq!(task.due_date, None);
        assert_eq!(task.status, Status::Todo);
    }

    #[test]
    fn test_task_serialises_camel_case() {
        let task = Task::new(TaskId(7), "Ship", 1_700_000_000_000);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["createdAt"], 1_700_000_000_000i64);
        assert!(json["dueDate"].is_null());
        assert_eq!(json["status"], "todo");
    }
}
