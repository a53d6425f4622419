//! Read-only views derived from the task collection.
//!
//! Everything here is a pure function of the current tasks (and, for deadlines, the
//! current instant). Nothing is cached; the collections are small enough to recompute
//! on every render.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::fields::*;
use crate::task::{Task, TaskId};

/// Deadlines closer than this are urgent.
pub const URGENT_WITHIN_HOURS: i64 = 24;
/// Deadlines closer than this are due soon.
pub const SOON_WITHIN_HOURS: i64 = 72;

fn status_index(all: &[Task]) -> HashMap<TaskId, Status> {
    all.iter().map(|t| (t.id, t.status)).collect()
}

/// A task is blocked while any existing dependency is still todo.
///
/// Dependencies pointing at tasks that no longer exist never block.
pub fn is_task_blocked(task: &Task, all: &[Task]) -> bool {
    if task.dependencies.is_empty() {
        return false;
    }
    let statuses = status_index(all);
    task.dependencies
        .iter()
        .any(|id| statuses.get(id) == Some(&Status::Todo))
}

/// The todo tasks currently blocking `task`, in dependency order.
pub fn blockers<'a>(task: &Task, all: &'a [Task]) -> Vec<&'a Task> {
    task.dependencies
        .iter()
        .filter_map(|id| all.iter().find(|t| t.id == *id))
        .filter(|t| t.status == Status::Todo)
        .collect()
}

/// Readiness bucket: 0 without dependencies, 1 when every referenced dependency is
/// done, 2 otherwise.
pub fn readiness_bucket(task: &Task, statuses: &HashMap<TaskId, Status>) -> u8 {
    if task.dependencies.is_empty() {
        return 0;
    }
    let all_done = task
        .dependencies
        .iter()
        .filter_map(|id| statuses.get(id))
        .all(|s| *s == Status::Done);
    if all_done {
        1
    } else {
        2
    }
}

/// Tasks ordered for the list view: ready tasks first, newest first within a bucket.
///
/// This surfaces actionable work; it is not a topological order, so a blocker can be
/// listed below the task it blocks.
pub fn get_sorted_tasks(tasks: &[Task]) -> Vec<&Task> {
    let statuses = status_index(tasks);
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|a, b| {
        readiness_bucket(a, &statuses)
            .cmp(&readiness_bucket(b, &statuses))
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    sorted
}

/// Classify a deadline against `now` using elapsed time, not calendar days.
pub fn get_due_date_status(due: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<DueStatus> {
    let due = due?;
    let remaining = due - now;
    let status = if remaining < Duration::zero() {
        DueStatus::Overdue
    } else if remaining <= Duration::hours(URGENT_WITHIN_HOURS) {
        DueStatus::Urgent
    } else if remaining <= Duration::hours(SOON_WITHIN_HOURS) {
        DueStatus::Soon
    } else {
        DueStatus::Normal
    };
    Some(status)
}

pub fn get_subtask_progress(task: &Task) -> SubtaskProgress {
    SubtaskProgress {
        done: task.subtasks.iter().filter(|s| s.done).count(),
        total: task.subtasks.len(),
    }
}
