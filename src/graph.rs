//! Dependency operations and cycle detection.
//!
//! Edges are not stored on their own: task B depends on task A when A's id is in
//! `B.dependencies`. Every insertion is checked so the relation stays acyclic.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use crate::db::{Change, Database};
use crate::task::{Task, TaskId};

/// Why `add_dependency` refused an edge.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DependencyError {
    #[error("a task cannot depend on itself")]
    SelfDependency,

    #[error("task {0} does not exist")]
    UnknownTask(TaskId),

    #[error("task {dependent} already depends on task {predecessor}")]
    Duplicate { predecessor: TaskId, dependent: TaskId },

    #[error("task {dependent} depending on task {predecessor} would create a cycle")]
    Cycle { predecessor: TaskId, dependent: TaskId },
}

/// Map each task id to the ids of the tasks that depend on it.
pub fn dependents_map(tasks: &[Task]) -> HashMap<TaskId, Vec<TaskId>> {
    let mut map: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for task in tasks {
        for &dep in &task.dependencies {
            map.entry(dep).or_default().push(task.id);
        }
    }
    map
}

/// Ids of the tasks that directly depend on `id`, in collection order.
pub fn dependents_of(tasks: &[Task], id: TaskId) -> Vec<TaskId> {
    tasks.iter().filter(|t| t.depends_on(id)).map(|t| t.id).collect()
}

/// Whether recording "`target` depends on `source`" would close a cycle.
///
/// True when `source` is reachable from `target` along the dependents relation of
/// the current graph.
pub fn would_create_cycle(tasks: &[Task], source: TaskId, target: TaskId) -> bool {
    let dependents = dependents_map(tasks);
    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut stack = vec![target];

    while let Some(current) = stack.pop() {
        if current == source {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = dependents.get(&current) {
            stack.extend(next.iter().copied().filter(|id| !visited.contains(id)));
        }
    }
    false
}

impl Database {
    /// Record that `target` depends on `source`.
    pub fn add_dependency(&mut self, source: TaskId, target: TaskId) -> Result<(), DependencyError> {
        let result = self.check_dependency(source, target);
        if let Err(e) = result {
            debug!(%source, %target, "dependency rejected: {e}");
            return Err(e);
        }
        if let Some(task) = self.get_mut(target) {
            task.dependencies.push(source);
        }
        debug!(%source, %target, "dependency added");
        self.record(Change::Updated(target));
        Ok(())
    }

    fn check_dependency(&self, source: TaskId, target: TaskId) -> Result<(), DependencyError> {
        if source == target {
            return Err(DependencyError::SelfDependency);
        }
        if self.get(source).is_none() {
            return Err(DependencyError::UnknownTask(source));
        }
        let Some(dependent) = self.get(target) else {
            return Err(DependencyError::UnknownTask(target));
        };
        if dependent.depends_on(source) {
            return Err(DependencyError::Duplicate { predecessor: source, dependent: target });
        }
        if would_create_cycle(self.tasks(), source, target) {
            return Err(DependencyError::Cycle { predecessor: source, dependent: target });
        }
        Ok(())
    }

    /// Drop the edge if it exists. Returns whether anything was removed.
    pub fn remove_dependency(&mut self, source: TaskId, target: TaskId) -> bool {
        let Some(task) = self.get_mut(target) else {
            return false;
        };
        let before = task.dependencies.len();
        task.dependencies.retain(|&d| d != source);
        if task.dependencies.len() == before {
            return false;
        }
        debug!(%source, %target, "dependency removed");
        self.record(Change::Updated(target));
        true
    }
}
