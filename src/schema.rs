//! Versioned on-disk layout of the task store and its migrations.
//!
//! The store is one JSON record: `{ "version", "nextId", "tasks" }`. Records written by
//! older versions are upgraded by [`migrate`], a pure function over JSON values, and
//! then passed once through [`normalize`] so the rest of the crate can rely on every
//! field being present and every edge being valid.
//!
//! Version history:
//! - 1: tasks carry `id`, `title`, `completed` and `createdAt` (a bare array is also
//!   accepted as version 1).
//! - 2: `status` replaces `completed`; `dependencies` and `position` appear.
//! - 3: `dueDate`, `description` and `subtasks` appear.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::graph::would_create_cycle;
use crate::layout::Grid;
use crate::task::{Task, TaskId};

pub const CURRENT_VERSION: u32 = 3;

/// The record written to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub version: u32,
    #[serde(default = "default_next_id")]
    pub next_id: u64,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

fn default_next_id() -> u64 {
    1
}

impl Default for PersistedState {
    fn default() -> Self {
        PersistedState {
            version: CURRENT_VERSION,
            next_id: default_next_id(),
            tasks: Vec::new(),
        }
    }
}

/// Parse a stored record of any version into the current layout.
///
/// Returns the normalised record together with the version found on disk.
pub fn decode(raw: &str, grid: &Grid) -> Result<(PersistedState, u32)> {
    let value: Value = serde_json::from_str(raw)?;
    let (record, version) = split_version(value)?;
    if version > CURRENT_VERSION {
        warn!(version, current = CURRENT_VERSION, "task store written by a newer version");
    }
    let migrated = migrate(record, version, grid);
    Ok((normalize(into_state(migrated)?), version))
}

fn split_version(value: Value) -> Result<(Value, u32)> {
    match value {
        Value::Array(tasks) => Ok((json!({ "version": 1, "tasks": tasks }), 1)),
        Value::Object(map) => {
            let version = map
                .get("version")
                .and_then(Value::as_u64)
                .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
                .unwrap_or(1);
            Ok((Value::Object(map), version))
        }
        other => Err(Error::CorruptStore(format!(
            "expected an object or an array at the top level, found {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Upgrade a record stored at `from_version` to the current layout.
///
/// Only missing fields are filled in, so running it on an already current record
/// returns the record unchanged apart from the version tag.
pub fn migrate(record: Value, from_version: u32, grid: &Grid) -> Value {
    let mut record = match record {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let mut tasks = match record.remove("tasks") {
        Some(Value::Array(tasks)) => tasks,
        _ => Vec::new(),
    };

    for (index, task) in tasks.iter_mut().enumerate() {
        let Value::Object(task) = task else {
            continue;
        };
        normalise_id_fields(task);
        fill(task, "createdAt", json!(0));
        if from_version < 2 {
            upgrade_v1_task(task, index, grid);
        }
        if from_version < 3 {
            upgrade_v2_task(task);
        }
    }

    record.insert("version".into(), json!(CURRENT_VERSION));
    record.insert("tasks".into(), Value::Array(tasks));
    Value::Object(record)
}

/// v1 -> v2: `completed` becomes `status`; add `dependencies` and `position`.
fn upgrade_v1_task(task: &mut Map<String, Value>, index: usize, grid: &Grid) {
    let completed = task.remove("completed").and_then(|v| v.as_bool()).unwrap_or(false);
    fill(task, "status", json!(if completed { "done" } else { "todo" }));
    fill(task, "dependencies", json!([]));
    fill(task, "position", json!(grid.initial_position(index)));
}

/// v2 -> v3: add `dueDate`, `description` and `subtasks`.
fn upgrade_v2_task(task: &mut Map<String, Value>) {
    if let Some(ms) = task.get("dueDate").and_then(Value::as_i64) {
        let converted = DateTime::<Utc>::from_timestamp_millis(ms).map(|d| json!(d.to_rfc3339()));
        task.insert("dueDate".into(), converted.unwrap_or(Value::Null));
    }
    fill(task, "dueDate", Value::Null);
    fill(task, "description", json!(""));
    fill(task, "subtasks", json!([]));
}

/// Insert `value` when the key is missing or null.
fn fill(task: &mut Map<String, Value>, key: &str, value: Value) {
    match task.get(key) {
        Some(v) if !v.is_null() => {}
        _ => {
            task.insert(key.to_string(), value);
        }
    }
}

/// Older stores kept ids as decimal strings.
fn normalise_id_fields(task: &mut Map<String, Value>) {
    if let Some(id) = task.get_mut("id") {
        numeric_id(id);
    }
    if let Some(Value::Array(deps)) = task.get_mut("dependencies") {
        deps.iter_mut().for_each(numeric_id);
    }
}

fn numeric_id(value: &mut Value) {
    if let Some(n) = value.as_str().and_then(|s| s.trim().parse::<u64>().ok()) {
        *value = json!(n);
    }
}

/// Decode tasks one by one so a single malformed entry does not sink the store.
fn into_state(value: Value) -> Result<PersistedState> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RawState {
        #[serde(default)]
        next_id: Option<u64>,
        #[serde(default)]
        tasks: Vec<Value>,
    }

    let raw: RawState = serde_json::from_value(value)?;
    let mut tasks = Vec::with_capacity(raw.tasks.len());
    for (index, entry) in raw.tasks.into_iter().enumerate() {
        match serde_json::from_value::<Task>(entry) {
            Ok(task) => tasks.push(task),
            Err(e) => warn!(index, "dropping unreadable task: {e}"),
        }
    }
    Ok(PersistedState {
        version: CURRENT_VERSION,
        next_id: raw.next_id.unwrap_or_else(default_next_id),
        tasks,
    })
}

/// Never handed out as a task or subtask id, so `id + 1` cannot overflow.
pub const RESERVED_ID: u64 = u64::MAX;

/// Hand out `*next_id` and advance it. Once the counter is exhausted the lowest id
/// missing from `used` is returned instead.
pub fn claim_id(next_id: &mut u64, used: &HashSet<u64>) -> u64 {
    if *next_id < RESERVED_ID {
        let id = *next_id;
        *next_id += 1;
        return id;
    }
    (1..RESERVED_ID).find(|id| !used.contains(id)).unwrap_or(RESERVED_ID)
}

/// Enforce the model invariants on a decoded record.
///
/// Drops tasks with the reserved id, duplicate task ids, self edges, duplicate edges, edges to missing tasks and
/// any edge that would close a cycle (first writer wins, in collection order). Gives
/// duplicate or reserved subtask ids fresh values and lifts `next_id` above every id
/// in use.
pub fn normalize(mut state: PersistedState) -> PersistedState {
    let mut seen = HashSet::new();
    state.tasks.retain(|t| {
        if t.id.0 == RESERVED_ID {
            warn!(task = %t.id, "dropping task with reserved id");
            return false;
        }
        seen.insert(t.id)
    });

    let mut next_id = if state.next_id == RESERVED_ID {
        warn!("stored id counter is exhausted, recomputing it");
        1
    } else {
        state.next_id.max(1)
    };
    let mut used: HashSet<u64> = HashSet::new();
    for task in &state.tasks {
        next_id = next_id.max(task.id.0 + 1);
        used.insert(task.id.0);
        for sub in task.subtasks.iter().filter(|s| s.id != RESERVED_ID) {
            next_id = next_id.max(sub.id + 1);
            used.insert(sub.id);
        }
    }

    for task in state.tasks.iter_mut() {
        let mut sub_ids = HashSet::new();
        for sub in task.subtasks.iter_mut() {
            if sub.id == RESERVED_ID || !sub_ids.insert(sub.id) {
                sub.id = claim_id(&mut next_id, &used);
                sub_ids.insert(sub.id);
                used.insert(sub.id);
            }
        }
    }

    let wanted: Vec<Vec<TaskId>> = state
        .tasks
        .iter_mut()
        .map(|t| std::mem::take(&mut t.dependencies))
        .collect();
    for (index, deps) in wanted.into_iter().enumerate() {
        let target = state.tasks[index].id;
        for dep in deps {
            let valid = dep != target
                && seen.contains(&dep)
                && !state.tasks[index].depends_on(dep)
                && !would_create_cycle(&state.tasks, dep, target);
            if valid {
                state.tasks[index].dependencies.push(dep);
            } else {
                warn!(task = %target, dependency = %dep, "dropping invalid stored dependency");
            }
        }
    }

    state.version = CURRENT_VERSION;
    state.next_id = next_id;
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Position, Status};

    fn grid() -> Grid {
        Grid::default()
    }

    #[test]
    fn test_v1_bare_array_is_migrated() {
        let raw = r#"[
            {"id": "5", "title": "Old", "completed": true, "createdAt": 100},
            {"id": 6, "title": "Older", "createdAt": 50}
        ]"#;
        let (state, version) = decode(raw, &grid()).unwrap();
        assert_eq!(version, 1);
        assert_eq!(state.tasks.len(), 2);
        let old = &state.tasks[0];
        assert_eq!(old.id, TaskId(5));
        assert_eq!(old.status, Status::Done);
        assert_eq!(old.position, Some(grid().initial_position(0)));
        assert!(old.dependencies.is_empty());
        assert_eq!(old.description, "");
        assert!(old.subtasks.is_empty());
        assert_eq!(old.due_date, None);
        assert_eq!(state.tasks[1].status, Status::Todo);
        assert_eq!(state.tasks[1].position, Some(grid().initial_position(1)));
        assert_eq!(state.next_id, 7);
    }

    #[test]
    fn test_v2_record_gains_v3_fields() {
        let raw = r#"{
            "version": 2,
            "tasks": [
                {"id": 1, "title": "A", "status": "done", "createdAt": 1,
                 "dependencies": [], "position": {"x": 40.0, "y": 40.0}},
                {"id": 2, "title": "B", "status": "todo", "createdAt": 2,
                 "dependencies": [1], "position": null, "dueDate": 1700000000000}
            ]
        }"#;
        let (state, version) = decode(raw, &grid()).unwrap();
        assert_eq!(version, 2);
        assert_eq!(state.tasks[0].position, Some(Position::new(40.0, 40.0)));
        // v2 position backfill is not part of the v2 -> v3 step.
        assert_eq!(state.tasks[1].position, None);
        assert_eq!(state.tasks[1].dependencies, vec![TaskId(1)]);
        let due = state.tasks[1].due_date.unwrap();
        assert_eq!(due.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let v1 = json!({
            "version": 1,
            "tasks": [{"id": 1, "title": "A", "completed": false, "createdAt": 3}]
        });
        let once = migrate(v1.clone(), 1, &grid());
        let twice = migrate(once.clone(), 1, &grid());
        assert_eq!(once, twice);
        let current = migrate(once.clone(), CURRENT_VERSION, &grid());
        assert_eq!(once, current);
    }

    #[test]
    fn test_migrate_tolerates_missing_fields() {
        let record = json!({"tasks": [{"id": 3, "title": "Bare"}, "junk", 12]});
        let migrated = migrate(record, 1, &grid());
        let task = &migrated["tasks"][0];
        assert_eq!(task["createdAt"], 0);
        assert_eq!(task["status"], "todo");
        assert_eq!(task["subtasks"], json!([]));

        let state = into_state(migrated).unwrap();
        assert_eq!(state.tasks.len(), 1);
    }

    #[test]
    fn test_current_record_round_trips() {
        let mut a = Task::new(TaskId(1), "A", 10);
        a.position = Some(Position::new(40.0, 40.0));
        let mut b = Task::new(TaskId(2), "B", 20);
        b.dependencies = vec![TaskId(1)];
        b.position = Some(Position::new(300.0, 40.0));
        let state = PersistedState { version: CURRENT_VERSION, next_id: 3, tasks: vec![b, a] };

        let raw = serde_json::to_string(&state).unwrap();
        let (decoded, version) = decode(&raw, &grid()).unwrap();
        assert_eq!(version, CURRENT_VERSION);
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_normalize_repairs_edges() {
        let mut a = Task::new(TaskId(1), "A", 1);
        let mut b = Task::new(TaskId(2), "B", 2);
        a.dependencies = vec![TaskId(1), TaskId(2), TaskId(9)];
        b.dependencies = vec![TaskId(1), TaskId(1)];
        let dup = Task::new(TaskId(2), "B again", 3);
        let state = normalize(PersistedState { version: 3, next_id: 1, tasks: vec![a, b, dup] });

        assert_eq!(state.tasks.len(), 2);
        // a keeps 1 -> 2 (first seen); b's edge back to a would close a cycle.
        assert_eq!(state.tasks[0].dependencies, vec![TaskId(2)]);
        assert!(state.tasks[1].dependencies.is_empty());
        assert_eq!(state.next_id, 3);
    }

    #[test]
    fn test_normalize_reassigns_duplicate_subtask_ids() {
        let mut a = Task::new(TaskId(1), "A", 1);
        a.subtasks = vec![
            crate::task::Subtask { id: 4, title: "x".into(), done: false },
            crate::task::Subtask { id: 4, title: "y".into(), done: true },
        ];
        let state = normalize(PersistedState { version: 3, next_id: 1, tasks: vec![a] });
        let ids: Vec<u64> = state.tasks[0].subtasks.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![4, 5]);
        assert_eq!(state.next_id, 6);
    }

    #[test]
    fn test_reserved_ids_are_repaired() {
        let raw = r#"{
            "version": 3,
            "nextId": 18446744073709551615,
            "tasks": [
                {"id": 18446744073709551615, "title": "Broken", "status": "todo", "createdAt": 1},
                {"id": 4, "title": "Kept", "status": "todo", "createdAt": 2,
                 "subtasks": [{"id": 18446744073709551615, "title": "step"}]}
            ]
        }"#;
        let (state, _) = decode(raw, &grid()).unwrap();
        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.tasks[0].id, TaskId(4));
        let sub = state.tasks[0].subtasks[0].id;
        assert_ne!(sub, RESERVED_ID);
        assert_ne!(sub, 4);
        assert!(state.next_id > sub && state.next_id < RESERVED_ID);
    }

    #[test]
    fn test_claim_id_reuses_gaps_when_exhausted() {
        let mut next = 7;
        assert_eq!(claim_id(&mut next, &HashSet::new()), 7);
        assert_eq!(next, 8);

        let mut exhausted = RESERVED_ID;
        let used: HashSet<u64> = [1, 2, 4].into_iter().collect();
        assert_eq!(claim_id(&mut exhausted, &used), 3);
        assert_eq!(exhausted, RESERVED_ID);
    }

    #[test]
    fn test_huge_version_counts_as_newer() {
        let raw = r#"{"version": 1099511627776, "nextId": 1, "tasks": []}"#;
        let (_, version) = decode(raw, &grid()).unwrap();
        assert_eq!(version, u32::MAX);
    }

    #[test]
    fn test_scalar_top_level_is_corrupt() {
        assert!(matches!(decode("42", &grid()), Err(Error::CorruptStore(_))));
        assert!(matches!(decode("nope", &grid()), Err(Error::Json(_))));
    }
}
