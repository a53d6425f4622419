//! Parsing and formatting helpers shared by the CLI and the TUI.
//!
//! Covers human due-date input, relative due formatting, table printing and task
//! identifier resolution.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::fields::*;
use crate::selectors::{get_due_date_status, get_subtask_progress, is_task_blocked};
use crate::task::{Task, TaskId};

/// Parse human-readable due date input.
///
/// Supports:
/// - "today", "tomorrow", "yesterday" (end of that local day)
/// - "in 3h", "in 2d", "in 1w" (relative to now)
/// - "YYYY-MM-DD" (end of that local day)
/// - RFC 3339 timestamps
pub fn parse_due_input(s: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let raw = s.trim();
    let s = raw.to_lowercase();
    let today = now.with_timezone(&Local).date_naive();

    match s.as_str() {
        "today" => return end_of_local_day(today),
        "tomorrow" => return end_of_local_day(today + Duration::days(1)),
        "yesterday" => return end_of_local_day(today - Duration::days(1)),
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        let rest = rest.trim();
        let amount = |suffix: &str| rest.strip_suffix(suffix).and_then(|n| n.trim().parse::<i64>().ok());
        let delta = if let Some(h) = amount("h") {
            Duration::try_hours(h)
        } else if let Some(d) = amount("d") {
            Duration::try_days(d)
        } else if let Some(w) = amount("w") {
            Duration::try_weeks(w)
        } else {
            None
        };
        return delta.and_then(|d| now.checked_add_signed(d));
    }

    if let Ok(date) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return end_of_local_day(date);
    }

    DateTime::parse_from_rfc3339(raw).ok().map(|d| d.with_timezone(&Utc))
}

fn end_of_local_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    let end = date.and_time(NaiveTime::from_hms_opt(23, 59, 59)?);
    Local
        .from_local_datetime(&end)
        .earliest()
        .map(|d| d.with_timezone(&Utc))
}

/// Format a deadline relative to now ("in 3h", "in 2d", "5h late").
pub fn format_due_relative(due: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(due) = due else {
        return "-".into();
    };
    let delta = due - now;
    let (magnitude, late) = if delta < Duration::zero() { (-delta, true) } else { (delta, false) };
    let amount = if magnitude >= Duration::days(1) {
        format!("{}d", magnitude.num_days())
    } else if magnitude >= Duration::hours(1) {
        format!("{}h", magnitude.num_hours())
    } else {
        format!("{}m", magnitude.num_minutes())
    };
    if late {
        format!("{amount} late")
    } else {
        format!("in {amount}")
    }
}

/// Format a task status for display.
pub fn format_status(s: Status) -> &'static str {
    match s {
        Status::Todo => "Todo",
        Status::Done => "Done",
    }
}

/// Format a deadline class for display.
pub fn format_due_status(s: Option<DueStatus>) -> &'static str {
    match s {
        Some(DueStatus::Overdue) => "Overdue",
        Some(DueStatus::Urgent) => "Urgent",
        Some(DueStatus::Soon) => "Soon",
        Some(DueStatus::Normal) => "Normal",
        None => "-",
    }
}

pub fn format_progress(p: SubtaskProgress) -> String {
    if p.total == 0 {
        "-".into()
    } else {
        format!("{}/{}", p.done, p.total)
    }
}

pub fn format_ids(ids: &[TaskId]) -> String {
    if ids.is_empty() {
        "-".into()
    } else {
        ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
    }
}

/// Print tasks in a formatted table.
pub fn print_table(tasks: &[&Task], all: &[Task]) {
    println!(
        "{:<5} {:<6} {:<7} {:<9} {:<10} {:<5} {}",
        "ID", "Status", "Blocked", "Due", "", "Subs", "Title [deps]"
    );
    let now = Utc::now();
    for t in tasks {
        let deps = if t.dependencies.is_empty() {
            String::new()
        } else {
            format!(" [after {}]", format_ids(&t.dependencies))
        };
        println!(
            "{:<5} {:<6} {:<7} {:<9} {:<10} {:<5} {}{}",
            t.id,
            format_status(t.status),
            if is_task_blocked(t, all) { "yes" } else { "" },
            format_due_status(get_due_date_status(t.due_date, now)),
            format_due_relative(t.due_date, now),
            format_progress(get_subtask_progress(t)),
            truncate(&t.title, 60),
            deps
        );
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}

/// Resolve a task identifier (either ID or title) to a task ID.
/// Ambiguous titles are rejected with a list of candidates.
pub fn resolve_task_identifier(identifier: &str, db: &Database) -> Result<TaskId> {
    if let Ok(raw) = identifier.trim().parse::<u64>() {
        let id = TaskId(raw);
        return match db.get(id) {
            Some(_) => Ok(id),
            None => Err(Error::TaskNotFound(format!("Task with ID {id} not found"))),
        };
    }

    let wanted = identifier.trim().to_lowercase();
    let matches: Vec<&Task> = db
        .tasks()
        .iter()
        .filter(|task| task.title.to_lowercase() == wanted)
        .collect();

    match matches.len() {
        0 => Err(Error::TaskNotFound(format!("No task found with title '{identifier}'"))),
        1 => Ok(matches[0].id),
        _ => {
            let mut msg = format!("Multiple tasks found with title '{identifier}':\n");
            for task in matches {
                msg.push_str(&format!("  ID {}: {} ({})\n", task.id, task.title, format_status(task.status)));
            }
            msg.push_str("Please use the specific ID instead.");
            Err(Error::InvalidArgument(msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relative_durations() {
        let now = Utc::now();
        assert_eq!(parse_due_input("in 2h", now), Some(now + Duration::hours(2)));
        assert_eq!(parse_due_input("In 3D", now), Some(now + Duration::days(3)));
        assert_eq!(parse_due_input("in 1w", now), Some(now + Duration::weeks(1)));
        assert_eq!(parse_due_input("in x d", now), None);
        assert_eq!(parse_due_input("in 3y", now), None);
    }

    #[test]
    fn test_parse_named_days_are_end_of_day() {
        let now = Utc::now();
        let today = parse_due_input("today", now).unwrap();
        let tomorrow = parse_due_input("tomorrow", now).unwrap();
        assert!(today >= now - Duration::seconds(1));
        assert!(tomorrow > today);
        assert!(parse_due_input("yesterday", now).unwrap() < now);
    }

    #[test]
    fn test_parse_absolute_formats() {
        let now = Utc::now();
        let date = parse_due_input("2030-01-15", now).unwrap();
        assert_eq!(date.with_timezone(&Local).date_naive(), NaiveDate::from_ymd_opt(2030, 1, 15).unwrap());
        let ts = parse_due_input("2030-01-15T10:00:00Z", now).unwrap();
        assert_eq!(ts.timestamp(), Utc.with_ymd_and_hms(2030, 1, 15, 10, 0, 0).unwrap().timestamp());
        assert_eq!(parse_due_input("someday", now), None);
    }

    #[test]
    fn test_format_due_relative() {
        let now = Utc::now();
        assert_eq!(format_due_relative(None, now), "-");
        assert_eq!(format_due_relative(Some(now + Duration::days(3)), now), "in 3d");
        assert_eq!(format_due_relative(Some(now + Duration::minutes(150)), now), "in 2h");
        assert_eq!(format_due_relative(Some(now - Duration::hours(5)), now), "5h late");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer title", 6), "a lon…");
    }

    #[test]
    fn test_resolve_by_id_and_title() {
        let mut db = Database::default();
        let a = db.add_task("Write docs");
        db.add_task("Review");
        db.add_task("Review");

        assert_eq!(resolve_task_identifier(&a.to_string(), &db).unwrap(), a);
        assert_eq!(resolve_task_identifier("write DOCS", &db).unwrap(), a);
        assert!(matches!(resolve_task_identifier("999", &db), Err(Error::TaskNotFound(_))));
        assert!(matches!(resolve_task_identifier("nothing", &db), Err(Error::TaskNotFound(_))));
        assert!(matches!(resolve_task_identifier("review", &db), Err(Error::InvalidArgument(_))));
    }
}
