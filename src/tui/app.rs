//! Main application logic for the terminal user interface.
//!
//! This module contains the `App` struct which owns the session, handles key input,
//! renders the list, canvas and detail views, and routes every change through
//! [`Session::apply`] so the store is written after each edit.

use std::io;
use std::time::Duration;

use chrono::{Local, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};

use crate::display::{
    format_due_relative, format_due_status, format_ids, format_progress, format_status, parse_due_input,
};
use crate::graph::dependents_of;
use crate::selectors::{blockers, get_due_date_status, get_sorted_tasks, get_subtask_progress, is_task_blocked};
use crate::session::Session;
use crate::task::{Task, TaskId, TaskPatch};
use crate::tui::{
    canvas::{nudge, render_canvas, Viewport},
    colors::{due_color, ACCENT, BLOCKED, DONE_GREY, LINK},
    enums::{AppState, BaseView, PromptKind},
    input::InputField,
    utils::centered_rect,
};

/// Main application state for the terminal user interface.
pub struct App {
    state: AppState,
    base: BaseView,
    session: Session,
    task_list_state: TableState,
    sorted: Vec<TaskId>,
    input: InputField,
    /// State to return to when a prompt closes.
    prompt_return: AppState,
    status_message: String,
    link_source: Option<TaskId>,
    subtask_cursor: usize,
    viewport: Viewport,
    canvas_area: Rect,
}

impl App {
    pub fn new(session: Session) -> Self {
        let mut app = App {
            state: AppState::TaskList,
            base: BaseView::List,
            session,
            task_list_state: TableState::default(),
            sorted: Vec::new(),
            input: InputField::new(),
            prompt_return: AppState::TaskList,
            status_message: String::new(),
            link_source: None,
            subtask_cursor: 0,
            viewport: Viewport::default(),
            canvas_area: Rect::default(),
        };
        app.refresh();
        app
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Rebuild the sorted id list and keep the selection on the same task when possible.
    fn refresh(&mut self) {
        self.sorted = get_sorted_tasks(self.session.db().tasks()).iter().map(|t| t.id).collect();

        let index = self
            .session
            .selected()
            .and_then(|id| self.sorted.iter().position(|&s| s == id))
            .or_else(|| {
                // Fall back to the row the deleted task used to occupy.
                let previous = self.task_list_state.selected()?;
                (!self.sorted.is_empty()).then(|| previous.min(self.sorted.len() - 1))
            });
        self.task_list_state.select(index);
        self.session.select(index.map(|i| self.sorted[i]));

        if let Some(task) = self.session.selected_task() {
            self.subtask_cursor = self.subtask_cursor.min(task.subtasks.len().saturating_sub(1));
        }
        if self.link_source.is_some_and(|id| self.session.db().get(id).is_none()) {
            self.link_source = None;
        }
    }

    /// Apply a mutation through the session, then refresh derived view state.
    fn apply<R>(&mut self, mutation: impl FnOnce(&mut crate::db::Database) -> R) -> R {
        let result = self.session.apply(mutation);
        self.refresh();
        result
    }

    fn set_status_message(&mut self, msg: impl Into<String>) {
        self.status_message = msg.into();
    }

    fn select_offset(&mut self, delta: isize) {
        if self.sorted.is_empty() {
            return;
        }
        let current = self.task_list_state.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, self.sorted.len() as isize - 1) as usize;
        self.task_list_state.select(Some(next));
        self.session.select(Some(self.sorted[next]));
        self.subtask_cursor = 0;
        self.follow_selection();
    }

    fn follow_selection(&mut self) {
        if let Some(p) = self.session.selected_task().and_then(|t| t.position) {
            let grid = self.session.db().grid().clone();
            self.viewport.follow(p, &grid, self.canvas_area);
        }
    }

    fn open_prompt(&mut self, kind: PromptKind, initial: &str) {
        self.input = InputField::with_value(initial);
        self.prompt_return = self.state;
        self.state = AppState::Prompt(kind);
    }

    fn toggle_selected(&mut self) {
        if let Some(id) = self.session.selected() {
            self.apply(|db| db.toggle_task(id));
        }
    }

    /// Toggle the edge "selected depends on link source".
    fn finish_link(&mut self) {
        let (Some(source), Some(target)) = (self.link_source, self.session.selected()) else {
            return;
        };
        let already = self.session.db().get(target).is_some_and(|t| t.depends_on(source));
        if already {
            self.apply(|db| db.remove_dependency(source, target));
            self.set_status_message(format!("Task {target} no longer depends on task {source}"));
        } else {
            match self.apply(|db| db.add_dependency(source, target)) {
                Ok(()) => self.set_status_message(format!("Task {target} now depends on task {source}")),
                Err(e) => self.set_status_message(format!("Cannot link: {e}")),
            }
        }
        self.link_source = None;
    }

    fn submit_prompt(&mut self, kind: PromptKind) {
        let text = self.input.text().to_string();
        let selected = self.session.selected();
        match kind {
            PromptKind::AddTask => {
                if text.is_empty() {
                    self.set_status_message("Title cannot be empty");
                    return;
                }
                let id = self.apply(|db| db.add_task(text));
                self.session.select(Some(id));
                self.refresh();
                self.follow_selection();
                self.set_status_message(format!("Added task {id}"));
            }
            PromptKind::EditTitle => {
                let Some(id) = selected else { return };
                if text.is_empty() {
                    self.set_status_message("Title cannot be empty");
                    return;
                }
                let patch = TaskPatch { title: Some(text), ..Default::default() };
                self.apply(|db| db.update_task(id, patch));
            }
            PromptKind::EditDue => {
                let Some(id) = selected else { return };
                let due = if text.is_empty() {
                    None
                } else {
                    match parse_due_input(&text, Utc::now()) {
                        Some(d) => Some(d),
                        None => {
                            self.set_status_message(format!("Unrecognised due date '{text}'"));
                            return;
                        }
                    }
                };
                let patch = TaskPatch { due_date: Some(due), ..Default::default() };
                self.apply(|db| db.update_task(id, patch));
            }
            PromptKind::AddSubtask => {
                let Some(id) = selected else { return };
                if text.is_empty() {
                    return;
                }
                self.apply(|db| db.add_subtask(id, text));
                if let Some(task) = self.session.selected_task() {
                    self.subtask_cursor = task.subtasks.len().saturating_sub(1);
                }
            }
        }
        self.state = self.prompt_return;
    }

    /// Keys shared by the list and canvas views. Returns `None` when the key is not handled.
    fn handle_common_input(&mut self, key: KeyEvent) -> Option<bool> {
        if self.link_source.is_some() {
            match key.code {
                KeyCode::Esc => {
                    self.link_source = None;
                    self.set_status_message("Link cancelled");
                    return Some(false);
                }
                KeyCode::Enter => {
                    self.finish_link();
                    return Some(false);
                }
                _ => {}
            }
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Some(true),
            KeyCode::Char('j') | KeyCode::Down if self.state == AppState::TaskList => self.select_offset(1),
            KeyCode::Char('k') | KeyCode::Up if self.state == AppState::TaskList => self.select_offset(-1),
            KeyCode::Char('n') => self.select_offset(1),
            KeyCode::Char('p') => self.select_offset(-1),
            KeyCode::Char(' ') => self.toggle_selected(),
            KeyCode::Char('a') => self.open_prompt(PromptKind::AddTask, ""),
            KeyCode::Char('e') => {
                let title = self.session.selected_task()?.title.clone();
                self.open_prompt(PromptKind::EditTitle, &title);
            }
            KeyCode::Char('D') => {
                let due = self.session.selected_task()?.due_date;
                let initial = due.map(|d| d.with_timezone(&Local).to_rfc3339()).unwrap_or_default();
                self.open_prompt(PromptKind::EditDue, &initial);
            }
            KeyCode::Char('d') => {
                self.session.selected_task()?;
                self.state = AppState::Confirm;
            }
            KeyCode::Char('l') => {
                self.link_source = self.session.selected();
                if let Some(id) = self.link_source {
                    self.set_status_message(format!(
                        "Linking from task {id}: select the task that depends on it and press Enter"
                    ));
                }
            }
            KeyCode::Char('c') => {
                let moved = self.apply(|db| db.cleanup_positions());
                self.set_status_message(format!("Repositioned {moved} task(s)"));
            }
            KeyCode::Char('h') | KeyCode::Char('?') | KeyCode::F(1) => self.state = AppState::Help,
            KeyCode::Enter => {
                self.session.selected_task()?;
                self.subtask_cursor = 0;
                self.state = AppState::TaskDetail;
            }
            _ => return None,
        }
        Some(false)
    }

    /// Handle keyboard input when in the task list view.
    fn handle_task_list_input(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Tab {
            self.base = BaseView::Canvas;
            self.state = AppState::Canvas;
            self.follow_selection();
            return false;
        }
        self.handle_common_input(key).unwrap_or(false)
    }

    /// Arrows move the selected node one grid unit; with Shift they move one node
    /// pitch and settle into the nearest free slot.
    fn handle_canvas_input(&mut self, key: KeyEvent) -> bool {
        let delta = match key.code {
            KeyCode::Left => Some((-1, 0)),
            KeyCode::Right => Some((1, 0)),
            KeyCode::Up => Some((0, -1)),
            KeyCode::Down => Some((0, 1)),
            _ => None,
        };

        if let Some((dx, dy)) = delta {
            let Some((id, position)) = self.session.selected_task().and_then(|t| Some((t.id, t.position?))) else {
                return false;
            };
            let grid = self.session.db().grid().clone();
            if key.modifiers.contains(KeyModifiers::SHIFT) {
                let step_x = grid.snap_to_grid(grid.node_width + grid.size);
                let step_y = grid.snap_to_grid(grid.node_height + grid.size);
                let target = nudge(position, dx * (step_x / grid.size) as i32, dy * (step_y / grid.size) as i32, grid.size);
                self.apply(|db| db.place_task(id, target));
            } else {
                self.apply(|db| db.update_task_position(id, nudge(position, dx, dy, grid.size)));
            }
            self.follow_selection();
            return false;
        }

        if key.code == KeyCode::Tab {
            self.base = BaseView::List;
            self.state = AppState::TaskList;
            return false;
        }
        self.handle_common_input(key).unwrap_or(false)
    }

    fn handle_detail_input(&mut self, key: KeyEvent) -> bool {
        let Some(task) = self.session.selected_task() else {
            self.state = self.base.state();
            return false;
        };
        let id = task.id;
        let subtask = task.subtasks.get(self.subtask_cursor).map(|s| s.id);
        let count = task.subtasks.len();

        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.state = self.base.state(),
            KeyCode::Char('j') | KeyCode::Down => {
                if self.subtask_cursor + 1 < count {
                    self.subtask_cursor += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => self.subtask_cursor = self.subtask_cursor.saturating_sub(1),
            KeyCode::Char(' ') => {
                if let Some(sub) = subtask {
                    self.apply(|db| db.toggle_subtask(id, sub));
                }
            }
            KeyCode::Char('x') => {
                if let Some(sub) = subtask {
                    self.apply(|db| db.delete_subtask(id, sub));
                }
            }
            KeyCode::Char('t') => self.toggle_selected(),
            KeyCode::Char('s') => self.open_prompt(PromptKind::AddSubtask, ""),
            KeyCode::Char('e') => {
                let title = task.title.clone();
                self.open_prompt(PromptKind::EditTitle, &title);
            }
            KeyCode::Char('D') => {
                let initial = task.due_date.map(|d| d.with_timezone(&Local).to_rfc3339()).unwrap_or_default();
                self.open_prompt(PromptKind::EditDue, &initial);
            }
            KeyCode::Char('d') => self.state = AppState::Confirm,
            _ => {}
        }
        false
    }

    fn handle_prompt_input(&mut self, kind: PromptKind, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => self.state = self.prompt_return,
            KeyCode::Enter => self.submit_prompt(kind),
            KeyCode::Char(c) => self.input.handle_char(c),
            KeyCode::Backspace => self.input.handle_backspace(),
            KeyCode::Delete => self.input.handle_delete(),
            KeyCode::Left => self.input.move_cursor_left(),
            KeyCode::Right => self.input.move_cursor_right(),
            KeyCode::Home => self.input.move_home(),
            KeyCode::End => self.input.move_end(),
            _ => {}
        }
        false
    }

    fn handle_confirm_input(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                if let Some(id) = self.session.selected() {
                    if self.apply(|db| db.delete_task(id)) {
                        self.set_status_message(format!("Deleted task {id}"));
                    }
                }
                self.state = self.base.state();
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => self.state = self.base.state(),
            _ => {}
        }
        false
    }

    /// Dispatch one key press. Returns true if the application should quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }
        self.status_message.clear();
        match self.state {
            AppState::TaskList => self.handle_task_list_input(key),
            AppState::Canvas => self.handle_canvas_input(key),
            AppState::TaskDetail => self.handle_detail_input(key),
            AppState::Prompt(kind) => self.handle_prompt_input(kind, key),
            AppState::Help => {
                self.state = self.base.state();
                false
            }
            AppState::Confirm => self.handle_confirm_input(key),
        }
    }

    /// Poll for a key event. Returns true if the application should quit.
    fn handle_input(&mut self) -> io::Result<bool> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(self.handle_key(key));
                }
            }
        }
        Ok(false)
    }

    /// Render the task list ordered by readiness.
    fn render_task_list(&mut self, f: &mut Frame, area: Rect) {
        let now = Utc::now();
        let tasks = self.session.db().tasks();

        let header_cells = ["ID", "Status", "Blocked", "Due", "", "Subs", "Deps", "Title"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD)));
        let header = Row::new(header_cells)
            .style(Style::default().bg(ACCENT).fg(Color::White))
            .height(1);

        let rows: Vec<Row> = self
            .sorted
            .iter()
            .filter_map(|&id| self.session.db().get(id))
            .map(|task| {
                let blocked = is_task_blocked(task, tasks);
                let due = get_due_date_status(task.due_date, now);
                let style = if Some(task.id) == self.link_source {
                    Style::default().fg(LINK).add_modifier(Modifier::BOLD)
                } else if task.is_done() {
                    Style::default().fg(DONE_GREY)
                } else if blocked {
                    Style::default().fg(BLOCKED)
                } else {
                    Style::default().fg(Color::White)
                };
                let due_style = match due {
                    Some(d) if !task.is_done() => Style::default().fg(due_color(d)),
                    _ => Style::default(),
                };

                Row::new(vec![
                    Cell::from(task.id.to_string()),
                    Cell::from(format_status(task.status)),
                    Cell::from(if blocked { "yes" } else { "" }),
                    Cell::from(format_due_status(due)).style(due_style),
                    Cell::from(format_due_relative(task.due_date, now)),
                    Cell::from(format_progress(get_subtask_progress(task))),
                    Cell::from(task.dependencies.len().to_string()),
                    Cell::from(task.title.as_str()),
                ])
                .style(style)
            })
            .collect();

        let widths = [
            Constraint::Length(5),  // ID
            Constraint::Length(7),  // Status
            Constraint::Length(8),  // Blocked
            Constraint::Length(8),  // Due class
            Constraint::Length(9),  // Due relative
            Constraint::Length(6),  // Subtasks
            Constraint::Length(5),  // Deps
            Constraint::Min(20),    // Title
        ];

        let title = match self.link_source {
            Some(id) => format!("Tasks - linking from #{id}: Enter toggles edge, Esc cancels"),
            None => format!("Tasks ({}) - Press 'h' for help", self.sorted.len()),
        };
        let table = Table::new(rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title(title))
            .row_highlight_style(Style::default().bg(Color::Gray).fg(Color::Black))
            .highlight_symbol(">> ");

        f.render_stateful_widget(table, area, &mut self.task_list_state);
    }

    /// Render the detailed view of the selected task.
    fn render_task_detail(&mut self, f: &mut Frame, area: Rect) {
        let Some(task) = self.session.selected_task() else {
            return;
        };
        let tasks = self.session.db().tasks();
        let now = Utc::now();
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let describe = |id: &TaskId| match self.session.db().get(*id) {
            Some(t) => format!("#{} {} ({})", t.id, t.title, format_status(t.status)),
            None => format!("#{id}"),
        };

        let mut text = vec![
            Line::from(vec![Span::styled("ID: ", bold), Span::raw(task.id.to_string())]),
            Line::from(vec![Span::styled("Title: ", bold), Span::raw(task.title.as_str())]),
            Line::from(vec![Span::styled("Status: ", bold), Span::raw(format_status(task.status))]),
            Line::from(vec![
                Span::styled("Due: ", bold),
                Span::raw(match task.due_date {
                    Some(d) => format!(
                        "{} ({}, {})",
                        d.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                        format_due_relative(Some(d), now),
                        format_due_status(get_due_date_status(Some(d), now))
                    ),
                    None => "-".to_string(),
                }),
            ]),
            Line::from(vec![Span::styled("Depends on: ", bold), Span::raw(format_ids(&task.dependencies))]),
        ];
        for dep in &task.dependencies {
            text.push(Line::from(format!("  {}", describe(dep))));
        }

        let waiting: Vec<&Task> = blockers(task, tasks);
        if !waiting.is_empty() {
            text.push(Line::from(Span::styled(
                format!("Blocked by {} unfinished task(s)", waiting.len()),
                Style::default().fg(BLOCKED),
            )));
        }

        let dependents = dependents_of(tasks, task.id);
        text.push(Line::from(vec![Span::styled("Needed by: ", bold), Span::raw(format_ids(&dependents))]));
        for dep in &dependents {
            text.push(Line::from(format!("  {}", describe(dep))));
        }

        text.push(Line::from(""));
        text.push(Line::from(Span::styled("Description:", bold)));
        text.push(Line::from(if task.description.is_empty() { "-" } else { task.description.as_str() }));

        text.push(Line::from(""));
        text.push(Line::from(vec![
            Span::styled("Checklist: ", bold),
            Span::raw(format_progress(get_subtask_progress(task))),
        ]));
        for (i, sub) in task.subtasks.iter().enumerate() {
            let marker = if i == self.subtask_cursor { ">> " } else { "   " };
            let check = if sub.done { "[x]" } else { "[ ]" };
            let style = if i == self.subtask_cursor {
                Style::default().bg(Color::Gray).fg(Color::Black)
            } else if sub.done {
                Style::default().fg(DONE_GREY)
            } else {
                Style::default()
            };
            text.push(Line::from(Span::styled(format!("{marker}{check} {}", sub.title), style)));
        }

        let paragraph = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title(
                "Task Details - [t]oggle, [e]dit, [D]ue, [s]ubtask add, [space] check, [x] remove, [d]elete, [Esc] back",
            ))
            .wrap(Wrap { trim: true });

        f.render_widget(paragraph, area);
    }

    fn render_prompt(&mut self, f: &mut Frame, area: Rect, kind: PromptKind) {
        let area = centered_rect(60, 20, area);
        f.render_widget(Clear, area);
        let block = Block::default()
            .borders(Borders::ALL)
            .title(kind.title())
            .border_style(Style::default().fg(Color::Yellow));
        let inner = block.inner(area);
        let paragraph = Paragraph::new(self.input.value.as_str()).block(block);
        f.render_widget(paragraph, area);

        let cursor_x = inner.x.saturating_add(self.input.cursor as u16).min(inner.right().saturating_sub(1));
        f.set_cursor_position((cursor_x, inner.y));
    }

    fn render_help(&mut self, f: &mut Frame, area: Rect) {
        let section = |title: &'static str| Line::from(Span::styled(title, Style::default().add_modifier(Modifier::BOLD)));
        let help_text = vec![
            section("Task List / Canvas:"),
            Line::from("  j/k, Up/Down Navigate tasks (list)"),
            Line::from("  n/p          Next/previous task"),
            Line::from("  Space        Toggle todo/done"),
            Line::from("  a            Add task"),
            Line::from("  e            Rename selected task"),
            Line::from("  D            Set or clear due date"),
            Line::from("  d            Delete selected task"),
            Line::from("  l            Link: the next task you pick will depend on this one"),
            Line::from("  Enter        View details (or finish a link)"),
            Line::from("  c            Tidy canvas positions"),
            Line::from("  Tab          Switch between list and canvas"),
            Line::from("  h/?/F1       Show this help"),
            Line::from("  q/Esc/Ctrl+C Quit"),
            Line::from(""),
            section("Canvas:"),
            Line::from("  Arrows       Move node one grid step"),
            Line::from("  Shift+Arrows Move one node over, avoiding overlaps"),
            Line::from(""),
            section("Task Detail View:"),
            Line::from("  j/k          Move in checklist"),
            Line::from("  Space        Check/uncheck item"),
            Line::from("  s            Add checklist item"),
            Line::from("  x            Remove checklist item"),
            Line::from("  t            Toggle task"),
            Line::from("  Esc/q        Back"),
            Line::from(""),
            section("Due Date Formats:"),
            Line::from("  YYYY-MM-DD   Specific date (end of day)"),
            Line::from("  today        End of today"),
            Line::from("  tomorrow     End of tomorrow"),
            Line::from("  in 3h/2d/1w  Relative to now"),
        ];

        let paragraph = Paragraph::new(help_text)
            .block(Block::default().borders(Borders::ALL).title("Help - Press any key to return"))
            .wrap(Wrap { trim: true });

        f.render_widget(paragraph, area);
    }

    fn render_confirm(&mut self, f: &mut Frame, area: Rect) {
        let area = centered_rect(50, 20, area);
        let block = Block::default()
            .title("Confirm")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red));
        f.render_widget(Clear, area);

        let target = self
            .session
            .selected_task()
            .map(|t| format!("Delete task #{} '{}'?", t.id, t.title))
            .unwrap_or_default();
        let text = vec![
            Line::from(""),
            Line::from(Span::styled(target, Style::default().add_modifier(Modifier::BOLD))),
            Line::from(""),
            Line::from("Tasks that depend on it lose the dependency."),
            Line::from(""),
            Line::from("Press 'y' to confirm, 'n' to cancel"),
        ];

        let paragraph = Paragraph::new(text)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });

        f.render_widget(paragraph, area);
    }

    fn render_status_bar(&mut self, f: &mut Frame, area: Rect) {
        let status_text = if !self.status_message.is_empty() {
            self.status_message.clone()
        } else {
            match self.state {
                AppState::TaskList | AppState::Canvas => {
                    let blocked = self
                        .session
                        .db()
                        .tasks()
                        .iter()
                        .filter(|t| is_task_blocked(t, self.session.db().tasks()))
                        .count();
                    format!(
                        "Tasks: {} | Blocked: {} | {} | Press 'h' for help",
                        self.sorted.len(),
                        blocked,
                        self.session.path().display()
                    )
                }
                AppState::TaskDetail => "Task Details".to_string(),
                AppState::Prompt(_) => "Enter to save, Esc to cancel".to_string(),
                AppState::Help => "Help".to_string(),
                AppState::Confirm => "Confirm Action".to_string(),
            }
        };

        let status = Paragraph::new(status_text)
            .style(Style::default().bg(ACCENT).fg(Color::White))
            .alignment(Alignment::Left);
        f.render_widget(status, area);
    }

    fn render_base(&mut self, f: &mut Frame, area: Rect) {
        match self.base {
            BaseView::List => self.render_task_list(f, area),
            BaseView::Canvas => self.render_canvas_view(f, area),
        }
    }

    fn render_canvas_view(&mut self, f: &mut Frame, area: Rect) {
        self.canvas_area = area;
        let db = self.session.db();
        render_canvas(f, area, &self.viewport, db.tasks(), db.grid(), self.session.selected(), self.link_source);
    }

    /// Main render function that dispatches to appropriate view renderers.
    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
            .split(f.area());

        match self.state {
            AppState::TaskList | AppState::Canvas => self.render_base(f, chunks[0]),
            AppState::TaskDetail => self.render_task_detail(f, chunks[0]),
            AppState::Prompt(kind) => {
                if self.prompt_return == AppState::TaskDetail {
                    self.render_task_detail(f, chunks[0]);
                } else {
                    self.render_base(f, chunks[0]);
                }
                self.render_prompt(f, chunks[0], kind);
            }
            AppState::Help => self.render_help(f, chunks[0]),
            AppState::Confirm => {
                self.render_base(f, chunks[0]);
                self.render_confirm(f, chunks[0]);
            }
        }

        self.render_status_bar(f, chunks[1]);
    }

    /// Main event loop for the TUI application.
    ///
    /// Deferred session work runs once the first frame is on screen.
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.session.has_deferred() {
                self.session.run_deferred();
                self.refresh();
                continue;
            }

            if self.handle_input()? {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Grid;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
    }

    fn app() -> (tempfile::TempDir, App) {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(&dir.path().join("tasks.json"), Grid::default());
        (dir, App::new(session))
    }

    fn add(app: &mut App, title: &str) -> TaskId {
        app.handle_key(key(KeyCode::Char('a')));
        type_text(app, title);
        app.handle_key(key(KeyCode::Enter));
        app.session.selected().unwrap()
    }

    #[test]
    fn test_add_task_through_prompt_selects_it() {
        let (dir, mut app) = app();
        let id = add(&mut app, "Write report");
        assert_eq!(app.state, AppState::TaskList);
        assert_eq!(app.session.db().get(id).unwrap().title, "Write report");

        let saved = std::fs::read_to_string(dir.path().join("tasks.json")).unwrap();
        assert!(saved.contains("Write report"));
    }

    #[test]
    fn test_empty_title_keeps_prompt_open() {
        let (_dir, mut app) = app();
        app.handle_key(key(KeyCode::Char('a')));
        type_text(&mut app, "   ");
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.state, AppState::Prompt(PromptKind::AddTask));
        assert!(app.session.db().is_empty());
    }

    #[test]
    fn test_link_mode_adds_and_rejects_cycle() {
        let (_dir, mut app) = app();
        let a = add(&mut app, "A");
        let b = add(&mut app, "B");

        // b is selected; link from a to b.
        app.session.select(Some(a));
        app.refresh();
        app.handle_key(key(KeyCode::Char('l')));
        app.session.select(Some(b));
        app.refresh();
        app.handle_key(key(KeyCode::Enter));
        assert!(app.session.db().get(b).unwrap().depends_on(a));
        assert_eq!(app.link_source, None);

        // The reverse edge would close a cycle.
        app.handle_key(key(KeyCode::Char('l')));
        app.session.select(Some(a));
        app.refresh();
        app.handle_key(key(KeyCode::Enter));
        assert!(app.session.db().get(a).unwrap().dependencies.is_empty());
        assert!(app.status_message.contains("cycle"));
    }

    #[test]
    fn test_link_twice_removes_edge() {
        let (_dir, mut app) = app();
        let a = add(&mut app, "A");
        let b = add(&mut app, "B");
        for _ in 0..2 {
            app.session.select(Some(a));
            app.refresh();
            app.handle_key(key(KeyCode::Char('l')));
            app.session.select(Some(b));
            app.refresh();
            app.handle_key(key(KeyCode::Enter));
        }
        assert!(app.session.db().get(b).unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_delete_with_confirmation() {
        let (_dir, mut app) = app();
        let a = add(&mut app, "A");
        app.handle_key(key(KeyCode::Char('d')));
        assert_eq!(app.state, AppState::Confirm);
        app.handle_key(key(KeyCode::Char('n')));
        assert!(app.session.db().get(a).is_some());

        app.handle_key(key(KeyCode::Char('d')));
        app.handle_key(key(KeyCode::Char('y')));
        assert!(app.session.db().get(a).is_none());
        assert_eq!(app.session.selected(), None);
        assert_eq!(app.state, AppState::TaskList);
    }

    #[test]
    fn test_detail_subtasks() {
        let (_dir, mut app) = app();
        let a = add(&mut app, "A");
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.state, AppState::TaskDetail);

        app.handle_key(key(KeyCode::Char('s')));
        type_text(&mut app, "first");
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.state, AppState::TaskDetail);
        app.handle_key(key(KeyCode::Char(' ')));
        assert!(app.session.db().get(a).unwrap().subtasks[0].done);

        app.handle_key(key(KeyCode::Char('x')));
        assert!(app.session.db().get(a).unwrap().subtasks.is_empty());
    }

    #[test]
    fn test_due_prompt_sets_and_clears() {
        let (_dir, mut app) = app();
        let a = add(&mut app, "A");
        app.handle_key(key(KeyCode::Char('D')));
        type_text(&mut app, "in 2d");
        app.handle_key(key(KeyCode::Enter));
        assert!(app.session.db().get(a).unwrap().due_date.is_some());

        app.handle_key(key(KeyCode::Char('D')));
        app.input = InputField::new();
        app.handle_key(key(KeyCode::Enter));
        assert!(app.session.db().get(a).unwrap().due_date.is_none());
    }

    #[test]
    fn test_canvas_arrow_moves_one_grid_unit() {
        let (_dir, mut app) = app();
        let a = add(&mut app, "A");
        let before = app.session.db().get(a).unwrap().position.unwrap();

        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.state, AppState::Canvas);
        app.handle_key(key(KeyCode::Right));
        let after = app.session.db().get(a).unwrap().position.unwrap();
        assert_eq!(after.x, before.x + 20.0);
        assert_eq!(after.y, before.y);
    }

    #[test]
    fn test_canvas_shift_move_avoids_overlap() {
        let (_dir, mut app) = app();
        let a = add(&mut app, "A");
        let b = add(&mut app, "B");
        let pa = app.session.db().get(a).unwrap().position.unwrap();
        let pb = app.session.db().get(b).unwrap().position.unwrap();
        assert!(pb.x > pa.x);

        // Move b one node pitch left, onto a.
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(KeyEvent { modifiers: KeyModifiers::SHIFT, ..key(KeyCode::Left) });
        let moved = app.session.db().get(b).unwrap().position.unwrap();
        let grid = Grid::default();
        assert!(!grid.is_overlapping(moved, pa, grid.padding));
    }

    #[test]
    fn test_quit_keys() {
        let (_dir, mut app) = app();
        assert!(app.handle_key(key(KeyCode::Char('q'))));
        assert!(app.handle_key(KeyEvent { modifiers: KeyModifiers::CONTROL, ..key(KeyCode::Char('c')) }));
    }
}
