//! Node canvas view.
//!
//! Task positions are canvas units with the y axis pointing down. One terminal cell
//! covers `CELL_WIDTH` by `CELL_HEIGHT` units, so the default 220x80 node is drawn as a
//! 22x4 cell box.

use chrono::Utc;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Line as Edge, Rectangle},
        Block, Borders,
    },
    Frame,
};

use crate::display::{format_due_status, format_progress, truncate};
use crate::fields::Position;
use crate::layout::Grid;
use crate::selectors::{get_due_date_status, get_subtask_progress, is_task_blocked};
use crate::task::{Task, TaskId};
use crate::tui::colors::{due_color, BLOCKED, DONE_GREY, EDGE, LINK};

pub const CELL_WIDTH: f64 = 10.0;
pub const CELL_HEIGHT: f64 = 20.0;

/// The visible window onto the canvas, anchored at its top-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub origin: Position,
}

impl Viewport {
    /// Canvas units covered by the inside of `area` (borders excluded).
    pub fn extent(area: Rect) -> (f64, f64) {
        (
            area.width.saturating_sub(2) as f64 * CELL_WIDTH,
            area.height.saturating_sub(2) as f64 * CELL_HEIGHT,
        )
    }

    pub fn x_bounds(&self, area: Rect) -> [f64; 2] {
        let (width, _) = Viewport::extent(area);
        [self.origin.x, self.origin.x + width]
    }

    /// Ratatui's canvas grows upwards, so stored y values are negated.
    pub fn y_bounds(&self, area: Rect) -> [f64; 2] {
        let (_, height) = Viewport::extent(area);
        [-(self.origin.y + height), -self.origin.y]
    }

    /// Pan just enough for a node at `position` to be fully visible.
    pub fn follow(&mut self, position: Position, grid: &Grid, area: Rect) {
        let (width, height) = Viewport::extent(area);
        if position.x + grid.node_width > self.origin.x + width {
            self.origin.x = position.x + grid.node_width - width + grid.size;
        }
        if position.x < self.origin.x {
            self.origin.x = position.x - grid.size;
        }
        if position.y + grid.node_height > self.origin.y + height {
            self.origin.y = position.y + grid.node_height - height + grid.size;
        }
        if position.y < self.origin.y {
            self.origin.y = position.y - grid.size;
        }
    }
}

/// Offset `position` by whole steps.
pub fn nudge(position: Position, dx: i32, dy: i32, step: f64) -> Position {
    Position::new(position.x + dx as f64 * step, position.y + dy as f64 * step)
}

fn node_color(task: &Task, all: &[Task], selected: Option<TaskId>, link_source: Option<TaskId>) -> Color {
    if Some(task.id) == link_source {
        LINK
    } else if Some(task.id) == selected {
        Color::Cyan
    } else if task.is_done() {
        DONE_GREY
    } else if is_task_blocked(task, all) {
        BLOCKED
    } else {
        Color::White
    }
}

/// Draw every positioned task as a box with an edge from each dependency.
pub fn render_canvas(
    f: &mut Frame,
    area: Rect,
    viewport: &Viewport,
    tasks: &[Task],
    grid: &Grid,
    selected: Option<TaskId>,
    link_source: Option<TaskId>,
) {
    let now = Utc::now();
    let label_width = ((grid.node_width / CELL_WIDTH) as usize).saturating_sub(2).max(4);
    let title = match link_source {
        Some(id) => format!("Canvas - linking from #{id}: Enter toggles edge, Esc cancels"),
        None => "Canvas - arrows move, Shift+arrows jump to free slot, Tab for list".to_string(),
    };

    let canvas = Canvas::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .marker(Marker::Braille)
        .x_bounds(viewport.x_bounds(area))
        .y_bounds(viewport.y_bounds(area))
        .paint(|ctx| {
            for task in tasks {
                let Some(to) = task.position else { continue };
                for dep in &task.dependencies {
                    let Some(from) = tasks.iter().find(|t| t.id == *dep).and_then(|t| t.position) else {
                        continue;
                    };
                    ctx.draw(&Edge {
                        x1: from.x + grid.node_width,
                        y1: -(from.y + grid.node_height / 2.0),
                        x2: to.x,
                        y2: -(to.y + grid.node_height / 2.0),
                        color: EDGE,
                    });
                }
            }

            ctx.layer();
            for task in tasks {
                let Some(p) = task.position else { continue };
                let color = node_color(task, tasks, selected, link_source);
                ctx.draw(&Rectangle {
                    x: p.x,
                    y: -(p.y + grid.node_height),
                    width: grid.node_width,
                    height: grid.node_height,
                    color,
                });

                let mut style = Style::default().fg(color);
                if Some(task.id) == selected {
                    style = style.add_modifier(Modifier::BOLD);
                }
                ctx.print(
                    p.x + CELL_WIDTH,
                    -(p.y + CELL_HEIGHT),
                    Line::from(Span::styled(truncate(&format!("#{} {}", task.id, task.title), label_width), style)),
                );

                let mut detail = vec![Span::raw(if task.is_done() { "done" } else { "todo" })];
                if let Some(due) = get_due_date_status(task.due_date, now) {
                    detail.push(Span::raw(" "));
                    detail.push(Span::styled(format_due_status(Some(due)).to_lowercase(), Style::default().fg(due_color(due))));
                }
                let progress = get_subtask_progress(task);
                if progress.total > 0 {
                    detail.push(Span::raw(format!(" {}", format_progress(progress))));
                }
                ctx.print(p.x + CELL_WIDTH, -(p.y + CELL_HEIGHT * 2.0), Line::from(detail));
            }
        });

    f.render_widget(canvas, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_cover_inner_area() {
        let viewport = Viewport { origin: Position::new(100.0, 40.0) };
        let area = Rect::new(0, 0, 52, 12);
        assert_eq!(viewport.x_bounds(area), [100.0, 600.0]);
        assert_eq!(viewport.y_bounds(area), [-240.0, -40.0]);
    }

    #[test]
    fn test_follow_pans_to_offscreen_node() {
        let grid = Grid::default();
        let area = Rect::new(0, 0, 52, 12);
        let mut viewport = Viewport::default();

        viewport.follow(Position::new(40.0, 40.0), &grid, area);
        assert_eq!(viewport.origin, Position::new(0.0, 0.0));

        viewport.follow(Position::new(800.0, 400.0), &grid, area);
        assert_eq!(viewport.origin, Position::new(540.0, 300.0));

        viewport.follow(Position::new(0.0, 0.0), &grid, area);
        assert_eq!(viewport.origin, Position::new(-20.0, -20.0));
    }

    #[test]
    fn test_nudge() {
        let p = Position::new(40.0, 40.0);
        assert_eq!(nudge(p, 1, 0, 20.0), Position::new(60.0, 40.0));
        assert_eq!(nudge(p, 0, -2, 20.0), Position::new(40.0, 0.0));
    }
}
