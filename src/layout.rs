//! Grid layout helpers for the node canvas.
//!
//! Every stored canvas coordinate is a multiple of the grid size. New tasks fan out
//! over a three-column grid, and moved nodes are nudged into the first free slot.

use serde::{Deserialize, Serialize};

use crate::fields::Position;
use crate::task::{Task, TaskId};

/// Columns used for the initial fan-out of fresh tasks.
pub const INITIAL_COLUMNS: usize = 3;

/// Canvas geometry. Loaded from the `[layout]` table of the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Grid {
    /// Grid unit in canvas units.
    pub size: f64,
    pub node_width: f64,
    pub node_height: f64,
    /// Extra margin required between two nodes.
    pub padding: f64,
    /// Downward probes before shifting one column right.
    pub max_probe_rows: usize,
    /// Total probes before accepting the last position.
    pub max_attempts: usize,
}

impl Default for Grid {
    fn default() -> Self {
        Grid {
            size: 20.0,
            node_width: 220.0,
            node_height: 80.0,
            padding: 20.0,
            max_probe_rows: 10,
            max_attempts: 100,
        }
    }
}

impl Grid {
    /// Round `value` to the nearest multiple of the grid size.
    ///
    /// Halfway values round away from zero, so snapping is symmetric about the origin.
    pub fn snap_to_grid(&self, value: f64) -> f64 {
        if self.size <= 0.0 || !value.is_finite() {
            return value;
        }
        (value / self.size).round() * self.size
    }

    pub fn snap(&self, position: Position) -> Position {
        Position::new(self.snap_to_grid(position.x), self.snap_to_grid(position.y))
    }

    pub fn is_snapped(&self, position: Position) -> bool {
        self.snap(position) == position
    }

    /// Axis-aligned bounding box test between two node origins.
    pub fn is_overlapping(&self, a: Position, b: Position, padding: f64) -> bool {
        (a.x - b.x).abs() < self.node_width + padding && (a.y - b.y).abs() < self.node_height + padding
    }

    /// Position assigned to the task at `index` when it has never been laid out.
    pub fn initial_position(&self, index: usize) -> Position {
        let gap = self.size * 2.0;
        let column = (index % INITIAL_COLUMNS) as f64;
        let row = (index / INITIAL_COLUMNS) as f64;
        self.snap(Position::new(
            gap + column * (self.node_width + gap),
            gap + row * (self.node_height + gap),
        ))
    }

    /// First collision-free slot for `moved`, searching from the snapped `candidate`.
    ///
    /// Probes downward one grid unit at a time; after `max_probe_rows` probes it moves
    /// one column right and starts again from the candidate's row. When the attempt
    /// budget runs out the last probed slot is returned even if it still collides.
    pub fn get_non_overlapping_position(&self, moved: TaskId, candidate: Position, tasks: &[Task]) -> Position {
        let start = self.snap(candidate);
        let others: Vec<Position> = tasks
            .iter()
            .filter(|t| t.id != moved)
            .filter_map(|t| t.position)
            .collect();
        let collides = |p: Position| others.iter().any(|&o| self.is_overlapping(p, o, self.padding));

        let column_step = self.snap_to_grid(self.node_width + self.size);
        let mut position = start;
        let mut row = 0usize;
        let mut column = 0usize;
        let mut attempts = 1usize;
        while collides(position) && attempts < self.max_attempts {
            row += 1;
            if row > self.max_probe_rows {
                row = 0;
                column += 1;
            }
            position = self.snap(Position::new(
                start.x + column as f64 * column_step,
                start.y + row as f64 * self.size,
            ));
            attempts += 1;
        }
        position
    }
}
