//! Color constants for the terminal user interface.

use ratatui::style::Color;

use crate::fields::DueStatus;

/// Header and status bar background.
pub const ACCENT: Color = Color::Rgb(0, 80, 0);
/// Completed tasks.
pub const DONE_GREY: Color = Color::DarkGray;
/// Tasks waiting on an unfinished dependency.
pub const BLOCKED: Color = Color::Rgb(114, 0, 0);
/// Source task while linking.
pub const LINK: Color = Color::Rgb(86, 60, 92);
/// Dependency edges on the canvas.
pub const EDGE: Color = Color::Gray;

pub const OVERDUE: Color = Color::Red;
pub const URGENT: Color = Color::Rgb(255, 140, 0);
pub const SOON: Color = Color::Rgb(255, 215, 0);

/// Foreground for a deadline class.
pub fn due_color(status: DueStatus) -> Color {
    match status {
        DueStatus::Overdue => OVERDUE,
        DueStatus::Urgent => URGENT,
        DueStatus::Soon => SOON,
        DueStatus::Normal => Color::White,
    }
}
