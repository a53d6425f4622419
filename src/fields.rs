//! Enumerations and small value types shared across the task model.
//!
//! This module defines the task status, the due-date urgency classes produced by the
//! selectors, and the canvas coordinate type used by the layout helper.

use serde::{Deserialize, Serialize};

/// Task completion status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    #[serde(alias = "Todo", alias = "open")]
    Todo,
    #[serde(alias = "Done", alias = "completed")]
    Done,
}

impl Status {
    /// The opposite status.
    pub fn toggled(self) -> Self {
        match self {
            Status::Todo => Status::Done,
            Status::Done => Status::Todo,
        }
    }
}

/// Urgency class of a deadline relative to the current instant.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum DueStatus {
    /// The deadline has passed.
    Overdue,
    /// Due within 24 hours.
    Urgent,
    /// Due within 3 days.
    Soon,
    /// Further out.
    Normal,
}

/// A point on the node canvas, in canvas units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }
}

/// Done/total counts over a task's checklist.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SubtaskProgress {
    pub done: usize,
    pub total: usize,
}
