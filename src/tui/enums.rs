//! Enumerations for TUI state management.

/// Application state for the terminal user interface.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AppState {
    TaskList,
    Canvas,
    TaskDetail,
    Prompt(PromptKind),
    Help,
    Confirm,
}

/// What a single-line prompt edits.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PromptKind {
    AddTask,
    EditTitle,
    EditDue,
    AddSubtask,
}

impl PromptKind {
    pub fn title(self) -> &'static str {
        match self {
            PromptKind::AddTask => "New task",
            PromptKind::EditTitle => "Rename task",
            PromptKind::EditDue => "Due date (empty clears; today, tomorrow, in 3d, YYYY-MM-DD)",
            PromptKind::AddSubtask => "New checklist item",
        }
    }
}

/// The view that overlays and prompts return to.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum BaseView {
    #[default]
    List,
    Canvas,
}

impl BaseView {
    pub fn state(self) -> AppState {
        match self {
            BaseView::List => AppState::TaskList,
            BaseView::Canvas => AppState::Canvas,
        }
    }
}
