//! Field-level allocation editor.
//!
//! The editor owns the allocation list while the Edit view is active and
//! hands it back through [`AllocationEditor::into_allocations`]. Failed
//! validation on commit leaves the allocation untouched.

use crossterm::event::{KeyCode, KeyEvent};
use std::sync::Arc;

use super::{is_plain_char, is_up, is_down};
use crate::fuzzy::ProjectIndex;
use crate::model::{EditField, EditableAllocation, Project};

/// Maximum length of the edit buffer, in characters.
pub const CHAR_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorMode {
    Navigating,
    Editing {
        buffer: String,
        /// Project candidates as indices into the project index.
        filtered: Vec<usize>,
    },
}

/// What the caller should do after a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorEvent {
    Continue,
    /// Esc while navigating: editing is over.
    Done,
}

pub struct AllocationEditor<A> {
    allocations: Vec<A>,
    projects: Arc<ProjectIndex>,
    cursor: usize,
    field: usize,
    mode: EditorMode,
}

impl<A: EditableAllocation> AllocationEditor<A> {
    pub fn new(allocations: Vec<A>, projects: Arc<ProjectIndex>) -> Self {
        Self {
            allocations,
            projects,
            cursor: 0,
            field: 0,
            mode: EditorMode::Navigating,
        }
    }

    pub fn allocations(&self) -> &[A] {
        &self.allocations
    }

    pub fn into_allocations(self) -> Vec<A> {
        self.allocations
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn field(&self) -> EditField {
        A::FIELDS[self.field]
    }

    pub fn mode(&self) -> &EditorMode {
        &self.mode
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.mode, EditorMode::Editing { .. })
    }

    pub fn buffer(&self) -> Option<&str> {
        match &self.mode {
            EditorMode::Editing { buffer, .. } => Some(buffer),
            EditorMode::Navigating => None,
        }
    }

    /// Current project candidates, best first.
    pub fn candidates(&self) -> Vec<&Project> {
        match &self.mode {
            EditorMode::Editing { filtered, .. } if self.field() == EditField::Project => filtered
                .iter()
                .filter_map(|idx| self.projects.get(*idx))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> EditorEvent {
        if self.is_editing() {
            self.handle_editing(key);
            return EditorEvent::Continue;
        }

        if is_up(&key) {
            self.cursor = self.cursor.saturating_sub(1);
        } else if is_down(&key) {
            if self.cursor + 1 < self.allocations.len() {
                self.cursor += 1;
            }
        } else {
            match key.code {
                KeyCode::Tab => self.field = (self.field + 1) % A::FIELDS.len(),
                KeyCode::Enter => self.begin_edit(),
                KeyCode::Esc => return EditorEvent::Done,
                _ => {}
            }
        }
        EditorEvent::Continue
    }

    fn begin_edit(&mut self) {
        let Some(alloc) = self.allocations.get(self.cursor) else {
            return;
        };
        let field = self.field();
        let (buffer, filtered) = match field {
            EditField::Project => (String::new(), self.projects.all()),
            EditField::Minutes => (alloc.allocation().minutes.to_string(), Vec::new()),
            EditField::Description => (alloc.allocation().description.clone(), Vec::new()),
            EditField::StartTime | EditField::EndTime => {
                let value = alloc
                    .time_window()
                    .map(|(start, end)| if field == EditField::StartTime { start } else { end })
                    .unwrap_or_default();
                (value.to_string(), Vec::new())
            }
        };
        self.mode = EditorMode::Editing { buffer, filtered };
    }

    fn handle_editing(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                self.commit();
                self.mode = EditorMode::Navigating;
            }
            KeyCode::Esc => self.mode = EditorMode::Navigating,
            KeyCode::Backspace => {
                if let EditorMode::Editing { buffer, .. } = &mut self.mode {
                    buffer.pop();
                }
                self.refilter();
            }
            KeyCode::Char(c) if is_plain_char(&key) => {
                if let EditorMode::Editing { buffer, .. } = &mut self.mode {
                    if buffer.chars().count() < CHAR_LIMIT {
                        buffer.push(c);
                    }
                }
                self.refilter();
            }
            _ => {}
        }
    }

    fn refilter(&mut self) {
        if self.field() != EditField::Project {
            return;
        }
        if let EditorMode::Editing { buffer, filtered } = &mut self.mode {
            *filtered = self.projects.filter(buffer);
        }
    }

    fn commit(&mut self) {
        let field = self.field();
        let EditorMode::Editing { buffer, filtered } = &self.mode else {
            return;
        };
        let Some(target) = self.allocations.get_mut(self.cursor) else {
            return;
        };

        match field {
            EditField::Project => {
                if let Some(project) = filtered.first().and_then(|idx| self.projects.get(*idx)) {
                    target.allocation_mut().set_project(project);
                }
            }
            EditField::Minutes => {
                if let Ok(minutes) = buffer.parse::<u32>() {
                    if minutes > 0 {
                        target.allocation_mut().minutes = minutes;
                    }
                }
            }
            EditField::Description => {
                if !buffer.is_empty() {
                    target.allocation_mut().description = buffer.clone();
                }
            }
            EditField::StartTime | EditField::EndTime => {
                if !buffer.is_empty() {
                    target.set_time_field(field, buffer.clone());
                }
            }
        }
    }
}
