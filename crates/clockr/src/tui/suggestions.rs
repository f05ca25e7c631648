//! Cursor over the proposed allocations.

use chrono::NaiveDate;
use crossterm::event::{KeyCode, KeyEvent};

use super::{is_down, is_up};
use crate::model::{EditableAllocation, Proposal};

/// Reviewer actions decoded from a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Accept,
    Edit,
    Retry,
    Skip,
    Up,
    Down,
}

/// Allocations sharing one date, in first-appearance order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGroup {
    pub date: String,
    /// Abbreviated weekday ("Mon"), empty when the date does not parse.
    pub weekday: String,
    pub total_minutes: u32,
    /// Indices into the allocation list.
    pub indices: Vec<usize>,
}

impl DayGroup {
    /// "Mon 2025-03-03 (480 min)"
    pub fn header(&self) -> String {
        format!("{} {} ({} min)", self.weekday, self.date, self.total_minutes)
    }
}

/// Group allocations by date, keeping the order in which each date first appears.
pub fn group_by_date<A: EditableAllocation>(allocations: &[A]) -> Vec<DayGroup> {
    let mut groups: Vec<DayGroup> = Vec::new();
    for (idx, alloc) in allocations.iter().enumerate() {
        let date = alloc.date().unwrap_or_default();
        let minutes = alloc.allocation().minutes;
        match groups.iter_mut().find(|g| g.date == date) {
            Some(group) => {
                group.indices.push(idx);
                group.total_minutes += minutes;
            }
            None => groups.push(DayGroup {
                date: date.to_string(),
                weekday: short_weekday(date),
                total_minutes: minutes,
                indices: vec![idx],
            }),
        }
    }
    groups
}

fn short_weekday(date: &str) -> String {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d.format("%a").to_string())
        .unwrap_or_default()
}

/// Owns the current proposal while the Suggestion view is active.
pub struct SuggestionReviewer<A> {
    allocations: Vec<A>,
    clarification: Option<String>,
    cursor: usize,
}

impl<A: EditableAllocation> SuggestionReviewer<A> {
    pub fn new(proposal: Proposal<A>) -> Self {
        let clarification = proposal.clarification().map(str::to_string);
        Self {
            allocations: proposal.allocations,
            clarification,
            cursor: 0,
        }
    }

    pub fn allocations(&self) -> &[A] {
        &self.allocations
    }

    pub fn clarification(&self) -> Option<&str> {
        self.clarification.as_deref()
    }

    /// Position in display order.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the list out, e.g. into the editor.
    pub fn take_allocations(&mut self) -> Vec<A> {
        self.cursor = 0;
        std::mem::take(&mut self.allocations)
    }

    /// Put an edited list back.
    pub fn restore(&mut self, allocations: Vec<A>) {
        self.allocations = allocations;
        self.clamp();
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        self.cursor += 1;
        self.clamp();
    }

    fn clamp(&mut self) {
        self.cursor = self.cursor.min(self.allocations.len().saturating_sub(1));
    }

    /// Allocation indices in display order: grouped by date when the shape has dates.
    pub fn display_order(&self) -> Vec<usize> {
        if !A::DATED {
            return (0..self.allocations.len()).collect();
        }
        group_by_date(&self.allocations)
            .into_iter()
            .flat_map(|g| g.indices)
            .collect()
    }

    /// Decode a key. With a pending clarification only retry and skip count.
    pub fn parse_key(&self, key: &KeyEvent) -> Option<ReviewAction> {
        let action = if is_up(key) {
            ReviewAction::Up
        } else if is_down(key) {
            ReviewAction::Down
        } else {
            match key.code {
                KeyCode::Char('a') => ReviewAction::Accept,
                KeyCode::Char('e') => ReviewAction::Edit,
                KeyCode::Char('r') => ReviewAction::Retry,
                KeyCode::Char('s') => ReviewAction::Skip,
                _ => return None,
            }
        };
        if self.clarification.is_some()
            && !matches!(action, ReviewAction::Retry | ReviewAction::Skip)
        {
            return None;
        }
        Some(action)
    }
}
