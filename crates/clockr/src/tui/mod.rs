//! Terminal review flow for AI-suggested time entries.
//!
//! [`review::ReviewMachine`] holds the state, [`ui`] draws it and
//! [`runtime`] owns the terminal and the event loop.

pub mod editor;
pub mod input;
pub mod review;
pub mod runtime;
pub mod suggestions;
pub mod theme;
pub mod ui;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub use review::{
    BatchReviewStateMachine, Command, Confirmation, Msg, ReviewMachine, ReviewResult,
    ReviewStateMachine,
};
pub use runtime::{run_review, ReviewMode, ReviewSession};
pub use theme::Theme;

/// Ctrl+C, checked before any view-specific handling.
pub fn is_interrupt(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

pub(crate) fn is_up(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Up) || (key.code == KeyCode::Char('k') && key.modifiers.is_empty())
}

pub(crate) fn is_down(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Down)
        || (key.code == KeyCode::Char('j') && key.modifiers.is_empty())
}

/// A character key without Ctrl or Alt.
pub(crate) fn is_plain_char(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char(_))
        && !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
}
