//! Colour palette for the review screens.

use ratatui::style::{Color, Modifier, Style};

/// Immutable palette passed into every draw function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub title: Color,
    pub dim: Color,
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub highlight: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            title: Color::Indexed(12),
            dim: Color::Indexed(8),
            success: Color::Indexed(10),
            error: Color::Indexed(9),
            warning: Color::Indexed(11),
            highlight: Color::Indexed(14),
        }
    }
}

impl Theme {
    pub fn title(&self) -> Style {
        Style::default().fg(self.title).add_modifier(Modifier::BOLD)
    }

    pub fn dim(&self) -> Style {
        Style::default().fg(self.dim)
    }

    pub fn success(&self) -> Style {
        Style::default().fg(self.success)
    }

    pub fn error(&self) -> Style {
        Style::default().fg(self.error).add_modifier(Modifier::BOLD)
    }

    pub fn warning(&self) -> Style {
        Style::default().fg(self.warning)
    }

    pub fn highlight(&self) -> Style {
        Style::default().fg(self.highlight).add_modifier(Modifier::BOLD)
    }

    /// Colour for a confidence percentage: high, medium or low.
    pub fn confidence(&self, percent: u32) -> Style {
        match percent {
            80.. => self.success(),
            50..=79 => self.warning(),
            _ => Style::default().fg(self.error),
        }
    }
}
