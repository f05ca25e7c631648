//! Free-text work description field.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::is_plain_char;

pub const PLACEHOLDER: &str = "Describe what you worked on...";

/// Maximum description length, in characters.
pub const CHAR_LIMIT: usize = 5000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputField {
    text: String,
    time_label: String,
    last_input: Option<String>,
    loaded_last: bool,
}

impl InputField {
    pub fn new(time_label: impl Into<String>) -> Self {
        Self {
            time_label: time_label.into(),
            ..Self::default()
        }
    }

    /// A blank field that keeps the time label and the recall text.
    pub fn reset(&self) -> Self {
        Self {
            time_label: self.time_label.clone(),
            last_input: self.last_input.clone(),
            ..Self::default()
        }
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into().chars().take(CHAR_LIMIT).collect();
    }

    pub fn set_last_input(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.last_input = (!text.trim().is_empty()).then_some(text);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn time_label(&self) -> &str {
        &self.time_label
    }

    pub fn has_last_input(&self) -> bool {
        self.last_input.is_some()
    }

    /// Whether Ctrl+L just loaded the previous description.
    pub fn loaded_last(&self) -> bool {
        self.loaded_last
    }

    /// The trimmed description, if there is one to submit.
    pub fn submission(&self) -> Option<&str> {
        Some(self.text.trim()).filter(|t| !t.is_empty())
    }

    fn push(&mut self, c: char) {
        if self.text.chars().count() < CHAR_LIMIT {
            self.text.push(c);
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('l') && key.modifiers.contains(KeyModifiers::CONTROL) {
            if let Some(last) = self.last_input.clone() {
                self.set_text(last);
                self.loaded_last = true;
            }
            return;
        }

        self.loaded_last = false;
        match key.code {
            KeyCode::Char(c) if is_plain_char(&key) => self.push(c),
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => self.push('\n'),
            KeyCode::Backspace => {
                self.text.pop();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(field: &mut InputField, code: KeyCode, modifiers: KeyModifiers) {
        field.handle_key(KeyEvent::new(code, modifiers));
    }

    #[test]
    fn test_typing_and_backspace() {
        let mut field = InputField::new("09:00 – 10:00 (60 min)");
        for c in "fixd".chars() {
            press(&mut field, KeyCode::Char(c), KeyModifiers::NONE);
        }
        press(&mut field, KeyCode::Backspace, KeyModifiers::NONE);
        press(&mut field, KeyCode::Char('X'), KeyModifiers::SHIFT);
        assert_eq!(field.text(), "fixX");
    }

    #[test]
    fn test_newline_respects_char_limit() {
        let mut field = InputField::new("");
        field.set_text("x".repeat(CHAR_LIMIT - 1));
        press(&mut field, KeyCode::Enter, KeyModifiers::ALT);
        assert!(field.text().ends_with('\n'));
        press(&mut field, KeyCode::Enter, KeyModifiers::ALT);
        press(&mut field, KeyCode::Char('y'), KeyModifiers::NONE);
        assert_eq!(field.text().chars().count(), CHAR_LIMIT);
    }

    #[test]
    fn test_blank_text_is_not_submittable() {
        let mut field = InputField::new("");
        field.set_text("   \n ");
        assert_eq!(field.submission(), None);
        field.set_text("  fixed auth bug ");
        assert_eq!(field.submission(), Some("fixed auth bug"));
    }

    #[test]
    fn test_ctrl_l_loads_last_input() {
        let mut field = InputField::new("");
        press(&mut field, KeyCode::Char('l'), KeyModifiers::CONTROL);
        assert_eq!(field.text(), "");

        field.set_last_input("reviewed PRs");
        press(&mut field, KeyCode::Char('l'), KeyModifiers::CONTROL);
        assert_eq!(field.text(), "reviewed PRs");
        assert!(field.loaded_last());

        press(&mut field, KeyCode::Char('!'), KeyModifiers::NONE);
        assert!(!field.loaded_last());
    }

    #[test]
    fn test_reset_keeps_label_and_recall() {
        let mut field = InputField::new("Batch: 2025-03-03 to 2025-03-07 (5 days, 2400 min total)");
        field.set_last_input("standups");
        field.set_text("draft");
        let fresh = field.reset();
        assert_eq!(fresh.text(), "");
        assert_eq!(fresh.time_label(), field.time_label());
        assert!(fresh.has_last_input());
    }
}
