//! Allocation model shared by the reviewer, the editor and the submission pipeline.
//!
//! These are plain data types. The AI backend produces [`Suggestion`] and
//! [`BatchSuggestion`] values; the review flow owns them until they are
//! either discarded or converted 1:1 into persisted entries.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A Clockify project as offered to the AI and to the project picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_string_as_none"
    )]
    pub client_name: Option<String>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            client_name: None,
        }
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client_name = Some(client.into());
        self
    }

    /// "Client / Project" when the client is known, the bare name otherwise.
    pub fn display_name(&self) -> String {
        match self.client_name.as_deref() {
            Some(client) if !client.is_empty() => format!("{} / {}", client, self.name),
            _ => self.name.clone(),
        }
    }
}

/// One proposed (project, minutes, description) slice of a work interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub project_id: String,
    pub project_name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_string_as_none"
    )]
    pub client_name: Option<String>,
    pub minutes: u32,
    pub description: String,
    /// Match confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
}

impl Allocation {
    pub fn display_project(&self) -> String {
        match self.client_name.as_deref() {
            Some(client) if !client.is_empty() => format!("{} / {}", client, self.project_name),
            _ => self.project_name.clone(),
        }
    }

    /// Confidence rendered as a whole percentage, clamped to `[0, 100]`.
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u32
    }

    pub fn set_project(&mut self, project: &Project) {
        self.project_id = project.id.clone();
        self.project_name = project.name.clone();
        self.client_name = project.client_name.clone();
    }
}

/// An [`Allocation`] pinned to a calendar date and a local `HH:MM` window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAllocation {
    /// `YYYY-MM-DD`
    pub date: String,
    /// Local `HH:MM`
    pub start_time: String,
    /// Local `HH:MM`
    pub end_time: String,
    #[serde(flatten)]
    pub allocation: Allocation,
}

/// The AI's answer: either allocations, or a request for more detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal<A> {
    #[serde(default = "Vec::new")]
    pub allocations: Vec<A>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<String>,
}

pub type Suggestion = Proposal<Allocation>;
pub type BatchSuggestion = Proposal<BatchAllocation>;

impl<A> Proposal<A> {
    pub fn with_allocations(allocations: Vec<A>) -> Self {
        Self {
            allocations,
            clarification: None,
        }
    }

    pub fn clarify(question: impl Into<String>) -> Self {
        Self {
            allocations: Vec::new(),
            clarification: Some(question.into()),
        }
    }

    /// The clarification text, if it is non-blank.
    ///
    /// A non-blank clarification takes precedence over any allocations that
    /// came along with it.
    pub fn clarification(&self) -> Option<&str> {
        self.clarification
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn needs_clarification(&self) -> bool {
        self.clarification().is_some()
    }
}

/// One work day offered to the batch matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySlot {
    pub date: NaiveDate,
    /// Full weekday name, e.g. "Monday".
    pub weekday: String,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub total_minutes: u32,
    pub calendar_events: Vec<String>,
    pub commit_context: Vec<String>,
}

impl DaySlot {
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// The single view tag of a review flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    Input,
    Loading,
    Suggestion,
    Edit,
    Confirmation,
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViewState::Input => "input",
            ViewState::Loading => "loading",
            ViewState::Suggestion => "suggestion",
            ViewState::Edit => "edit",
            ViewState::Confirmation => "confirmation",
        };
        f.write_str(label)
    }
}

/// Editable allocation attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Project,
    Minutes,
    Description,
    StartTime,
    EndTime,
}

impl EditField {
    pub fn label(self) -> &'static str {
        match self {
            EditField::Project => "Project",
            EditField::Minutes => "Minutes",
            EditField::Description => "Description",
            EditField::StartTime => "Start Time",
            EditField::EndTime => "End Time",
        }
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            EditField::Project => "Search project...",
            EditField::Minutes => "Minutes",
            EditField::Description => "Description",
            EditField::StartTime => "Start time (HH:MM)",
            EditField::EndTime => "End time (HH:MM)",
        }
    }
}

/// Allocation shapes the review flow can edit and render.
pub trait EditableAllocation: Clone + Send + Sync + 'static {
    /// Fields reachable with Tab, in cycle order.
    const FIELDS: &'static [EditField];

    /// Whether allocations carry their own date and time window.
    const DATED: bool = false;

    fn allocation(&self) -> &Allocation;

    fn allocation_mut(&mut self) -> &mut Allocation;

    /// Calendar date used for day grouping; `None` for single-interval allocations.
    fn date(&self) -> Option<&str> {
        None
    }

    /// Local `HH:MM` window, when the allocation carries one.
    fn time_window(&self) -> Option<(&str, &str)> {
        None
    }

    /// Store a non-empty time field value. Returns false for shapes without times.
    fn set_time_field(&mut self, _field: EditField, _value: String) -> bool {
        false
    }
}

impl EditableAllocation for Allocation {
    const FIELDS: &'static [EditField] =
        &[EditField::Project, EditField::Minutes, EditField::Description];

    fn allocation(&self) -> &Allocation {
        self
    }

    fn allocation_mut(&mut self) -> &mut Allocation {
        self
    }
}

impl EditableAllocation for BatchAllocation {
    const FIELDS: &'static [EditField] = &[
        EditField::Project,
        EditField::Minutes,
        EditField::Description,
        EditField::StartTime,
        EditField::EndTime,
    ];

    const DATED: bool = true;

    fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    fn allocation_mut(&mut self) -> &mut Allocation {
        &mut self.allocation
    }

    fn date(&self) -> Option<&str> {
        Some(&self.date)
    }

    fn time_window(&self) -> Option<(&str, &str)> {
        Some((&self.start_time, &self.end_time))
    }

    fn set_time_field(&mut self, field: EditField, value: String) -> bool {
        match field {
            EditField::StartTime => self.start_time = value,
            EditField::EndTime => self.end_time = value,
            _ => return false,
        }
        true
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_deserializes_ai_payload() {
        let raw = r#"{
            "allocations": [
                {"project_id": "p1", "project_name": "Auth", "client_name": "",
                 "minutes": 60, "description": "Fixed auth bug", "confidence": 0.9}
            ]
        }"#;
        let suggestion: Suggestion = serde_json::from_str(raw).unwrap();
        assert_eq!(suggestion.allocations.len(), 1);
        assert_eq!(suggestion.allocations[0].client_name, None);
        assert!(!suggestion.needs_clarification());
    }

    #[test]
    fn test_batch_allocation_flattens_fields() {
        let raw = r#"{"allocations": [{
            "date": "2025-03-03", "start_time": "09:00", "end_time": "12:00",
            "project_id": "p1", "project_name": "Auth", "minutes": 180,
            "description": "Review", "confidence": 0.75
        }]}"#;
        let suggestion: BatchSuggestion = serde_json::from_str(raw).unwrap();
        let alloc = &suggestion.allocations[0];
        assert_eq!(alloc.date, "2025-03-03");
        assert_eq!(alloc.allocation.minutes, 180);
        assert_eq!(alloc.time_window(), Some(("09:00", "12:00")));
        assert_eq!(alloc.date(), Some("2025-03-03"));
    }

    #[test]
    fn test_blank_clarification_is_ignored() {
        let proposal: Suggestion = Proposal {
            allocations: vec![],
            clarification: Some("   ".to_string()),
        };
        assert!(!proposal.needs_clarification());

        let proposal: Suggestion = Proposal::clarify("which project?");
        assert_eq!(proposal.clarification(), Some("which project?"));
    }

    #[test]
    fn test_display_names() {
        let project = Project::new("p1", "Backend").with_client("Acme");
        assert_eq!(project.display_name(), "Acme / Backend");
        assert_eq!(Project::new("p2", "Internal").display_name(), "Internal");
        assert_eq!(Project::new("p3", "Ops").with_client("").display_name(), "Ops");

        let mut alloc = Allocation {
            project_id: String::new(),
            project_name: String::new(),
            client_name: None,
            minutes: 60,
            description: String::new(),
            confidence: 0.5,
        };
        alloc.set_project(&project);
        assert_eq!(alloc.display_project(), "Acme / Backend");
        alloc.client_name = Some(String::new());
        assert_eq!(alloc.display_project(), "Backend");
    }

    #[test]
    fn test_confidence_percent_clamps() {
        let mut alloc = Allocation {
            project_id: "p".into(),
            project_name: "P".into(),
            client_name: None,
            minutes: 30,
            description: "d".into(),
            confidence: 0.856,
        };
        assert_eq!(alloc.confidence_percent(), 86);
        alloc.confidence = 1.7;
        assert_eq!(alloc.confidence_percent(), 100);
    }

    #[test]
    fn test_time_fields_only_on_batch() {
        let mut single = Allocation {
            project_id: "p".into(),
            project_name: "P".into(),
            client_name: None,
            minutes: 30,
            description: "d".into(),
            confidence: 0.5,
        };
        assert!(!single.set_time_field(EditField::StartTime, "10:00".into()));

        let mut batch = BatchAllocation {
            date: "2025-03-03".into(),
            start_time: "09:00".into(),
            end_time: "09:30".into(),
            allocation: single.clone(),
        };
        assert!(batch.set_time_field(EditField::EndTime, "10:00".into()));
        assert_eq!(batch.end_time, "10:00");
        assert!(!batch.set_time_field(EditField::Minutes, "10".into()));
    }
}
