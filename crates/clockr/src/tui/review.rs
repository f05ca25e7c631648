//! The review state machine.
//!
//! One generic [`ReviewMachine`] drives both the single-interval flow and the
//! multi-day batch flow. It never performs I/O itself: [`ReviewMachine::update`]
//! consumes one [`Msg`] and returns the [`Command`]s the runtime should run.
//! Results of those commands come back as further messages.

use crossterm::event::KeyEvent;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::editor::{AllocationEditor, EditorEvent};
use super::input::InputField;
use super::is_interrupt;
use super::suggestions::{ReviewAction, SuggestionReviewer};
use crate::ai::AiError;
use crate::fuzzy::ProjectIndex;
use crate::model::{Allocation, BatchAllocation, EditableAllocation, Proposal, ViewState};
use crate::store::PersistedEntry;
use crate::submit::SubmitError;

/// Everything the machine reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg<A> {
    Key(KeyEvent),
    /// One second passed while loading.
    Tick,
    /// Streamed provider text.
    Thinking(String),
    /// The AI call finished.
    Matched(Result<Proposal<A>, AiError>),
    /// The submission finished.
    Submitted(Result<Vec<PersistedEntry>, SubmitError>),
}

/// Side effects requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command<A> {
    StartMatch { description: String },
    CancelMatch,
    /// Deliver a [`Msg::Tick`] in one second.
    ScheduleTick,
    Submit {
        allocations: Vec<A>,
        raw_input: String,
    },
    Quit,
}

/// What a finished review produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewResult {
    pub skipped: bool,
    pub entries: Vec<PersistedEntry>,
    /// The error shown on the confirmation screen, if the run failed.
    pub error: Option<String>,
}

impl ReviewResult {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Contents of the Confirmation view.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    /// Waiting for the submission to finish.
    Pending,
    Failed(String),
    Done(Vec<PersistedEntry>),
}

pub struct ReviewMachine<A: EditableAllocation> {
    view: ViewState,
    input: InputField,
    reviewer: Option<SuggestionReviewer<A>>,
    editor: Option<AllocationEditor<A>>,
    projects: Arc<ProjectIndex>,
    transcript: String,
    elapsed: Duration,
    raw_input: String,
    confirmation: Option<Confirmation>,
    result: Option<ReviewResult>,
}

pub type ReviewStateMachine = ReviewMachine<Allocation>;
pub type BatchReviewStateMachine = ReviewMachine<BatchAllocation>;

impl<A: EditableAllocation> ReviewMachine<A> {
    pub fn new(time_label: impl Into<String>, projects: Arc<ProjectIndex>) -> Self {
        Self {
            view: ViewState::Input,
            input: InputField::new(time_label),
            reviewer: None,
            editor: None,
            projects,
            transcript: String::new(),
            elapsed: Duration::ZERO,
            raw_input: String::new(),
            confirmation: None,
            result: None,
        }
    }

    /// Seed the description field.
    pub fn with_initial_input(mut self, text: impl Into<String>) -> Self {
        self.input.set_text(text);
        self
    }

    /// Text recalled by Ctrl+L.
    pub fn with_last_input(mut self, text: impl Into<String>) -> Self {
        self.input.set_last_input(text);
        self
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn input(&self) -> &InputField {
        &self.input
    }

    pub fn reviewer(&self) -> Option<&SuggestionReviewer<A>> {
        self.reviewer.as_ref()
    }

    pub fn editor(&self) -> Option<&AllocationEditor<A>> {
        self.editor.as_ref()
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn confirmation(&self) -> Option<&Confirmation> {
        self.confirmation.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Option<&ReviewResult> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<ReviewResult> {
        self.result.take()
    }

    pub fn update(&mut self, msg: Msg<A>) -> Vec<Command<A>> {
        if self.is_finished() {
            return Vec::new();
        }

        match msg {
            Msg::Key(key) if is_interrupt(&key) => {
                debug!(view = %self.view, "Interrupted");
                let entries = match &self.confirmation {
                    Some(Confirmation::Done(entries)) => entries.clone(),
                    _ => Vec::new(),
                };
                self.result = Some(ReviewResult {
                    skipped: true,
                    entries,
                    error: None,
                });
                vec![Command::CancelMatch, Command::Quit]
            }
            Msg::Key(key) => self.on_key(key),
            Msg::Tick => {
                if self.view != ViewState::Loading {
                    return Vec::new();
                }
                self.elapsed += Duration::from_secs(1);
                vec![Command::ScheduleTick]
            }
            Msg::Thinking(text) => {
                if self.view == ViewState::Loading {
                    self.transcript.push_str(&text);
                }
                Vec::new()
            }
            Msg::Matched(outcome) => {
                if self.view != ViewState::Loading {
                    debug!(view = %self.view, "Ignoring stale match result");
                    return Vec::new();
                }
                self.on_matched(outcome);
                Vec::new()
            }
            Msg::Submitted(outcome) => {
                if self.confirmation != Some(Confirmation::Pending) {
                    return Vec::new();
                }
                self.on_submitted(outcome);
                Vec::new()
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Vec<Command<A>> {
        match self.view {
            ViewState::Input => self.on_input_key(key),
            ViewState::Loading => Vec::new(),
            ViewState::Suggestion => self.on_suggestion_key(key),
            ViewState::Edit => {
                self.on_edit_key(key);
                Vec::new()
            }
            ViewState::Confirmation => {
                if self.confirmation == Some(Confirmation::Pending) {
                    return Vec::new();
                }
                self.finish_confirmation();
                vec![Command::Quit]
            }
        }
    }

    fn on_input_key(&mut self, key: KeyEvent) -> Vec<Command<A>> {
        if key.code == crossterm::event::KeyCode::Enter && key.modifiers.is_empty() {
            let Some(description) = self.input.submission().map(str::to_string) else {
                return Vec::new();
            };
            info!(chars = description.len(), "Requesting AI suggestion");
            self.raw_input = description.clone();
            self.transcript.clear();
            self.elapsed = Duration::ZERO;
            self.view = ViewState::Loading;
            return vec![Command::StartMatch { description }, Command::ScheduleTick];
        }
        self.input.handle_key(key);
        Vec::new()
    }

    fn on_suggestion_key(&mut self, key: KeyEvent) -> Vec<Command<A>> {
        let Some(reviewer) = self.reviewer.as_mut() else {
            return Vec::new();
        };
        let Some(action) = reviewer.parse_key(&key) else {
            return Vec::new();
        };

        match action {
            ReviewAction::Up => reviewer.move_up(),
            ReviewAction::Down => reviewer.move_down(),
            ReviewAction::Accept => {
                let allocations = reviewer.allocations().to_vec();
                self.view = ViewState::Confirmation;
                if allocations.is_empty() {
                    self.on_submitted(Ok(Vec::new()));
                    return Vec::new();
                }
                self.confirmation = Some(Confirmation::Pending);
                return vec![Command::Submit {
                    allocations,
                    raw_input: self.raw_input.clone(),
                }];
            }
            ReviewAction::Edit => {
                let allocations = reviewer.take_allocations();
                self.editor = Some(AllocationEditor::new(allocations, self.projects.clone()));
                self.view = ViewState::Edit;
            }
            ReviewAction::Retry => {
                self.reviewer = None;
                self.input = self.input.reset();
                self.view = ViewState::Input;
            }
            ReviewAction::Skip => {
                self.result = Some(ReviewResult::skipped());
                return vec![Command::Quit];
            }
        }
        Vec::new()
    }

    fn on_edit_key(&mut self, key: KeyEvent) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        if editor.handle_key(key) == EditorEvent::Done {
            if let Some(editor) = self.editor.take() {
                if let Some(reviewer) = self.reviewer.as_mut() {
                    reviewer.restore(editor.into_allocations());
                }
            }
            self.view = ViewState::Suggestion;
        }
    }

    fn on_matched(&mut self, outcome: Result<Proposal<A>, AiError>) {
        match outcome {
            Ok(proposal) => {
                debug!(
                    allocations = proposal.allocations.len(),
                    clarification = proposal.needs_clarification(),
                    "AI suggestion received"
                );
                self.reviewer = Some(SuggestionReviewer::new(proposal));
                self.view = ViewState::Suggestion;
            }
            Err(err) => {
                info!(error = %err, "AI matching failed");
                self.confirmation = Some(Confirmation::Failed(err.to_string()));
                self.view = ViewState::Confirmation;
            }
        }
    }

    fn on_submitted(&mut self, outcome: Result<Vec<PersistedEntry>, SubmitError>) {
        self.confirmation = Some(match outcome {
            Ok(entries) => Confirmation::Done(entries),
            Err(err) => Confirmation::Failed(err.to_string()),
        });
    }

    fn finish_confirmation(&mut self) {
        let result = match self.confirmation.take() {
            Some(Confirmation::Done(entries)) => ReviewResult {
                entries,
                ..ReviewResult::default()
            },
            Some(Confirmation::Failed(message)) => ReviewResult {
                error: Some(message),
                ..ReviewResult::default()
            },
            _ => ReviewResult::default(),
        };
        self.result = Some(result);
    }
}
