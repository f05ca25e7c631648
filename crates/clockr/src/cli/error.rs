//! User-facing errors with suggestions.

use std::fmt;
use std::path::Path;

/// An error with context and "TRY:" suggestions.
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    pub fn missing_api_key(config_path: &Path) -> Self {
        Self::new("Clockify API key is not configured")
            .with_context("clockr needs an API key to read projects and create time entries")
            .with_suggestions([
                format!(
                    "TRY: Add api_key under [clockify] in {}",
                    config_path.display()
                ),
                "TRY: export CLOCKIFY_API_KEY=<your key>".to_string(),
                "TRY: Generate a key at https://app.clockify.me/user/preferences#advanced".to_string(),
            ])
    }

    pub fn missing_workspace() -> Self {
        Self::new("No Clockify workspace could be determined")
            .with_context("Your user has no default workspace and none is configured")
            .with_suggestions([
                "TRY: Set workspace_id under [clockify] in config.toml",
                "TRY: export CLOCKIFY_WORKSPACE_ID=<workspace id>",
            ])
    }

    pub fn claude_not_found(binary: &str) -> Self {
        Self::new(format!("AI backend not found: {}", binary))
            .with_context("Project matching runs through the claude CLI")
            .with_suggestions([
                "TRY: Install Claude Code and make sure `claude` is on your PATH".to_string(),
                format!("TRY: Run `{} --version` to check the installation", binary),
                "TRY: Set binary under [ai] in config.toml to the claude executable".to_string(),
            ])
    }

    pub fn no_previous_entry() -> Self {
        Self::new("No previous logged entry to repeat")
            .with_context("--same copies the project and description of the last logged entry")
            .with_suggestion("TRY: clockr log  (describe the interval instead)")
    }

    pub fn project_gone(name: &str, id: &str) -> Self {
        Self::new(format!("Project {:?} ({}) from the last entry no longer exists in Clockify", name, id))
            .with_suggestions([
                "TRY: clockr log  (pick a project for this interval)",
                "TRY: clockr projects  (list active projects)",
            ])
    }

    pub fn invalid_date_range(reason: impl Into<String>) -> Self {
        Self::new(format!("Invalid date range: {}", reason.into()))
            .with_suggestions([
                "TRY: clockr log --from 2025-03-03 --to 2025-03-07",
                "TRY: clockr log --from monday --to yesterday",
                "TRY: Narrow the range to at most 10 work days",
            ])
    }

    pub fn invalid_config(path: &Path, reason: impl Into<String>) -> Self {
        Self::new(format!("Invalid configuration: {}", reason.into()))
            .with_context(format!("While reading {}", path.display()))
            .with_suggestions([
                "TRY: clockr config  (shows the resolved configuration)".to_string(),
                format!("TRY: Fix or remove {}", path.display()),
            ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
