//! AI project matching.
//!
//! A [`MatchProvider`] turns a free-text work description into a
//! [`Suggestion`] (one interval) or a [`BatchSuggestion`] (several days).
//! Providers stream intermediate text through an optional thinking sink and
//! must stop promptly when their cancellation token fires.
//!
//! The [`invoker`] module wraps a provider in a spawned task with a hard
//! deadline and an idle watchdog, and exposes the call as a stream of
//! [`invoker::MatchEvent`]s for the UI loop.

pub mod claude_code;
pub mod envelope;
pub mod invoker;
pub mod mock;
pub mod prompt;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::model::{BatchSuggestion, DaySlot, Project, Suggestion};

pub use invoker::{InvokerConfig, MatchEvent, MatchStream, StreamingInvoker};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that end an AI matching call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AiError {
    /// The provider binary is not installed
    #[error("claude CLI not found. Install Claude Code first.")]
    NotFound,

    /// The provider process could not be started
    #[error("starting claude CLI: {0}")]
    Spawn(String),

    /// The provider process exited unsuccessfully
    #[error("running claude CLI: {status} (stderr: {stderr})")]
    Process { status: String, stderr: String },

    /// The hard ceiling for the call was reached
    #[error("claude CLI timed out after {}s", .elapsed.as_secs())]
    Timeout { elapsed: Duration },

    /// No streamed text arrived for the idle window
    #[error("no response from AI for {}s, request cancelled", .idle.as_secs())]
    IdleTimeout { idle: Duration },

    /// The call was cancelled by the user
    #[error("AI request cancelled")]
    Cancelled,

    /// The response could not be decoded into a suggestion
    #[error("parsing suggestion: {message} (raw: {preview})")]
    Parse { message: String, preview: String },

    /// The stream finished without a result event
    #[error("no result received from claude CLI stream")]
    NoResult,

    /// The call ended without producing an outcome (provider panic)
    #[error("AI call aborted: {0}")]
    Aborted(String),
}

// =============================================================================
// Requests
// =============================================================================

/// Receives incremental text while the provider works.
pub type ThinkingSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Match one work interval.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleMatchRequest {
    pub description: String,
    pub projects: Vec<Project>,
    pub interval_minutes: u32,
    /// Plain-text context such as calendar events or commit subjects.
    pub context_items: Vec<String>,
}

/// Match several work days at once.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchMatchRequest {
    pub description: String,
    pub projects: Vec<Project>,
    pub days: Vec<DaySlot>,
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Backend that proposes project allocations.
#[async_trait]
pub trait MatchProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    async fn match_single(
        &self,
        request: &SingleMatchRequest,
        thinking: Option<ThinkingSink>,
        cancel: CancellationToken,
    ) -> Result<Suggestion, AiError>;

    async fn match_batch(
        &self,
        request: &BatchMatchRequest,
        thinking: Option<ThinkingSink>,
        cancel: CancellationToken,
    ) -> Result<BatchSuggestion, AiError>;
}
