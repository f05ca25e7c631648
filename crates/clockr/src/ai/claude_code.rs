//! Claude Code Provider - uses the `claude` CLI as the matching backend
//!
//! Spawns `claude -p` with the matching system prompt and a JSON schema, so
//! no API key is needed; the CLI's own login is used.
//!
//! ## Modes
//!
//! - Buffered: `--output-format json`, one envelope on stdout.
//! - Streaming (when a thinking sink is given): `--output-format stream-json
//!   --verbose`, one JSON event per line. Text deltas feed the sink and the
//!   `result` event carries the payload.
//!
//! The child is killed when the call is cancelled or its future is dropped.

use async_trait::async_trait;
use serde_json::Value;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::envelope::{
    parse_payload, payload_from_event, truncate, unwrap_envelope, unwrap_nested_result,
};
use super::prompt::MatchPrompt;
use super::{AiError, BatchMatchRequest, MatchProvider, SingleMatchRequest, ThinkingSink};
use crate::model::{BatchSuggestion, Suggestion};

/// Environment variables that make a nested `claude` refuse to start.
const BLOCKED_ENV: &[&str] = &[
    "CLAUDECODE",
    "CLAUDE_CODE_ENTRYPOINT",
    "CLAUDE_CODE_EXPERIMENTAL_AGENT_TEAMS",
];

const LOG_PREVIEW_CHARS: usize = 2000;

/// Claude Code provider configuration
#[derive(Debug, Clone)]
pub struct ClaudeCodeConfig {
    /// Executable name or path
    pub binary: String,
    /// Model alias passed to `--model`
    pub model: String,
    /// Reasoning effort passed to `--effort`
    pub effort: Option<String>,
}

impl Default for ClaudeCodeConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            model: "sonnet".to_string(),
            effort: Some("low".to_string()),
        }
    }
}

/// Claude Code match provider
pub struct ClaudeCodeProvider {
    config: ClaudeCodeConfig,
}

/// What a single stream-json line contributed.
#[derive(Debug, Clone, PartialEq)]
enum StreamLine {
    Text(Vec<String>),
    Result(String),
    Ignored,
}

impl ClaudeCodeProvider {
    pub fn new() -> Self {
        Self {
            config: ClaudeCodeConfig::default(),
        }
    }

    /// Set the model alias
    pub fn model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.is_empty() {
            self.config.model = model;
        }
        self
    }

    /// Set the executable
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        let binary = binary.into();
        if !binary.is_empty() {
            self.config.binary = binary;
        }
        self
    }

    pub fn binary_name(&self) -> &str {
        &self.config.binary
    }

    /// Check if the claude CLI is available
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.config.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Build command arguments
    fn build_args(&self, prompt: &MatchPrompt, streaming: bool) -> Vec<String> {
        let format = if streaming { "stream-json" } else { "json" };
        let mut args = vec![
            "-p".to_string(),
            prompt.user.clone(),
            "--output-format".to_string(),
            format.to_string(),
            "--model".to_string(),
            self.config.model.clone(),
            "--system-prompt".to_string(),
            prompt.system.clone(),
            "--json-schema".to_string(),
            prompt.schema.to_string(),
            "--no-session-persistence".to_string(),
        ];
        if let Some(effort) = &self.config.effort {
            args.push("--effort".to_string());
            args.push(effort.clone());
            args.push("--no-thinking".to_string());
        }
        // stream-json output requires --verbose in print mode
        if streaming {
            args.push("--verbose".to_string());
        }
        args
    }

    fn build_command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(args);
        for key in BLOCKED_ENV {
            cmd.env_remove(key);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    fn spawn(&self, args: &[String]) -> Result<Child, AiError> {
        self.build_command(args).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AiError::NotFound
            } else {
                AiError::Spawn(e.to_string())
            }
        })
    }

    /// Run the CLI and return the unwrapped suggestion payload.
    async fn run(
        &self,
        prompt: &MatchPrompt,
        thinking: Option<ThinkingSink>,
        cancel: CancellationToken,
    ) -> Result<String, AiError> {
        let args = self.build_args(prompt, thinking.is_some());
        debug!(
            model = %self.config.model,
            streaming = thinking.is_some(),
            system_prompt_len = prompt.system.len(),
            user_prompt_len = prompt.user.len(),
            "Invoking claude CLI"
        );

        let started = Instant::now();
        let payload = match thinking {
            Some(sink) => self.run_streaming(&args, sink, &cancel).await,
            None => self.run_buffered(&args, &cancel).await,
        };
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = payload.is_ok(),
            "claude CLI finished"
        );
        payload
    }

    async fn run_buffered(
        &self,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, AiError> {
        let child = self.spawn(args)?;
        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(|e| AiError::Spawn(e.to_string()))?,
            _ = cancel.cancelled() => return Err(AiError::Cancelled),
        };

        if !output.status.success() {
            return Err(process_error(output.status, &String::from_utf8_lossy(&output.stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(
            stdout_len = stdout.len(),
            stdout = %truncate(&stdout, LOG_PREVIEW_CHARS),
            "claude CLI raw response"
        );
        Ok(unwrap_envelope(&stdout))
    }

    async fn run_streaming(
        &self,
        args: &[String],
        sink: ThinkingSink,
        cancel: &CancellationToken,
    ) -> Result<String, AiError> {
        let mut child = self.spawn(args)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AiError::Spawn("stdout not captured".to_string()))?;
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut result_text: Option<String> = None;
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.map_err(|e| AiError::Spawn(format!("reading claude output: {}", e)))?,
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(AiError::Cancelled);
                }
            };
            let Some(line) = line else { break };

            match parse_stream_line(&line) {
                StreamLine::Text(fragments) => {
                    for fragment in fragments {
                        sink(&fragment);
                    }
                }
                StreamLine::Result(text) => {
                    debug!(
                        result_len = text.len(),
                        result_preview = %truncate(&text, 500),
                        "Stream result event"
                    );
                    result_text = Some(text);
                }
                StreamLine::Ignored => {}
            }
        }

        // Dropping the child on cancel kills it.
        let status: ExitStatus = tokio::select! {
            status = child.wait() => status.map_err(|e| AiError::Spawn(e.to_string()))?,
            _ = cancel.cancelled() => return Err(AiError::Cancelled),
        };
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(process_error(status, &stderr));
        }

        let text = result_text.ok_or(AiError::NoResult)?;
        Ok(unwrap_nested_result(&text))
    }
}

impl Default for ClaudeCodeProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn process_error(status: ExitStatus, stderr: &str) -> AiError {
    error!(status = %status, stderr = %stderr, "claude CLI failed");
    AiError::Process {
        status: status.to_string(),
        stderr: stderr.trim().to_string(),
    }
}

fn parse_stream_line(line: &str) -> StreamLine {
    let line = line.trim();
    if line.is_empty() {
        return StreamLine::Ignored;
    }
    let event: Value = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(err) => {
            debug!(error = %err, line = %truncate(line, 200), "Skipping unparseable stream line");
            return StreamLine::Ignored;
        }
    };

    match event.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => {
            match event.pointer("/delta/text").and_then(Value::as_str) {
                Some(text) if !text.is_empty() => StreamLine::Text(vec![text.to_string()]),
                _ => StreamLine::Ignored,
            }
        }
        Some("assistant") => {
            let fragments: Vec<String> = event
                .pointer("/message/content")
                .and_then(Value::as_array)
                .map(|blocks| {
                    blocks
                        .iter()
                        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                        .filter_map(|b| b.get("text").and_then(Value::as_str))
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if fragments.is_empty() {
                StreamLine::Ignored
            } else {
                StreamLine::Text(fragments)
            }
        }
        Some("result") => payload_from_event(&event)
            .map(StreamLine::Result)
            .unwrap_or(StreamLine::Ignored),
        _ => StreamLine::Ignored,
    }
}

#[async_trait]
impl MatchProvider for ClaudeCodeProvider {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn match_single(
        &self,
        request: &SingleMatchRequest,
        thinking: Option<ThinkingSink>,
        cancel: CancellationToken,
    ) -> Result<Suggestion, AiError> {
        let prompt = MatchPrompt::single(request);
        let payload = self.run(&prompt, thinking, cancel).await?;
        let suggestion: Suggestion = parse_payload(&payload)?;
        debug!(
            allocations = suggestion.allocations.len(),
            clarification = ?suggestion.clarification(),
            "Parsed suggestion"
        );
        Ok(suggestion)
    }

    async fn match_batch(
        &self,
        request: &BatchMatchRequest,
        thinking: Option<ThinkingSink>,
        cancel: CancellationToken,
    ) -> Result<BatchSuggestion, AiError> {
        let prompt = MatchPrompt::batch(request);
        let payload = self.run(&prompt, thinking, cancel).await?;
        let suggestion: BatchSuggestion = parse_payload(&payload)?;
        debug!(
            allocations = suggestion.allocations.len(),
            days = request.days.len(),
            clarification = ?suggestion.clarification(),
            "Parsed batch suggestion"
        );
        Ok(suggestion)
    }
}

// =============================================================================
// Tests
// =============================================================================
