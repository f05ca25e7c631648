//! Scripted match provider for deterministic tests.
//!
//! Scripts are queued per mode and consumed in order. Each script emits its
//! thinking chunks, then either returns an outcome or stalls until cancelled.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{AiError, BatchMatchRequest, MatchProvider, SingleMatchRequest, ThinkingSink};
use crate::model::{BatchSuggestion, Suggestion};

#[derive(Debug, Clone)]
enum Outcome<T> {
    Ready(Result<T, AiError>),
    Stall(Duration),
    Panic(String),
}

/// One scripted provider call.
#[derive(Debug, Clone)]
pub struct Script<T> {
    chunks: Vec<String>,
    interval: Duration,
    outcome: Outcome<T>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            interval: Duration::ZERO,
            outcome: Outcome::Ready(Err(AiError::NoResult)),
        }
    }
}

impl<T> Script<T> {
    /// Emit `chunks` back to back.
    pub fn chunks(chunks: &[&str]) -> Self {
        Self::chunks_every(chunks, Duration::ZERO)
    }

    /// Emit `chunks`, waiting `interval` before each one.
    pub fn chunks_every(chunks: &[&str], interval: Duration) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            interval,
            ..Self::default()
        }
    }

    pub fn ok(value: T) -> Self {
        Self::default().then_ok(value)
    }

    pub fn err(error: AiError) -> Self {
        Self::default().then_err(error)
    }

    pub fn then_ok(mut self, value: T) -> Self {
        self.outcome = Outcome::Ready(Ok(value));
        self
    }

    pub fn then_err(mut self, error: AiError) -> Self {
        self.outcome = Outcome::Ready(Err(error));
        self
    }

    /// Panic after the chunks, as a crashing provider would.
    pub fn then_panic(mut self, message: impl Into<String>) -> Self {
        self.outcome = Outcome::Panic(message.into());
        self
    }

    /// Stop emitting and wait for cancellation, for at most `limit`.
    pub fn then_stall(mut self, limit: Duration) -> Self {
        self.outcome = Outcome::Stall(limit);
        self
    }
}

/// Mock provider with queued scripts and call recording.
#[derive(Default)]
pub struct MockMatchProvider {
    single: Mutex<VecDeque<Script<Suggestion>>>,
    batch: Mutex<VecDeque<Script<BatchSuggestion>>>,
    descriptions: Mutex<Vec<String>>,
    cancellations: Arc<AtomicUsize>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockMatchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_single(&self, script: Script<Suggestion>) {
        lock(&self.single).push_back(script);
    }

    pub fn push_batch(&self, script: Script<BatchSuggestion>) {
        lock(&self.batch).push_back(script);
    }

    /// Descriptions received so far, in call order.
    pub fn descriptions(&self) -> Vec<String> {
        lock(&self.descriptions).clone()
    }

    /// Number of calls that observed their cancellation token.
    pub fn cancellations(&self) -> Arc<AtomicUsize> {
        self.cancellations.clone()
    }

    async fn play<T>(
        &self,
        script: Option<Script<T>>,
        thinking: Option<ThinkingSink>,
        cancel: CancellationToken,
    ) -> Result<T, AiError> {
        let script = script.ok_or_else(|| AiError::Spawn("no scripted response queued".into()))?;

        for chunk in &script.chunks {
            if !script.interval.is_zero() {
                self.wait(script.interval, &cancel).await?;
            }
            if let Some(sink) = &thinking {
                sink(chunk);
            }
        }

        match script.outcome {
            Outcome::Ready(result) => result,
            Outcome::Stall(limit) => {
                self.wait(limit, &cancel).await?;
                Err(AiError::NoResult)
            }
            Outcome::Panic(message) => panic!("{}", message),
        }
    }

    async fn wait(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), AiError> {
        tokio::select! {
            _ = cancel.cancelled() => {
                self.cancellations.fetch_add(1, Ordering::SeqCst);
                Err(AiError::Cancelled)
            }
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[async_trait]
impl MatchProvider for MockMatchProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn match_single(
        &self,
        request: &SingleMatchRequest,
        thinking: Option<ThinkingSink>,
        cancel: CancellationToken,
    ) -> Result<Suggestion, AiError> {
        lock(&self.descriptions).push(request.description.clone());
        let script = lock(&self.single).pop_front();
        self.play(script, thinking, cancel).await
    }

    async fn match_batch(
        &self,
        request: &BatchMatchRequest,
        thinking: Option<ThinkingSink>,
        cancel: CancellationToken,
    ) -> Result<BatchSuggestion, AiError> {
        lock(&self.descriptions).push(request.description.clone());
        let script = lock(&self.batch).pop_front();
        self.play(script, thinking, cancel).await
    }
}
