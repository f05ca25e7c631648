//! Streaming invocation of a [`MatchProvider`].
//!
//! Each call runs in its own tokio task. Thinking fragments are relayed
//! through a bounded channel with `try_send`, so a slow consumer loses
//! fragments instead of stalling the provider. The final outcome is sent on
//! the same channel with an awaited send and therefore arrives after every
//! fragment that was delivered.
//!
//! Three things end a call early: the hard ceiling, the idle watchdog and the
//! consumer dropping the stream. All of them fire the same
//! [`CancellationToken`].

use futures::{FutureExt, Stream};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use super::{AiError, BatchMatchRequest, MatchProvider, SingleMatchRequest, ThinkingSink};
use crate::model::{BatchSuggestion, Suggestion};

/// Capacity of the chunk channel.
pub const CHUNK_CHANNEL_CAPACITY: usize = 100;

const SINGLE_HARD_TIMEOUT: Duration = Duration::from_secs(60);
const BATCH_HARD_TIMEOUT: Duration = Duration::from_secs(120);
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const IDLE_POLL: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokerConfig {
    /// Hard ceiling for a single-interval call
    pub single_timeout: Duration,
    /// Hard ceiling for a batch call
    pub batch_timeout: Duration,
    /// Cancel when no fragment arrives for this long
    pub idle_timeout: Duration,
    /// Watchdog polling period
    pub idle_poll: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            single_timeout: SINGLE_HARD_TIMEOUT,
            batch_timeout: BATCH_HARD_TIMEOUT,
            idle_timeout: IDLE_TIMEOUT,
            idle_poll: IDLE_POLL,
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// One item of a match stream.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent<T> {
    /// Incremental provider text
    Chunk(String),
    /// Final outcome; always the last item
    Finished(Result<T, AiError>),
}

/// Events of one in-flight call. Dropping it cancels the call.
pub struct MatchStream<T> {
    inner: ReceiverStream<MatchEvent<T>>,
    _cancel_on_drop: DropGuard,
}

impl<T> Stream for MatchStream<T> {
    type Item = MatchEvent<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

// =============================================================================
// Idle Watchdog
// =============================================================================

/// Last-activity clock shared between the thinking sink and the watchdog.
#[derive(Clone)]
pub struct ActivityClock(Arc<Mutex<Instant>>);

impl ActivityClock {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }

    pub fn touch(&self) {
        if let Ok(mut last) = self.0.lock() {
            *last = Instant::now();
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.0
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

/// Cancels a token once the activity clock has been quiet for too long.
///
/// Only idle time counts; total elapsed time is left to the hard ceiling.
pub struct IdleWatchdog {
    clock: ActivityClock,
    fired: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl IdleWatchdog {
    pub fn spawn(cancel: CancellationToken, idle_timeout: Duration, poll: Duration) -> Self {
        let clock = ActivityClock::new();
        let fired = Arc::new(AtomicBool::new(false));

        let task_clock = clock.clone();
        let task_fired = fired.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + poll, poll);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let idle = task_clock.idle_for();
                        if idle >= idle_timeout {
                            warn!(idle_secs = idle.as_secs(), "AI call idle, cancelling");
                            task_fired.store(true, Ordering::SeqCst);
                            cancel.cancel();
                            return;
                        }
                    }
                }
            }
        });

        Self {
            clock,
            fired,
            handle,
        }
    }

    pub fn clock(&self) -> ActivityClock {
        self.clock.clone()
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for IdleWatchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// =============================================================================
// Invoker
// =============================================================================

/// Runs provider calls as cancellable, streamed background tasks.
#[derive(Clone)]
pub struct StreamingInvoker {
    provider: Arc<dyn MatchProvider>,
    config: InvokerConfig,
}

impl StreamingInvoker {
    pub fn new(provider: Arc<dyn MatchProvider>) -> Self {
        Self {
            provider,
            config: InvokerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InvokerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn invoke_single(&self, request: SingleMatchRequest) -> MatchStream<Suggestion> {
        let provider = self.provider.clone();
        self.spawn_call(self.config.single_timeout, move |sink, cancel| async move {
            provider.match_single(&request, Some(sink), cancel).await
        })
    }

    pub fn invoke_batch(&self, request: BatchMatchRequest) -> MatchStream<BatchSuggestion> {
        let provider = self.provider.clone();
        self.spawn_call(self.config.batch_timeout, move |sink, cancel| async move {
            provider.match_batch(&request, Some(sink), cancel).await
        })
    }

    fn spawn_call<T, F, Fut>(&self, hard_timeout: Duration, call: F) -> MatchStream<T>
    where
        T: Send + 'static,
        F: FnOnce(ThinkingSink, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, AiError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<MatchEvent<T>>(CHUNK_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let config = self.config;
        let provider_name = self.provider.name().to_string();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let watchdog =
                IdleWatchdog::spawn(task_cancel.clone(), config.idle_timeout, config.idle_poll);

            let clock = watchdog.clock();
            let chunk_tx = tx.clone();
            let sink: ThinkingSink = Arc::new(move |text: &str| {
                clock.touch();
                if chunk_tx.try_send(MatchEvent::Chunk(text.to_string())).is_err() {
                    debug!("Chunk channel full or closed, dropping fragment");
                }
            });

            let started = Instant::now();
            debug!(provider = %provider_name, "Starting AI match call");
            let call = AssertUnwindSafe(call(sink, task_cancel.clone()))
                .catch_unwind()
                .map(|caught| caught.unwrap_or_else(|payload| Err(panic_error(payload))));
            let outcome = guarded(
                call,
                &task_cancel,
                &watchdog,
                hard_timeout,
                config.idle_timeout,
            )
            .await;
            debug!(
                provider = %provider_name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = outcome.is_ok(),
                "AI match call finished"
            );

            // Consumer may already be gone.
            let _ = tx.send(MatchEvent::Finished(outcome)).await;
        });

        MatchStream {
            inner: ReceiverStream::new(rx),
            _cancel_on_drop: cancel.drop_guard(),
        }
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> AiError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "provider panicked".to_string());
    warn!(error = %message, "AI provider panicked");
    AiError::Aborted(message)
}

/// Race the provider against the hard ceiling and the shared token.
async fn guarded<T, Fut>(
    call: Fut,
    cancel: &CancellationToken,
    watchdog: &IdleWatchdog,
    hard_timeout: Duration,
    idle_timeout: Duration,
) -> Result<T, AiError>
where
    Fut: Future<Output = Result<T, AiError>>,
{
    let started = Instant::now();
    let cancelled_error = || {
        if watchdog.fired() {
            AiError::IdleTimeout { idle: idle_timeout }
        } else {
            AiError::Cancelled
        }
    };

    tokio::select! {
        biased;
        result = tokio::time::timeout(hard_timeout, call) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(AiError::Cancelled)) => Err(cancelled_error()),
            Ok(Err(err)) if watchdog.fired() => {
                debug!(error = %err, "Provider error after idle cancellation");
                Err(cancelled_error())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                cancel.cancel();
                Err(AiError::Timeout { elapsed: started.elapsed() })
            }
        },
        _ = cancel.cancelled() => Err(cancelled_error()),
    }
}
