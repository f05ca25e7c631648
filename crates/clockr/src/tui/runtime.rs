//! Terminal ownership and the review event loop.
//!
//! The loop draws, waits for exactly one input, feeds it to the machine as a
//! [`Msg`] and runs the returned [`Command`]s. Inputs are terminal events,
//! the one-second loading tick, items of the active match stream and results
//! posted back by spawned submission tasks.

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::{Stream, StreamExt};
use ratatui::{backend::CrosstermBackend, prelude::*, Terminal};
use std::io::stdout;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use super::review::{Command, Msg, ReviewMachine, ReviewResult};
use super::theme::Theme;
use super::ui;
use crate::ai::{AiError, BatchMatchRequest, MatchEvent, MatchStream, SingleMatchRequest, StreamingInvoker};
use crate::model::{Allocation, BatchAllocation, DaySlot, Project, Proposal};
use crate::submit::{Interval, Plannable, SubmissionPipeline};

const TICK: Duration = Duration::from_secs(1);

/// How each allocation shape asks the AI for a proposal.
pub trait ReviewMode: Plannable {
    /// What the request needs besides the description and the projects.
    type Scope: Send + Sync + 'static;

    fn start_match(
        invoker: &StreamingInvoker,
        scope: &Self::Scope,
        projects: &[Project],
        description: String,
    ) -> MatchStream<Proposal<Self>>;
}

/// Single-interval request context.
#[derive(Debug, Clone)]
pub struct IntervalScope {
    pub interval: Interval,
    pub context_items: Vec<String>,
}

impl ReviewMode for Allocation {
    type Scope = IntervalScope;

    fn start_match(
        invoker: &StreamingInvoker,
        scope: &IntervalScope,
        projects: &[Project],
        description: String,
    ) -> MatchStream<Proposal<Self>> {
        invoker.invoke_single(SingleMatchRequest {
            description,
            projects: projects.to_vec(),
            interval_minutes: scope.interval.minutes(),
            context_items: scope.context_items.clone(),
        })
    }
}

impl ReviewMode for BatchAllocation {
    type Scope = Vec<DaySlot>;

    fn start_match(
        invoker: &StreamingInvoker,
        days: &Vec<DaySlot>,
        projects: &[Project],
        description: String,
    ) -> MatchStream<Proposal<Self>> {
        invoker.invoke_batch(BatchMatchRequest {
            description,
            projects: projects.to_vec(),
            days: days.clone(),
        })
    }
}

/// Everything one review run needs.
pub struct ReviewSession<A: ReviewMode> {
    machine: ReviewMachine<A>,
    invoker: StreamingInvoker,
    pipeline: SubmissionPipeline,
    projects: Vec<Project>,
    scope: A::Scope,
    theme: Theme,
}

enum Incoming<A> {
    Msg(Msg<A>),
    Match(Option<MatchEvent<Proposal<A>>>),
    Terminal(Option<std::io::Result<Event>>),
}

async fn next_match<T>(stream: &mut Option<MatchStream<T>>) -> Option<MatchEvent<T>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(tick: &mut Option<Pin<Box<Sleep>>>) {
    match tick {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

impl<A: ReviewMode> ReviewSession<A> {
    pub fn new(
        machine: ReviewMachine<A>,
        invoker: StreamingInvoker,
        pipeline: SubmissionPipeline,
        projects: Vec<Project>,
        scope: A::Scope,
    ) -> Self {
        Self {
            machine,
            invoker,
            pipeline,
            projects,
            scope,
            theme: Theme::default(),
        }
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    /// Run until the machine finishes or the event source ends.
    pub async fn drive<B, S>(mut self, terminal: &mut Terminal<B>, mut events: S) -> Result<ReviewResult>
    where
        B: Backend,
        S: Stream<Item = std::io::Result<Event>> + Unpin,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Msg<A>>();
        let mut active: Option<MatchStream<Proposal<A>>> = None;
        let mut tick: Option<Pin<Box<Sleep>>> = None;

        loop {
            terminal.draw(|frame| ui::draw(frame, &self.machine, &self.theme))?;

            let incoming = tokio::select! {
                biased;
                Some(msg) = rx.recv() => Incoming::Msg(msg),
                event = events.next() => Incoming::Terminal(event),
                event = next_match(&mut active) => Incoming::Match(event),
                _ = next_tick(&mut tick) => Incoming::Msg(Msg::Tick),
            };

            let msg = match incoming {
                Incoming::Msg(Msg::Tick) => {
                    tick = None;
                    Msg::Tick
                }
                Incoming::Msg(msg) => msg,
                Incoming::Match(Some(MatchEvent::Chunk(text))) => Msg::Thinking(text),
                Incoming::Match(Some(MatchEvent::Finished(outcome))) => {
                    active = None;
                    Msg::Matched(outcome)
                }
                Incoming::Match(None) => {
                    active = None;
                    warn!("Match stream closed without a result");
                    Msg::Matched(Err(AiError::Aborted(
                        "match stream closed without a result".to_string(),
                    )))
                }
                Incoming::Terminal(Some(Ok(Event::Key(key)))) if key.kind == KeyEventKind::Press => {
                    Msg::Key(key)
                }
                Incoming::Terminal(Some(Ok(_))) => continue,
                Incoming::Terminal(Some(Err(err))) => return Err(err.into()),
                Incoming::Terminal(None) => {
                    debug!("Event source closed");
                    break;
                }
            };

            for command in self.machine.update(msg) {
                match command {
                    Command::StartMatch { description } => {
                        info!(provider = self.invoker.provider_name(), "Starting AI match");
                        active = Some(A::start_match(
                            &self.invoker,
                            &self.scope,
                            &self.projects,
                            description,
                        ));
                    }
                    Command::CancelMatch => {
                        if active.take().is_some() {
                            debug!("Dropping active match stream");
                        }
                    }
                    Command::ScheduleTick => {
                        tick = Some(Box::pin(tokio::time::sleep(TICK)));
                    }
                    Command::Submit {
                        allocations,
                        raw_input,
                    } => {
                        let pipeline = self.pipeline.clone();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            let outcome = pipeline.submit(&allocations, &raw_input).await;
                            // Loop may have exited.
                            let _ = tx.send(Msg::Submitted(outcome));
                        });
                    }
                    Command::Quit => {}
                }
            }

            if self.machine.is_finished() {
                terminal.draw(|frame| ui::draw(frame, &self.machine, &self.theme))?;
                break;
            }
        }

        Ok(self
            .machine
            .take_result()
            .unwrap_or_else(ReviewResult::skipped))
    }
}

/// Take over the terminal, run the session and restore the terminal.
pub async fn run_review<A: ReviewMode>(session: ReviewSession<A>) -> Result<ReviewResult> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = session.drive(&mut terminal, EventStream::new()).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}
