//! Full review flows driven through the public API: scripted AI responses,
//! synthetic key presses, a fake Clockify sink and an in-memory store.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use futures::{Stream, StreamExt};
use ratatui::backend::TestBackend;
use ratatui::Terminal;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clockr::ai::mock::{MockMatchProvider, Script};
use clockr::ai::{InvokerConfig, StreamingInvoker};
use clockr::clockify::{ClockifyError, CreatedEntry, TimeEntryRequest, TimeEntrySink};
use clockr::fuzzy::ProjectIndex;
use clockr::model::{Allocation, BatchAllocation, DaySlot, Project, Proposal};
use clockr::schedule::{batch_label, WorkSchedule};
use clockr::store::{EntryStatus, EntryStore, PersistedEntry, SqliteEntryStore};
use clockr::submit::{Interval, SubmissionPipeline};
use clockr::tui::runtime::IntervalScope;
use clockr::tui::{ReviewMachine, ReviewResult, ReviewSession};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct FakeSink {
    fail_on: Vec<usize>,
    requests: Mutex<Vec<TimeEntryRequest>>,
}

impl FakeSink {
    fn failing_on(calls: &[usize]) -> Self {
        Self {
            fail_on: calls.to_vec(),
            ..Self::default()
        }
    }

    fn requests(&self) -> Vec<TimeEntryRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TimeEntrySink for FakeSink {
    async fn create_entry(
        &self,
        _workspace_id: &str,
        entry: &TimeEntryRequest,
    ) -> Result<CreatedEntry, ClockifyError> {
        let mut requests = self.requests.lock().unwrap();
        let call = requests.len();
        requests.push(entry.clone());
        if self.fail_on.contains(&call) {
            return Err(ClockifyError::Status {
                status: 500,
                body: "upstream unavailable".into(),
            });
        }
        Ok(CreatedEntry {
            id: format!("te-{}", call + 1),
        })
    }
}

fn projects() -> Vec<Project> {
    vec![
        Project::new("p-auth", "Auth Service").with_client("Acme"),
        Project::new("p-web", "Website"),
        Project::new("p-ops", "Operations"),
    ]
}

fn allocation(project: &Project, minutes: u32, description: &str, confidence: f64) -> Allocation {
    Allocation {
        project_id: project.id.clone(),
        project_name: project.name.clone(),
        client_name: project.client_name.clone(),
        minutes,
        description: description.into(),
        confidence,
    }
}

fn batch(date: &str, start: &str, end: &str, alloc: Allocation) -> BatchAllocation {
    BatchAllocation {
        date: date.into(),
        start_time: start.into(),
        end_time: end.into(),
        allocation: alloc,
    }
}

fn interval() -> Interval {
    Interval::ending_at(Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap(), 60)
}

fn days() -> Vec<DaySlot> {
    let schedule = WorkSchedule::parse("09:00", "17:00", &[1, 2, 3, 4, 5]).unwrap();
    schedule
        .day_slots(
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
        )
        .unwrap()
}

async fn all_entries(store: &SqliteEntryStore) -> Vec<PersistedEntry> {
    store
        .entries_between(
            Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap(),
        )
        .await
        .unwrap()
}

fn single_session(
    provider: Arc<MockMatchProvider>,
    sink: Arc<FakeSink>,
    store: Arc<SqliteEntryStore>,
) -> ReviewSession<Allocation> {
    let machine = ReviewMachine::new(interval().label(), Arc::new(ProjectIndex::new(projects())));
    let pipeline = SubmissionPipeline::new(sink, "ws-1")
        .with_store(store)
        .with_interval(interval());
    ReviewSession::new(
        machine,
        StreamingInvoker::new(provider),
        pipeline,
        projects(),
        IntervalScope {
            interval: interval(),
            context_items: vec!["Standup".into()],
        },
    )
}

fn batch_session(
    provider: Arc<MockMatchProvider>,
    sink: Arc<FakeSink>,
    store: Arc<SqliteEntryStore>,
) -> ReviewSession<BatchAllocation> {
    let days = days();
    let machine = ReviewMachine::new(batch_label(&days), Arc::new(ProjectIndex::new(projects())));
    let pipeline = SubmissionPipeline::new(sink, "ws-1").with_store(store);
    ReviewSession::new(machine, StreamingInvoker::new(provider), pipeline, projects(), days)
}

// ============================================================================
// Key scripts
// ============================================================================

fn press(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn typed(text: &str) -> Vec<KeyEvent> {
    text.chars().map(|c| press(KeyCode::Char(c))).collect()
}

/// Keys delivered `gap` apart.
fn keys(keys: Vec<KeyEvent>, gap: Duration) -> impl Stream<Item = std::io::Result<Event>> + Unpin {
    Box::pin(futures::stream::iter(keys).then(move |key| async move {
        tokio::time::sleep(gap).await;
        Ok(Event::Key(key))
    }))
}

/// Describe, submit, accept, then keep pressing a key until the
/// confirmation screen lets go. Presses while the submission is pending
/// are ignored.
fn describe_and_accept(description: &str) -> Vec<KeyEvent> {
    let mut script = typed(description);
    script.push(press(KeyCode::Enter));
    script.push(press(KeyCode::Char('a')));
    script.extend(std::iter::repeat(press(KeyCode::Char('q'))).take(40));
    script
}

const GAP: Duration = Duration::from_millis(25);

fn screen(terminal: &Terminal<TestBackend>) -> String {
    terminal
        .backend()
        .buffer()
        .content()
        .chunks(terminal.backend().buffer().area.width as usize)
        .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Flows
// ============================================================================

#[tokio::test]
async fn test_happy_path_logs_one_entry() {
    let provider = Arc::new(MockMatchProvider::new());
    let all = projects();
    let auth = &all[0];
    provider.push_single(
        Script::chunks(&["Looking at ", "the projects"]).then_ok(Proposal::with_allocations(vec![
            allocation(auth, 60, "Fixed auth bug", 0.9),
        ])),
    );
    let sink = Arc::new(FakeSink::default());
    let store = Arc::new(SqliteEntryStore::open_in_memory().await.unwrap());
    let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();

    let result = single_session(provider.clone(), sink.clone(), store.clone())
        .drive(&mut terminal, keys(describe_and_accept("fixed auth bug"), GAP))
        .await
        .unwrap();

    assert!(!result.skipped);
    assert_eq!(result.error, None);
    assert_eq!(result.entries.len(), 1);
    assert_eq!(provider.descriptions(), vec!["fixed auth bug".to_string()]);

    let requests = sink.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].project_id, "p-auth");
    assert_eq!(requests[0].start, "2025-03-03T09:00:00Z");
    assert_eq!(requests[0].end, "2025-03-03T10:00:00Z");

    let stored = all_entries(&store).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, EntryStatus::Logged);
    assert_eq!(stored[0].external_id, "te-1");
    assert_eq!(stored[0].minutes, 60);
    assert_eq!(stored[0].description, "Fixed auth bug");
    assert_eq!(stored[0].client_name.as_deref(), Some("Acme"));
    assert_eq!(stored[0].raw_input, "fixed auth bug");
    assert_eq!(store.last_raw_input().await.unwrap().as_deref(), Some("fixed auth bug"));
}

#[tokio::test]
async fn test_split_interval_walks_forward() {
    let provider = Arc::new(MockMatchProvider::new());
    let all = projects();
    provider.push_single(Script::ok(Proposal::with_allocations(vec![
        allocation(&all[0], 30, "Auth review", 0.8),
        allocation(&all[1], 30, "Landing page copy", 0.6),
    ])));
    let sink = Arc::new(FakeSink::default());
    let store = Arc::new(SqliteEntryStore::open_in_memory().await.unwrap());
    let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();

    let result = single_session(provider, sink.clone(), store.clone())
        .drive(&mut terminal, keys(describe_and_accept("review and website"), GAP))
        .await
        .unwrap();

    assert_eq!(result.entries.len(), 2);
    let requests = sink.requests();
    assert_eq!(requests[0].start, "2025-03-03T09:00:00Z");
    assert_eq!(requests[0].end, "2025-03-03T09:30:00Z");
    assert_eq!(requests[1].start, "2025-03-03T09:30:00Z");
    assert_eq!(requests[1].end, "2025-03-03T10:00:00Z");
    assert!(screen(&terminal).contains("Logged 2 entries"));
}

#[tokio::test]
async fn test_clarification_retry_keeps_time_label() {
    let provider = Arc::new(MockMatchProvider::new());
    provider.push_single(Script::ok(Proposal::clarify("Which client was this for?")));
    let sink = Arc::new(FakeSink::default());
    let store = Arc::new(SqliteEntryStore::open_in_memory().await.unwrap());
    let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();

    let mut script = typed("stuff");
    script.push(press(KeyCode::Enter));
    // Ignored while a clarification is pending.
    script.push(press(KeyCode::Char('a')));
    script.push(press(KeyCode::Char('e')));
    script.push(press(KeyCode::Char('r')));

    let result = single_session(provider.clone(), sink.clone(), store.clone())
        .drive(&mut terminal, keys(script, GAP))
        .await
        .unwrap();

    // The key source ran out while back on the input screen.
    assert!(result.skipped);
    assert!(result.entries.is_empty());
    assert!(sink.requests().is_empty());
    assert!(all_entries(&store).await.is_empty());
    assert_eq!(provider.descriptions(), vec!["stuff".to_string()]);

    let screen = screen(&terminal);
    assert!(screen.contains("Time Entry"));
    assert!(screen.contains(&interval().label()));
    assert!(screen.contains("Describe what you worked on..."));
}

#[tokio::test]
async fn test_batch_partial_failure() {
    let provider = Arc::new(MockMatchProvider::new());
    let all = projects();
    provider.push_batch(Script::ok(Proposal::with_allocations(vec![
        batch("2025-03-03", "09:00", "17:00", allocation(&all[0], 480, "Auth rewrite", 0.9)),
        batch("2025-03-04", "09:00", "17:00", allocation(&all[1], 480, "Website launch", 0.7)),
        batch("2025-03-05", "09:00", "17:00", allocation(&all[2], 480, "On-call", 0.4)),
    ])));
    let sink = Arc::new(FakeSink::failing_on(&[1]));
    let store = Arc::new(SqliteEntryStore::open_in_memory().await.unwrap());
    let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();

    let result = batch_session(provider, sink.clone(), store.clone())
        .drive(&mut terminal, keys(describe_and_accept("the week"), GAP))
        .await
        .unwrap();

    let statuses: Vec<EntryStatus> = result.entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![EntryStatus::Logged, EntryStatus::Failed, EntryStatus::Logged]
    );
    assert_eq!(sink.requests().len(), 3);

    let stored = all_entries(&store).await;
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[1].status, EntryStatus::Failed);
    assert_eq!(stored[1].external_id, "");
    assert_eq!(store.failed_entries().await.unwrap().len(), 1);

    assert!(screen(&terminal).contains("Logged 2 entries across 3 days (1 failed)"));
}

#[tokio::test]
async fn test_time_parse_abort_persists_nothing() {
    let provider = Arc::new(MockMatchProvider::new());
    let all = projects();
    provider.push_batch(Script::ok(Proposal::with_allocations(vec![
        batch("2025-03-03", "09:00", "12:00", allocation(&all[0], 180, "Auth", 0.9)),
        batch("2025-03-03", "9am", "17:00", allocation(&all[1], 300, "Website", 0.9)),
    ])));
    let sink = Arc::new(FakeSink::default());
    let store = Arc::new(SqliteEntryStore::open_in_memory().await.unwrap());
    let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();

    let result = batch_session(provider, sink.clone(), store.clone())
        .drive(&mut terminal, keys(describe_and_accept("monday"), GAP))
        .await
        .unwrap();

    let error = result.error.expect("submission error");
    assert!(error.contains("2025-03-03"), "{}", error);
    assert!(error.contains("start"), "{}", error);
    assert!(result.entries.is_empty());
    assert!(sink.requests().is_empty());
    assert!(all_entries(&store).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_ends_run_before_hard_ceiling() {
    let provider = Arc::new(MockMatchProvider::new());
    provider.push_single(Script::chunks(&["Reading projects..."]).then_stall(Duration::from_secs(3600)));
    let sink = Arc::new(FakeSink::default());

    let machine: ReviewMachine<Allocation> =
        ReviewMachine::new(interval().label(), Arc::new(ProjectIndex::new(projects())));
    let invoker = StreamingInvoker::new(provider.clone()).with_config(InvokerConfig {
        single_timeout: Duration::from_secs(600),
        ..InvokerConfig::default()
    });
    let session = ReviewSession::new(
        machine,
        invoker,
        SubmissionPipeline::new(sink.clone(), "ws-1").with_interval(interval()),
        projects(),
        IntervalScope {
            interval: interval(),
            context_items: vec![],
        },
    );

    // One key well after the idle window to leave the error screen.
    let mut script = typed("x");
    script.push(press(KeyCode::Enter));
    let early = keys(script, Duration::from_millis(100));
    let late = keys(vec![press(KeyCode::Char('q'))], Duration::from_secs(300));
    let events = early.chain(late);

    let started = tokio::time::Instant::now();
    let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
    let result: ReviewResult = session.drive(&mut terminal, events).await.unwrap();
    let elapsed = started.elapsed();

    let error = result.error.expect("idle timeout error");
    assert!(error.contains("no response from AI"), "{}", error);
    assert!(elapsed < Duration::from_secs(600));
    assert_eq!(provider.cancellations().load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(sink.requests().is_empty());
}
