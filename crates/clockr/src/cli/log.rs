//! `clockr log`: describe your work, review the AI allocation, submit.

use anyhow::{Context, Result};
use chrono::{Local, Timelike, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use clockr::ai::claude_code::ClaudeCodeProvider;
use clockr::ai::{InvokerConfig, StreamingInvoker};
use clockr::clockify::ClockifyClient;
use clockr::config::{AiSection, Config};
use clockr::fuzzy::ProjectIndex;
use clockr::model::{Allocation, BatchAllocation, Project};
use clockr::schedule::{batch_label, parse_date};
use clockr::store::{EntryStatus, EntryStore, PersistedEntry, SqliteEntryStore};
use clockr::submit::{Interval, SubmissionPipeline};
use clockr::tui::runtime::IntervalScope;
use clockr::tui::ui::summary_line;
use clockr::tui::{run_review, ReviewMachine, ReviewResult, ReviewSession};

use super::error::HelpfulError;

#[derive(Debug, clap::Args)]
pub struct LogArgs {
    /// Log the same project and description as the last entry, without the TUI
    #[arg(long, conflicts_with_all = ["repeat", "from", "to"])]
    pub same: bool,

    /// Pre-fill the input with the last description
    #[arg(long)]
    pub repeat: bool,

    /// Start date (YYYY-MM-DD, today, yesterday or a weekday name)
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// End date, inclusive
    #[arg(long, requires = "from")]
    pub to: Option<String>,
}

/// Everything both modes share once setup succeeded.
struct Prepared {
    config: Config,
    workspace_id: String,
    client: Arc<ClockifyClient>,
    projects: Vec<Project>,
    store: Option<Arc<SqliteEntryStore>>,
    last_input: Option<String>,
    invoker: StreamingInvoker,
}

pub async fn run(args: LogArgs) -> Result<()> {
    let (config, path) = super::load_config()?;
    if args.same {
        return run_same(config, &path).await;
    }

    // Reject a bad range before any network call.
    let batch_days = match (&args.from, &args.to) {
        (Some(from), Some(to)) => {
            let today = Local::now().date_naive();
            let schedule = config.work_schedule()?;
            let parsed = parse_date(from, today)
                .and_then(|start| Ok((start, parse_date(to, today)?)))
                .and_then(|(start, end)| schedule.day_slots(start, end));
            Some(parsed.map_err(|err| HelpfulError::invalid_date_range(err.to_string()))?)
        }
        (None, None) => None,
        _ => {
            return Err(HelpfulError::invalid_date_range("--from and --to must be given together").into())
        }
    };

    let prepared = prepare(config, &path).await?;
    let initial = if args.repeat {
        prepared.last_input.clone()
    } else {
        None
    };

    match batch_days {
        Some(days) => {
            let label = batch_label(&days);
            info!(days = days.len(), "Starting batch review");
            let mut machine = ReviewMachine::<BatchAllocation>::new(
                label,
                Arc::new(ProjectIndex::new(prepared.projects.clone())),
            );
            machine = seed(machine, initial, prepared.last_input.clone());
            let pipeline = pipeline(&prepared);
            let session = ReviewSession::new(machine, prepared.invoker, pipeline, prepared.projects, days);
            let result = run_review(session).await?;
            finish(&result, true)
        }
        None => {
            let interval = Interval::ending_at(now_to_minute(), prepared.config.schedule.interval_minutes);
            info!(window = %interval.label(), "Starting review");
            let mut machine = ReviewMachine::<Allocation>::new(
                interval.label(),
                Arc::new(ProjectIndex::new(prepared.projects.clone())),
            );
            machine = seed(machine, initial, prepared.last_input.clone());
            let pipeline = pipeline(&prepared).with_interval(interval.clone());
            let scope = IntervalScope {
                interval,
                context_items: Vec::new(),
            };
            let session = ReviewSession::new(machine, prepared.invoker, pipeline, prepared.projects, scope);
            let result = run_review(session).await?;
            finish(&result, false)
        }
    }
}

/// Re-log the last logged entry's project and description for the current interval.
async fn run_same(config: Config, config_path: &std::path::Path) -> Result<()> {
    let store = open_store().await.context("The entry store is needed to repeat the last entry")?;
    let last = store
        .last_logged_entry()
        .await
        .context("Failed to read the last entry")?
        .ok_or_else(HelpfulError::no_previous_entry)?;

    let (client, workspace_id) = super::connect(&config, config_path).await?;
    let projects = client
        .projects(&workspace_id)
        .await
        .context("Failed to fetch projects")?;

    let minutes = config.schedule.interval_minutes;
    let allocation = same_allocation(&last, &projects, minutes)?;
    let interval = Interval::ending_at(now_to_minute(), minutes);
    info!(project = %allocation.project_name, window = %interval.label(), "Repeating last entry");

    let pipeline = SubmissionPipeline::new(Arc::new(client), workspace_id)
        .with_store(Arc::new(store))
        .with_interval(interval);
    let entries = pipeline.submit(&[allocation], &last.raw_input).await?;
    for entry in &entries {
        print!("{}", same_report(entry));
    }
    Ok(())
}

/// One full-interval allocation for the last entry's project, if it still exists.
fn same_allocation(last: &PersistedEntry, projects: &[Project], minutes: u32) -> Result<Allocation> {
    let project = projects
        .iter()
        .find(|p| p.id == last.project_id)
        .ok_or_else(|| HelpfulError::project_gone(&last.project_name, &last.project_id))?;

    let mut allocation = Allocation {
        project_id: String::new(),
        project_name: String::new(),
        client_name: None,
        minutes,
        description: last.description.clone(),
        confidence: 1.0,
    };
    allocation.set_project(project);
    Ok(allocation)
}

fn same_report(entry: &PersistedEntry) -> String {
    format!(
        "Logged: {} - {} ({}min) [{}]\n",
        entry.project_name, entry.description, entry.minutes, entry.status
    )
}

async fn prepare(config: Config, config_path: &std::path::Path) -> Result<Prepared> {
    let (client, workspace_id) = super::connect(&config, config_path).await?;
    let projects = client
        .projects(&workspace_id)
        .await
        .context("Failed to fetch projects")?;
    info!(count = projects.len(), "Projects loaded");

    let store = match open_store().await {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            warn!(error = %err, "Entry store unavailable, entries will not be recorded locally");
            None
        }
    };
    let last_input = match &store {
        Some(store) => store.last_raw_input().await.unwrap_or_else(|err| {
            warn!(error = %err, "Could not read the last description");
            None
        }),
        None => None,
    };

    let provider = claude_provider(&config.ai)?;
    let invoker = StreamingInvoker::new(Arc::new(provider)).with_config(InvokerConfig::default());

    Ok(Prepared {
        config,
        workspace_id,
        client: Arc::new(client),
        projects,
        store,
        last_input,
        invoker,
    })
}

fn claude_provider(ai: &AiSection) -> Result<ClaudeCodeProvider> {
    let provider = ClaudeCodeProvider::new()
        .binary(ai.binary.clone())
        .model(ai.model.clone());
    if !provider.is_available() {
        return Err(HelpfulError::claude_not_found(provider.binary_name()).into());
    }
    Ok(provider)
}

async fn open_store() -> Result<SqliteEntryStore> {
    let home = clockr_logging::clockr_home()?;
    let path = SqliteEntryStore::default_path(&home);
    Ok(SqliteEntryStore::open(&path).await?)
}

fn pipeline(prepared: &Prepared) -> SubmissionPipeline {
    let pipeline = SubmissionPipeline::new(prepared.client.clone(), prepared.workspace_id.clone());
    match &prepared.store {
        Some(store) => pipeline.with_store(store.clone()),
        None => pipeline,
    }
}

fn seed<A: clockr::model::EditableAllocation>(
    machine: ReviewMachine<A>,
    initial: Option<String>,
    last: Option<String>,
) -> ReviewMachine<A> {
    let machine = match last {
        Some(last) => machine.with_last_input(last),
        None => machine,
    };
    match initial {
        Some(text) => machine.with_initial_input(text),
        None => machine,
    }
}

fn now_to_minute() -> chrono::DateTime<Utc> {
    let now = Utc::now();
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

fn finish(result: &ReviewResult, dated: bool) -> Result<()> {
    if let Some(error) = &result.error {
        return Err(anyhow::anyhow!("{}", error));
    }
    print!("{}", report(result, dated));
    Ok(())
}

fn report(result: &ReviewResult, dated: bool) -> String {
    if result.entries.is_empty() {
        return if result.skipped {
            if dated {
                "Batch entry skipped.\n".to_string()
            } else {
                "Entry skipped.\n".to_string()
            }
        } else {
            "No entries to log.\n".to_string()
        };
    }

    let mut out = String::new();
    for entry in &result.entries {
        let mark = match entry.status {
            EntryStatus::Logged => "+",
            EntryStatus::Failed => "!",
        };
        out.push_str(&format!(
            "  {} {} {}min  {}  {}  [{}]\n",
            mark,
            entry.start.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            entry.minutes,
            entry.project_name,
            entry.description,
            entry.status,
        ));
    }
    out.push_str(&summary_line(&result.entries, dated));
    out.push('\n');
    out
}
